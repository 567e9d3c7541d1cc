use thiserror::Error;

/// Sentinel 统一错误类型
#[derive(Error, Debug)]
pub enum SentinelError {
    /// 配置非法，进程不应启动
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    #[error("Probe failure on {endpoint}: {reason}")]
    ProbeFailure { endpoint: String, reason: String },

    #[error("Notification failure on {channel}: {reason}")]
    NotificationFailure { channel: String, reason: String },

    /// 数据不足，仅作提示
    #[error("Evaluation skipped for {rule}: {reason}")]
    EvaluationSkipped { rule: String, reason: String },

    /// 调用方传入的参数非法（查询接口、静默请求等）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SentinelError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SentinelError::InvalidConfig(msg.into())
    }

    /// 是否为致命错误（启动阶段）
    pub fn is_fatal(&self) -> bool {
        matches!(self, SentinelError::InvalidConfig(_))
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, SentinelError>;

impl From<anyhow::Error> for SentinelError {
    fn from(err: anyhow::Error) -> Self {
        SentinelError::Internal(err.to_string())
    }
}
