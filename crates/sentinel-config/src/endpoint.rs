use sentinel_types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// 探测请求方法
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 健康检查端点
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthCheckEndpoint {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    /// 期望响应时间（毫秒），响应时间必须严格小于该值
    #[serde(default = "default_expected_response_time")]
    pub expected_response_time_ms: u64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// 失败后的重试次数
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub channels: Vec<String>,
}

impl HealthCheckEndpoint {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            method: HttpMethod::default(),
            headers: HashMap::new(),
            body: None,
            expected_status: default_expected_status(),
            expected_response_time_ms: default_expected_response_time(),
            interval_secs: default_interval(),
            timeout_ms: default_timeout(),
            retries: default_retries(),
            severity: default_severity(),
            channels: Vec::new(),
        }
    }

    pub fn with_expected_response_time_ms(mut self, ms: u64) -> Self {
        self.expected_response_time_ms = ms;
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn expected_response_time(&self) -> Duration {
        Duration::from_millis(self.expected_response_time_ms)
    }

    /// 该端点对应的告警键
    pub fn alert_key(&self) -> String {
        format!("health_check_{}", self.name)
    }
}

fn default_expected_status() -> u16 {
    200
}

fn default_expected_response_time() -> u64 {
    1000
}

fn default_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    5000
}

fn default_retries() -> u32 {
    2
}

fn default_severity() -> Severity {
    Severity::Critical
}
