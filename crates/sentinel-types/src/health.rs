use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单个端点的健康快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub endpoint: String,
    pub target: String,
    /// 尚未完成首次检查时为 None
    pub healthy: Option<bool>,
    pub last_check: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<f64>,
    pub last_status_code: Option<u16>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub total_checks: u64,
    pub failed_checks: u64,
}

impl EndpointHealth {
    pub fn new(endpoint: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            target: target.into(),
            healthy: None,
            last_check: None,
            last_latency_ms: None,
            last_status_code: None,
            last_error: None,
            consecutive_failures: 0,
            total_checks: 0,
            failed_checks: 0,
        }
    }
}
