use crate::metric::Labels;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "critical" | "crit" => Ok(Self::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// 告警状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
    Silenced,
}

impl AlertStatus {
    /// 告警仍在生命周期内（未恢复）
    pub fn is_live(&self) -> bool {
        matches!(self, AlertStatus::Active | AlertStatus::Silenced)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Active => f.write_str("active"),
            AlertStatus::Resolved => f.write_str("resolved"),
            AlertStatus::Silenced => f.write_str("silenced"),
        }
    }
}

/// 告警实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    /// 去重键：同一个键同时只存在一个未恢复的告警
    pub key: String,
    pub rule_id: String,
    pub metric: String,
    pub current_value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub status: AlertStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub description: String,
    #[serde(default)]
    pub labels: Labels,
    /// 显式指定的通知渠道，为空时按级别路由
    #[serde(default)]
    pub channels: Vec<String>,
    pub silenced_until: Option<DateTime<Utc>>,
    pub silence_reason: Option<String>,
}

impl Alert {
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// 告警持续时间（未恢复时以 `now` 计算）
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.end_time.unwrap_or(now) - self.start_time
    }
}
