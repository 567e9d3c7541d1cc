use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::channel::NotificationChannel;
use crate::endpoint::HealthCheckEndpoint;
use crate::escalation::EscalationPolicy;
use crate::rule::AlertRule;

/// 全局配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub endpoints: Vec<HealthCheckEndpoint>,
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    #[serde(default)]
    pub escalation_policies: Vec<EscalationPolicy>,
    #[serde(default)]
    pub channels: Vec<NotificationChannel>,
}

impl EngineConfig {
    pub fn channel(&self, id: &str) -> Option<&NotificationChannel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn rule(&self, id: &str) -> Option<&AlertRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

/// 引擎调度参数
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSettings {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,
    /// 静默过期等维护任务的周期
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_secs: u64,
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_secs: u64,
    #[serde(default = "default_max_alert_history")]
    pub max_alert_history: usize,
    #[serde(default = "default_delivery_log_size")]
    pub delivery_log_size: usize,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl EngineSettings {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            evaluation_interval_secs: default_evaluation_interval(),
            housekeeping_interval_secs: default_housekeeping_interval(),
            notification_timeout_secs: default_notification_timeout(),
            max_alert_history: default_max_alert_history(),
            delivery_log_size: default_delivery_log_size(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// 序列保留策略（按序列生效）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_max_points")]
    pub max_points_per_series: usize,
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_points_per_series: default_max_points(),
            max_age_secs: default_max_age(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// 查询 API 服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CollectorsConfig {
    #[serde(default)]
    pub system: SystemCollectorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemCollectorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_collect_interval")]
    pub interval_secs: u64,
}

impl Default for SystemCollectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_collect_interval(),
        }
    }
}

// 默认值函数
fn default_name() -> String {
    "sentinel".to_string()
}

fn default_evaluation_interval() -> u64 {
    60
}

fn default_housekeeping_interval() -> u64 {
    15
}

fn default_notification_timeout() -> u64 {
    10
}

fn default_max_alert_history() -> usize {
    1000
}

fn default_delivery_log_size() -> usize {
    500
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_max_points() -> usize {
    43_200
}

fn default_max_age() -> u64 {
    30 * 24 * 3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9400
}

fn default_collect_interval() -> u64 {
    15
}
