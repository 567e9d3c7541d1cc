use config::{Config, Environment, File, FileFormat};
use sentinel_core::{Result, SentinelError};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::global::EngineConfig;

/// 环境变量覆盖前缀，例如 `SENTINEL__ENGINE__EVALUATION_INTERVAL_SECS=30`
const ENV_PREFIX: &str = "SENTINEL";

/// 配置加载器
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    /// 加载并校验配置
    pub fn load(&self) -> Result<EngineConfig> {
        if !self.config_path.exists() {
            return Err(SentinelError::InvalidConfig(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }

        let path = self.config_path.to_str().ok_or_else(|| {
            SentinelError::invalid_config(format!(
                "invalid config path: {}",
                self.config_path.display()
            ))
        })?;

        let config = Config::builder()
            .add_source(File::new(path, FileFormat::Toml))
            .add_source(env_source())
            .build()
            .map_err(|e| SentinelError::InvalidConfig(e.to_string()))?;

        let engine_config = deserialize(config)?;
        info!(
            path = %self.config_path.display(),
            endpoints = engine_config.endpoints.len(),
            rules = engine_config.rules.len(),
            channels = engine_config.channels.len(),
            "Configuration loaded"
        );
        Ok(engine_config)
    }

    /// 从 TOML 文本加载（不读取环境变量）
    pub fn from_toml_str(content: &str) -> Result<EngineConfig> {
        let config = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .map_err(|e| SentinelError::InvalidConfig(e.to_string()))?;

        deserialize(config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn deserialize(config: Config) -> Result<EngineConfig> {
    let engine_config: EngineConfig = config
        .try_deserialize()
        .map_err(|e| SentinelError::InvalidConfig(e.to_string()))?;
    engine_config.validate()?;
    Ok(engine_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use crate::rule::{Aggregate, ComparisonOp};
    use sentinel_types::Severity;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
[engine]
evaluation_interval_secs = 30

[logging]
level = "debug"
format = "json"

[[endpoints]]
name = "API Health"
target = "http://localhost:8080/health"
expected_response_time_ms = 1000
interval_secs = 10
timeout_ms = 2000
retries = 1

[[rules]]
id = "high_error_rate"
metric = "error_rate"
operator = ">"
threshold = 5.0
sustained_secs = 300
severity = "critical"
channels = ["ops-chat"]

[[rules]]
id = "slow_p95"
metric = "latency_ms"
operator = ">="
threshold = 800.0
aggregate = { percentile = 95.0 }

[[escalation_policies]]
id = "critical-default"
severities = ["critical"]

[[escalation_policies.steps]]
delay_minutes = 15
channels = ["ops-pager"]
assignees = ["oncall-primary"]

[[channels]]
id = "ops-chat"
[channels.transport]
type = "chat"
webhook_url = "https://chat.example.com/hooks/ops"

[[channels]]
id = "ops-pager"
severities = ["critical"]
[channels.transport]
type = "pager"
routing_key = "routing-key"
"#;

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("sentinel.toml");
        fs::write(&path, SAMPLE).unwrap();

        let config = ConfigLoader::new(&path).load().unwrap();

        assert_eq!(config.engine.evaluation_interval_secs, 30);
        assert_eq!(config.engine.notification_timeout_secs, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].retries, 1);
        assert_eq!(config.rules[0].operator, ComparisonOp::GreaterThan);
        assert_eq!(config.rules[0].severity, Severity::Critical);
        assert_eq!(config.rules[1].aggregate, Aggregate::Percentile(95.0));
        assert_eq!(config.escalation_policies[0].steps[0].delay_minutes, 15);
        assert_eq!(config.channel("ops-pager").unwrap().kind(), ChannelKind::Pager);
    }

    #[test]
    fn test_missing_file_is_invalid_config() {
        let temp_dir = tempdir().unwrap();
        let err = ConfigLoader::new(temp_dir.path().join("missing.toml"))
            .load()
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let content = r#"
[[rules]]
id = "bad"
metric = "cpu"
operator = "~"
threshold = 1.0
"#;
        let err = ConfigLoader::from_toml_str(content).unwrap_err();
        assert!(matches!(err, SentinelError::InvalidConfig(_)));
    }

    #[test]
    fn test_dangling_channel_rejected() {
        let content = r#"
[[rules]]
id = "cpu_high"
metric = "cpu"
operator = ">"
threshold = 90.0
channels = ["nowhere"]
"#;
        let err = ConfigLoader::from_toml_str(content).unwrap_err();
        assert!(err.to_string().contains("unknown channel nowhere"));
    }

    #[test]
    fn test_shipped_sample_config_is_valid() {
        let config = ConfigLoader::from_toml_str(include_str!("../../../config/sentinel.toml")).unwrap();
        assert_eq!(config.endpoints[0].name, "API Health");
        assert_eq!(config.rules.len(), 3);
        assert_eq!(config.escalation_policies[0].steps.len(), 2);
        assert!(config.collectors.system.enabled);
    }
}
