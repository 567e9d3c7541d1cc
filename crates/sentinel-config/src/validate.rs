use sentinel_core::{Result, SentinelError};
use std::collections::HashSet;

use crate::global::EngineConfig;
use crate::rule::Aggregate;

impl EngineConfig {
    /// 启动前校验配置，所有问题汇总为一个 `InvalidConfig`
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();

        if self.engine.evaluation_interval_secs == 0 {
            problems.push("engine.evaluation_interval_secs must be greater than 0".into());
        }
        if self.engine.housekeeping_interval_secs == 0 {
            problems.push("engine.housekeeping_interval_secs must be greater than 0".into());
        }
        if self.engine.notification_timeout_secs == 0 {
            problems.push("engine.notification_timeout_secs must be greater than 0".into());
        }
        if self.retention.max_points_per_series == 0 {
            problems.push("retention.max_points_per_series must be greater than 0".into());
        }
        if self.retention.max_age_secs == 0 {
            problems.push("retention.max_age_secs must be greater than 0".into());
        }
        if self.collectors.system.enabled && self.collectors.system.interval_secs == 0 {
            problems.push("collectors.system.interval_secs must be greater than 0".into());
        }

        let channel_ids = self.check_channels(&mut problems);
        self.check_endpoints(&channel_ids, &mut problems);
        self.check_rules(&channel_ids, &mut problems);
        self.check_policies(&channel_ids, &mut problems);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SentinelError::InvalidConfig(problems.join("; ")))
        }
    }

    fn check_channels(&self, problems: &mut Vec<String>) -> HashSet<&str> {
        let mut ids = HashSet::new();
        for channel in &self.channels {
            if channel.id.trim().is_empty() {
                problems.push("channel id must not be empty".into());
                continue;
            }
            if !ids.insert(channel.id.as_str()) {
                problems.push(format!("duplicate channel id: {}", channel.id));
            }
            if channel.transport.destination().trim().is_empty() {
                problems.push(format!("channel {} has no destination", channel.id));
            }
        }
        ids
    }

    fn check_endpoints(&self, channel_ids: &HashSet<&str>, problems: &mut Vec<String>) {
        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            let name = endpoint.name.as_str();
            if name.trim().is_empty() {
                problems.push("endpoint name must not be empty".into());
                continue;
            }
            if !names.insert(name) {
                problems.push(format!("duplicate endpoint name: {}", name));
            }
            if endpoint.target.trim().is_empty() {
                problems.push(format!("endpoint {} has an empty target", name));
            }
            if endpoint.interval_secs == 0 {
                problems.push(format!("endpoint {} interval_secs must be greater than 0", name));
            }
            if endpoint.timeout_ms == 0 {
                problems.push(format!("endpoint {} timeout_ms must be greater than 0", name));
            }
            if !(100..=599).contains(&endpoint.expected_status) {
                problems.push(format!(
                    "endpoint {} expected_status {} is not a valid HTTP status",
                    name, endpoint.expected_status
                ));
            }
            check_refs(&endpoint.channels, channel_ids, &format!("endpoint {}", name), problems);
        }
    }

    fn check_rules(&self, channel_ids: &HashSet<&str>, problems: &mut Vec<String>) {
        let mut ids = HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                problems.push("rule id must not be empty".into());
                continue;
            }
            if !ids.insert(rule.id.as_str()) {
                problems.push(format!("duplicate rule id: {}", rule.id));
            }
            if rule.metric.trim().is_empty() {
                problems.push(format!("rule {} has an empty metric", rule.id));
            }
            if !rule.threshold.is_finite() {
                problems.push(format!("rule {} threshold must be finite", rule.id));
            }
            if rule.sustained_secs > self.retention.max_age_secs {
                problems.push(format!(
                    "rule {} sustained_secs exceeds retention.max_age_secs",
                    rule.id
                ));
            }
            if let Aggregate::Percentile(p) = rule.aggregate {
                if !(p > 0.0 && p <= 100.0) {
                    problems.push(format!("rule {} percentile {} must be in (0, 100]", rule.id, p));
                }
            }
            check_refs(&rule.channels, channel_ids, &format!("rule {}", rule.id), problems);
        }
    }

    fn check_policies(&self, channel_ids: &HashSet<&str>, problems: &mut Vec<String>) {
        let mut ids = HashSet::new();
        for policy in &self.escalation_policies {
            if policy.id.trim().is_empty() {
                problems.push("escalation policy id must not be empty".into());
                continue;
            }
            if !ids.insert(policy.id.as_str()) {
                problems.push(format!("duplicate escalation policy id: {}", policy.id));
            }
            if policy.steps.is_empty() {
                problems.push(format!("escalation policy {} has no steps", policy.id));
            }
            if policy.severities.is_empty() && policy.rules.is_empty() {
                problems.push(format!(
                    "escalation policy {} matches neither severities nor rules",
                    policy.id
                ));
            }
            let mut previous = 0;
            for (index, step) in policy.steps.iter().enumerate() {
                if step.delay_minutes < previous {
                    problems.push(format!(
                        "escalation policy {} step {} delay decreases",
                        policy.id, index
                    ));
                }
                previous = step.delay_minutes;
                if step.channels.is_empty() {
                    problems.push(format!(
                        "escalation policy {} step {} has no channels",
                        policy.id, index
                    ));
                }
                check_refs(
                    &step.channels,
                    channel_ids,
                    &format!("escalation policy {} step {}", policy.id, index),
                    problems,
                );
            }
        }
    }
}

fn check_refs(refs: &[String], known: &HashSet<&str>, owner: &str, problems: &mut Vec<String>) {
    for id in refs {
        if !known.contains(id.as_str()) {
            problems.push(format!("{} references unknown channel {}", owner, id));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::channel::{ChannelTransport, NotificationChannel};
    use crate::endpoint::HealthCheckEndpoint;
    use crate::escalation::{EscalationPolicy, EscalationStep};
    use crate::global::EngineConfig;
    use crate::rule::{Aggregate, AlertRule, ComparisonOp};
    use sentinel_core::SentinelError;
    use sentinel_types::Severity;

    fn chat(id: &str) -> NotificationChannel {
        NotificationChannel::new(
            id,
            ChannelTransport::Chat {
                webhook_url: "http://chat.local/hook".to_string(),
            },
        )
    }

    fn valid_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.channels.push(chat("ops-chat"));
        config
            .endpoints
            .push(HealthCheckEndpoint::new("API Health", "http://localhost/health"));
        config.rules.push(
            AlertRule::new("high_error_rate", "error_rate", ComparisonOp::GreaterThan, 5.0)
                .with_channels(vec!["ops-chat".to_string()]),
        );
        config.escalation_policies.push(EscalationPolicy {
            id: "critical".to_string(),
            severities: vec![Severity::Critical],
            rules: vec![],
            steps: vec![EscalationStep {
                delay_minutes: 10,
                channels: vec!["ops-chat".to_string()],
                assignees: vec!["oncall".to_string()],
            }],
        });
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_unknown_channel_reference() {
        let mut config = valid_config();
        config.rules[0].channels.push("missing".to_string());

        let err = config.validate().unwrap_err();
        assert!(matches!(err, SentinelError::InvalidConfig(_)));
        assert!(err.to_string().contains("unknown channel missing"));
    }

    #[test]
    fn test_collects_multiple_problems() {
        let mut config = valid_config();
        config.endpoints[0].timeout_ms = 0;
        config.rules[0].aggregate = Aggregate::Percentile(120.0);
        config.rules.push(AlertRule::new(
            "high_error_rate",
            "error_rate",
            ComparisonOp::LessThan,
            f64::NAN,
        ));

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("timeout_ms"));
        assert!(message.contains("percentile"));
        assert!(message.contains("duplicate rule id"));
        assert!(message.contains("threshold must be finite"));
    }

    #[test]
    fn test_window_longer_than_retention_rejected() {
        let mut config = valid_config();
        config.retention.max_age_secs = 60;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("exceeds retention"));
    }

    #[test]
    fn test_decreasing_escalation_delay_rejected() {
        let mut config = valid_config();
        config.escalation_policies[0].steps.push(EscalationStep {
            delay_minutes: 5,
            channels: vec!["ops-chat".to_string()],
            assignees: vec![],
        });

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("delay decreases"));
    }
}
