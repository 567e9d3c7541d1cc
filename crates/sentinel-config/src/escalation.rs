use sentinel_types::Severity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 升级步骤
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EscalationStep {
    /// 相对告警开始时间的延迟
    pub delay_minutes: u64,
    pub channels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
}

impl EscalationStep {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_minutes * 60)
    }
}

/// 升级策略
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EscalationPolicy {
    pub id: String,
    #[serde(default)]
    pub severities: Vec<Severity>,
    #[serde(default)]
    pub rules: Vec<String>,
    pub steps: Vec<EscalationStep>,
}

impl EscalationPolicy {
    /// 为告警挑选策略：规则 ID 精确匹配优先于级别匹配
    pub fn find<'a>(
        policies: &'a [EscalationPolicy],
        rule_id: &str,
        severity: Severity,
    ) -> Option<&'a EscalationPolicy> {
        policies
            .iter()
            .find(|p| p.rules.iter().any(|r| r == rule_id))
            .or_else(|| policies.iter().find(|p| p.severities.contains(&severity)))
    }
}
