use sentinel_types::{format_labels, Labels, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ComparisonOp {
    #[serde(rename = ">", alias = "gt")]
    GreaterThan,
    #[serde(rename = "<", alias = "lt")]
    LessThan,
    #[serde(rename = ">=", alias = "gte")]
    GreaterEqual,
    #[serde(rename = "<=", alias = "lte")]
    LessEqual,
    #[serde(rename = "==", alias = "eq")]
    Equal,
}

impl ComparisonOp {
    /// 判断 `value` 是否违反阈值
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOp::GreaterThan => value > threshold,
            ComparisonOp::LessThan => value < threshold,
            ComparisonOp::GreaterEqual => value >= threshold,
            ComparisonOp::LessEqual => value <= threshold,
            ComparisonOp::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::LessThan => "<",
            ComparisonOp::GreaterEqual => ">=",
            ComparisonOp::LessEqual => "<=",
            ComparisonOp::Equal => "==",
        }
    }
}

impl FromStr for ComparisonOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" | "gt" => Ok(Self::GreaterThan),
            "<" | "lt" => Ok(Self::LessThan),
            ">=" | "gte" => Ok(Self::GreaterEqual),
            "<=" | "lte" => Ok(Self::LessEqual),
            "==" | "eq" => Ok(Self::Equal),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// 窗口聚合方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    /// 最新值（窗口内每个样本都必须违规）
    #[default]
    Last,
    Average,
    Min,
    Max,
    Percentile(f64),
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Last => f.write_str("last"),
            Aggregate::Average => f.write_str("average"),
            Aggregate::Min => f.write_str("min"),
            Aggregate::Max => f.write_str("max"),
            Aggregate::Percentile(p) => write!(f, "p{}", p),
        }
    }
}

/// 阈值告警规则
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AlertRule {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub metric: String,
    /// 标签选择器（子集匹配）
    #[serde(default)]
    pub labels: Labels,
    pub operator: ComparisonOp,
    pub threshold: f64,
    /// 违规需持续的时间
    #[serde(default = "default_sustained")]
    pub sustained_secs: u64,
    #[serde(default)]
    pub aggregate: Aggregate,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        metric: impl Into<String>,
        operator: ComparisonOp,
        threshold: f64,
    ) -> Self {
        Self {
            id: id.into(),
            description: None,
            metric: metric.into(),
            labels: Labels::new(),
            operator,
            threshold,
            sustained_secs: default_sustained(),
            aggregate: Aggregate::default(),
            severity: default_severity(),
            channels: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_sustained_secs(mut self, secs: u64) -> Self {
        self.sustained_secs = secs;
        self
    }

    pub fn with_aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    pub fn sustained(&self) -> Duration {
        Duration::from_secs(self.sustained_secs)
    }

    /// 规则 + 序列标签组成的告警键
    pub fn alert_key(&self, labels: &Labels) -> String {
        if labels.is_empty() {
            self.id.clone()
        } else {
            format!("{}{{{}}}", self.id, format_labels(labels))
        }
    }

    /// 告警描述：优先使用配置中的描述
    pub fn describe(&self, value: f64) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => format!(
                "{} {} {} (current {:.2}, {} over {}s)",
                self.metric, self.operator, self.threshold, value, self.aggregate, self.sustained_secs
            ),
        }
    }
}

fn default_sustained() -> u64 {
    300
}

fn default_severity() -> Severity {
    Severity::Warning
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_types::labels_from;

    #[test]
    fn test_comparison_ops() {
        assert!(ComparisonOp::GreaterThan.check(7.0, 5.0));
        assert!(!ComparisonOp::GreaterThan.check(5.0, 5.0));
        assert!(ComparisonOp::GreaterEqual.check(5.0, 5.0));
        assert!(ComparisonOp::LessThan.check(1.0, 5.0));
        assert!(ComparisonOp::LessEqual.check(5.0, 5.0));
        assert!(ComparisonOp::Equal.check(5.0, 5.0));
        assert!(!ComparisonOp::Equal.check(5.1, 5.0));
    }

    #[test]
    fn test_operator_parse_roundtrip() {
        for op in [">", "<", ">=", "<=", "=="] {
            let parsed: ComparisonOp = op.parse().unwrap();
            assert_eq!(parsed.to_string(), op);
        }
        assert_eq!("gte".parse::<ComparisonOp>().unwrap(), ComparisonOp::GreaterEqual);
        assert!("~".parse::<ComparisonOp>().is_err());
    }

    #[test]
    fn test_alert_key() {
        let rule = AlertRule::new("high_error_rate", "error_rate", ComparisonOp::GreaterThan, 5.0);

        assert_eq!(rule.alert_key(&Labels::new()), "high_error_rate");
        assert_eq!(
            rule.alert_key(&labels_from([("service", "api"), ("env", "prod")])),
            "high_error_rate{env=prod,service=api}"
        );
    }

    #[test]
    fn test_rule_from_toml() {
        let rule: AlertRule = toml::from_str(
            r#"
id = "p95_latency"
metric = "latency_ms"
operator = ">="
threshold = 250
aggregate = { percentile = 95.0 }
severity = "critical"
"#,
        )
        .unwrap();

        assert_eq!(rule.operator, ComparisonOp::GreaterEqual);
        assert_eq!(rule.aggregate, Aggregate::Percentile(95.0));
        assert_eq!(rule.severity, Severity::Critical);
        assert_eq!(rule.sustained_secs, 300);
        assert!(rule.enabled);
    }
}
