use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 静默记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Silence {
    pub id: String,
    /// 含 `*` 或 `?` 时按 glob 匹配，否则按子串匹配告警键
    pub pattern: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Silence {
    pub fn matches(&self, key: &str) -> bool {
        pattern_matches(&self.pattern, key)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.ends_at > now
    }
}

fn pattern_matches(pattern: &str, key: &str) -> bool {
    if pattern.contains('*') || pattern.contains('?') {
        glob_match::glob_match(pattern, key)
    } else {
        key.contains(pattern)
    }
}
