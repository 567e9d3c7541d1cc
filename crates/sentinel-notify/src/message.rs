use chrono::{DateTime, Utc};
use sentinel_config::EscalationStep;
use sentinel_types::{format_labels, Alert, AlertStatus, Severity};
use serde::{Deserialize, Serialize};

/// 通知消息
///
/// 内容只由告警本身决定，同一告警状态总是得到相同的文本。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyMessage {
    /// 标题
    pub title: String,

    /// 正文
    pub content: String,

    pub severity: Severity,

    pub resolved: bool,

    pub alert_id: String,

    pub alert_key: String,

    /// 告警开始时间（恢复消息为结束时间）
    pub timestamp: DateTime<Utc>,

    /// 升级步骤序号（从 1 开始）
    pub step: Option<usize>,

    #[serde(default)]
    pub assignees: Vec<String>,
}

impl NotifyMessage {
    pub fn for_alert(alert: &Alert) -> Self {
        let resolved = alert.status == AlertStatus::Resolved;
        let marker = if resolved { "RESOLVED" } else { "ACTIVE" };

        let title = format!(
            "[{}] [{}] {}",
            marker,
            alert.severity.as_str().to_uppercase(),
            alert.description
        );

        let mut lines = vec![
            format!("Status: {}", marker),
            format!("Severity: {}", alert.severity),
            format!("Description: {}", alert.description),
            format!("Metric: {}", alert.metric),
            format!("Current value: {:.2}", alert.current_value),
            format!("Threshold: {:.2}", alert.threshold),
            format!("Started: {}", alert.start_time.to_rfc3339()),
        ];
        if let Some(end) = alert.end_time.filter(|_| resolved) {
            lines.push(format!("Ended: {}", end.to_rfc3339()));
        }
        if !alert.labels.is_empty() {
            lines.push(format!("Labels: {}", format_labels(&alert.labels)));
        }

        Self {
            title,
            content: lines.join("\n"),
            severity: alert.severity,
            resolved,
            alert_id: alert.id.clone(),
            alert_key: alert.key.clone(),
            timestamp: alert.end_time.filter(|_| resolved).unwrap_or(alert.start_time),
            step: None,
            assignees: Vec::new(),
        }
    }

    /// 升级通知：在告警消息后追加步骤与责任人
    pub fn for_step(alert: &Alert, index: usize, step: &EscalationStep) -> Self {
        let mut message = Self::for_alert(alert);
        let number = index + 1;

        message.title = format!("{} (escalation step {})", message.title, number);
        message.content.push_str(&format!("\nEscalation step: {}", number));
        if !step.assignees.is_empty() {
            message
                .content
                .push_str(&format!("\nAssignees: {}", step.assignees.join(", ")));
        }
        message.step = Some(number);
        message.assignees = step.assignees.clone();
        message
    }

    pub fn status_marker(&self) -> &'static str {
        if self.resolved {
            "RESOLVED"
        } else {
            "ACTIVE"
        }
    }
}
