use sentinel_types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 通知渠道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Chat,
    Pager,
    Sms,
    Webhook,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Email => "email",
            ChannelKind::Chat => "chat",
            ChannelKind::Pager => "pager",
            ChannelKind::Sms => "sms",
            ChannelKind::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

/// 渠道投递目标
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelTransport {
    Email {
        smtp_host: String,
        #[serde(default = "default_smtp_port")]
        smtp_port: u16,
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
        from: String,
        to: Vec<String>,
    },
    Chat {
        webhook_url: String,
    },
    Pager {
        #[serde(default = "default_pager_url")]
        events_url: String,
        routing_key: String,
    },
    Sms {
        gateway_url: String,
        #[serde(default)]
        api_key: String,
        to: Vec<String>,
    },
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl ChannelTransport {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelTransport::Email { .. } => ChannelKind::Email,
            ChannelTransport::Chat { .. } => ChannelKind::Chat,
            ChannelTransport::Pager { .. } => ChannelKind::Pager,
            ChannelTransport::Sms { .. } => ChannelKind::Sms,
            ChannelTransport::Webhook { .. } => ChannelKind::Webhook,
        }
    }

    /// 用于日志的目标描述（不含凭据）
    pub fn destination(&self) -> String {
        match self {
            ChannelTransport::Email { to, .. } => to.join(","),
            ChannelTransport::Chat { webhook_url } => webhook_url.clone(),
            ChannelTransport::Pager { events_url, .. } => events_url.clone(),
            ChannelTransport::Sms { to, .. } => to.join(","),
            ChannelTransport::Webhook { url, .. } => url.clone(),
        }
    }
}

/// 通知渠道配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NotificationChannel {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 按级别路由时接收的级别，为空表示全部
    #[serde(default)]
    pub severities: Vec<Severity>,
    pub transport: ChannelTransport,
}

impl NotificationChannel {
    pub fn new(id: impl Into<String>, transport: ChannelTransport) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            severities: Vec::new(),
            transport,
        }
    }

    pub fn with_severities(mut self, severities: Vec<Severity>) -> Self {
        self.severities = severities;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn kind(&self) -> ChannelKind {
        self.transport.kind()
    }

    pub fn accepts(&self, severity: Severity) -> bool {
        self.severities.is_empty() || self.severities.contains(&severity)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_smtp_port() -> u16 {
    587
}

fn default_pager_url() -> String {
    "https://events.pagerduty.com/v2/enqueue".to_string()
}
