use crate::message::NotifyMessage;
use crate::notifier::{Notifier, NotifyResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sentinel_config::{ChannelKind, ChannelTransport, NotificationChannel};
use sentinel_types::Severity;
use std::sync::Arc;

/// 所有内置通知器，共享一个 HTTP 客户端
pub fn default_notifiers() -> Vec<Arc<dyn Notifier>> {
    let client = reqwest::Client::new();
    vec![
        Arc::new(EmailNotifier::new()),
        Arc::new(ChatNotifier::new(client.clone())),
        Arc::new(PagerNotifier::new(client.clone())),
        Arc::new(SmsNotifier::new(client.clone())),
        Arc::new(WebhookNotifier::new(client)),
    ]
}

fn mismatch(channel: &NotificationChannel, expected: ChannelKind) -> anyhow::Error {
    anyhow!(
        "channel {} is {}, expected {}",
        channel.id,
        channel.kind(),
        expected
    )
}

async fn check_status(response: reqwest::Response, label: &str) -> Result<NotifyResult> {
    if response.status().is_success() {
        Ok(NotifyResult::success())
    } else {
        Ok(NotifyResult::failure(format!(
            "{} failed with status: {}",
            label,
            response.status()
        )))
    }
}

// ============================================================================
// 邮件通知
// ============================================================================

#[derive(Debug, Default)]
pub struct EmailNotifier;

impl EmailNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, channel: &NotificationChannel, message: &NotifyMessage) -> Result<NotifyResult> {
        use lettre::message::header::ContentType;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

        let ChannelTransport::Email {
            smtp_host,
            smtp_port,
            username,
            password,
            from,
            to,
        } = &channel.transport
        else {
            return Err(mismatch(channel, ChannelKind::Email));
        };

        let mut builder = Message::builder()
            .from(from.parse()?)
            .subject(&message.title)
            .header(ContentType::TEXT_PLAIN);
        for recipient in to {
            builder = builder.to(recipient.parse()?);
        }
        let email = builder.body(message.content.clone())?;

        // 465 为隐式 TLS，其余端口走 STARTTLS
        let mut transport = if *smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)?
        }
        .port(*smtp_port);
        if !username.is_empty() {
            transport = transport.credentials(Credentials::new(username.clone(), password.clone()));
        }
        let mailer = transport.build();

        match mailer.send(email).await {
            Ok(_) => Ok(NotifyResult::success()),
            Err(e) => Ok(NotifyResult::failure(format!("Email send failed: {}", e))),
        }
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn name(&self) -> &str {
        "email"
    }
}

// ============================================================================
// 聊天机器人通知
// ============================================================================

pub struct ChatNotifier {
    client: reqwest::Client,
}

impl ChatNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_message(message: &NotifyMessage) -> serde_json::Value {
        serde_json::json!({
            "text": format!("*{}*\n{}", message.title, message.content),
        })
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn send(&self, channel: &NotificationChannel, message: &NotifyMessage) -> Result<NotifyResult> {
        let ChannelTransport::Chat { webhook_url } = &channel.transport else {
            return Err(mismatch(channel, ChannelKind::Chat));
        };

        let response = self
            .client
            .post(webhook_url)
            .json(&Self::build_message(message))
            .send()
            .await?;

        check_status(response, "Chat").await
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Chat
    }

    fn name(&self) -> &str {
        "chat"
    }
}

// ============================================================================
// 值班寻呼通知（Events API v2 格式）
// ============================================================================

pub struct PagerNotifier {
    client: reqwest::Client,
}

impl PagerNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_event(routing_key: &str, message: &NotifyMessage) -> serde_json::Value {
        let severity = match message.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        let action = if message.resolved { "resolve" } else { "trigger" };

        serde_json::json!({
            "routing_key": routing_key,
            "event_action": action,
            "dedup_key": message.alert_key,
            "payload": {
                "summary": message.title,
                "severity": severity,
                "source": "sentinel",
                "timestamp": message.timestamp.to_rfc3339(),
                "custom_details": {
                    "content": message.content,
                    "assignees": message.assignees,
                },
            },
        })
    }
}

#[async_trait]
impl Notifier for PagerNotifier {
    async fn send(&self, channel: &NotificationChannel, message: &NotifyMessage) -> Result<NotifyResult> {
        let ChannelTransport::Pager {
            events_url,
            routing_key,
        } = &channel.transport
        else {
            return Err(mismatch(channel, ChannelKind::Pager));
        };

        let response = self
            .client
            .post(events_url)
            .json(&Self::build_event(routing_key, message))
            .send()
            .await?;

        check_status(response, "Pager").await
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Pager
    }

    fn name(&self) -> &str {
        "pager"
    }
}

// ============================================================================
// 短信网关通知
// ============================================================================

pub struct SmsNotifier {
    client: reqwest::Client,
}

impl SmsNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for SmsNotifier {
    async fn send(&self, channel: &NotificationChannel, message: &NotifyMessage) -> Result<NotifyResult> {
        let ChannelTransport::Sms {
            gateway_url,
            api_key,
            to,
        } = &channel.transport
        else {
            return Err(mismatch(channel, ChannelKind::Sms));
        };

        // 短信只发标题
        let body = serde_json::json!({
            "to": to,
            "message": message.title,
        });

        let mut request = self.client.post(gateway_url).json(&body);
        if !api_key.is_empty() {
            request = request.bearer_auth(api_key);
        }
        let response = request.send().await?;

        check_status(response, "SMS").await
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn name(&self) -> &str {
        "sms"
    }
}

// ============================================================================
// Webhook 通知
// ============================================================================

pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, channel: &NotificationChannel, message: &NotifyMessage) -> Result<NotifyResult> {
        let ChannelTransport::Webhook { url, headers } = &channel.transport else {
            return Err(mismatch(channel, ChannelKind::Webhook));
        };

        let mut request = self.client.post(url);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.json(message).send().await?;
        check_status(response, "Webhook").await
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
