use crate::message::NotifyMessage;
use anyhow::Result;
use async_trait::async_trait;
use sentinel_config::{ChannelKind, NotificationChannel};

/// 通知结果
#[derive(Debug, Clone)]
pub struct NotifyResult {
    pub success: bool,
    pub message: String,
}

impl NotifyResult {
    pub fn success() -> Self {
        Self {
            success: true,
            message: "Notification sent successfully".to_string(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 通知器 trait：一种渠道类型对应一个实现，渠道地址从配置传入
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 发送通知
    async fn send(&self, channel: &NotificationChannel, message: &NotifyMessage)
        -> Result<NotifyResult>;

    /// 支持的渠道类型
    fn kind(&self) -> ChannelKind;

    /// 通知器名称
    fn name(&self) -> &str;
}
