//! 测试用的假通知器与装配

use async_trait::async_trait;
use sentinel_config::{ChannelKind, ChannelTransport, EscalationPolicy, NotificationChannel};
use sentinel_core::ManualClock;
use sentinel_notify::{NotificationDispatcher, Notifier, NotifyMessage, NotifyResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::manager::AlertManager;

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotifyMessage>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<NotifyMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        _channel: &NotificationChannel,
        message: &NotifyMessage,
    ) -> anyhow::Result<NotifyResult> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(NotifyResult::success())
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub struct Fixture {
    pub manager: Arc<AlertManager>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

/// 一个 webhook 渠道 `ops` + 记录型通知器
pub fn fixture(policies: Vec<EscalationPolicy>) -> Fixture {
    let clock = Arc::new(ManualClock::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let channel = NotificationChannel::new(
        "ops",
        ChannelTransport::Webhook {
            url: "http://localhost/ops".to_string(),
            headers: HashMap::new(),
        },
    );

    let dispatcher = Arc::new(NotificationDispatcher::new(
        vec![channel],
        vec![notifier.clone() as Arc<dyn Notifier>],
        Duration::from_secs(5),
        100,
        clock.clone(),
    ));
    let manager = Arc::new(AlertManager::new(dispatcher, policies, 1000, clock.clone()));

    Fixture {
        manager,
        notifier,
        clock,
    }
}
