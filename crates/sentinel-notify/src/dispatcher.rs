use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use sentinel_config::{ChannelKind, EscalationPolicy, EscalationStep, NotificationChannel};
use sentinel_core::{SentinelError, SharedClock};
use sentinel_types::Alert;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::message::NotifyMessage;
use crate::notifier::Notifier;

/// 静默中的升级步骤再次检查的最短间隔
const SILENCED_STEP_RECHECK: Duration = Duration::from_secs(30);

/// 升级定时器触发时回查告警当前状态
#[async_trait]
pub trait AlertLookup: Send + Sync {
    /// 按键返回当前未恢复的告警
    async fn live_alert(&self, key: &str) -> Option<Alert>;
}

/// 单次投递记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub alert_id: String,
    pub alert_key: String,
    pub channel: String,
    pub kind: ChannelKind,
    pub step: Option<usize>,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 一次分发的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// 通知分发器
pub struct NotificationDispatcher {
    channels: Vec<NotificationChannel>,
    transports: HashMap<ChannelKind, Arc<dyn Notifier>>,
    timeout: Duration,
    clock: SharedClock,
    deliveries: Mutex<VecDeque<DeliveryRecord>>,
    delivery_log_size: usize,
    escalations: Mutex<HashMap<String, JoinHandle<()>>>,
    closed: AtomicBool,
}

impl NotificationDispatcher {
    pub fn new(
        channels: Vec<NotificationChannel>,
        notifiers: Vec<Arc<dyn Notifier>>,
        timeout: Duration,
        delivery_log_size: usize,
        clock: SharedClock,
    ) -> Self {
        let mut transports = HashMap::new();
        for notifier in notifiers {
            info!("Registered notifier: {}", notifier.name());
            transports.insert(notifier.kind(), notifier);
        }

        Self {
            channels,
            transports,
            timeout,
            clock,
            deliveries: Mutex::new(VecDeque::new()),
            delivery_log_size: delivery_log_size.max(1),
            escalations: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn channels(&self) -> &[NotificationChannel] {
        &self.channels
    }

    /// 告警的目标渠道：显式指定优先，否则按级别过滤；禁用渠道跳过
    pub fn route(&self, alert: &Alert) -> Vec<&NotificationChannel> {
        if alert.channels.is_empty() {
            self.channels
                .iter()
                .filter(|c| c.enabled && c.accepts(alert.severity))
                .collect()
        } else {
            self.resolve_ids(&alert.channels)
        }
    }

    fn resolve_ids(&self, ids: &[String]) -> Vec<&NotificationChannel> {
        ids.iter()
            .filter_map(|id| {
                let found = self.channels.iter().find(|c| &c.id == id);
                if found.is_none() {
                    warn!(channel = %id, "Unknown notification channel");
                }
                found
            })
            .filter(|c| c.enabled)
            .collect()
    }

    /// 发送告警通知（触发或恢复）
    pub async fn notify(&self, alert: &Alert) -> DispatchReport {
        let targets = self.route(alert);
        let message = NotifyMessage::for_alert(alert);
        self.dispatch(targets, &message).await
    }

    /// 发送升级步骤通知
    pub async fn notify_step(&self, alert: &Alert, index: usize, step: &EscalationStep) -> DispatchReport {
        let targets = self.resolve_ids(&step.channels);
        let message = NotifyMessage::for_step(alert, index, step);
        self.dispatch(targets, &message).await
    }

    async fn dispatch(&self, targets: Vec<&NotificationChannel>, message: &NotifyMessage) -> DispatchReport {
        if targets.is_empty() {
            debug!(key = %message.alert_key, "No notification channel matched");
            return DispatchReport::default();
        }

        let sends = targets.into_iter().map(|channel| async move {
            let outcome = self.send_one(channel, message).await;
            (channel, outcome)
        });
        let outcomes = join_all(sends).await;

        let mut report = DispatchReport::default();
        let mut records = Vec::with_capacity(outcomes.len());
        let now = self.clock.now();

        for (channel, outcome) in outcomes {
            let error = match outcome {
                Ok(()) => {
                    info!(channel = %channel.id, key = %message.alert_key, "Notification sent: {}", message.title);
                    report.delivered.push(channel.id.clone());
                    None
                }
                Err(e) => {
                    error!(channel = %channel.id, key = %message.alert_key, "{}", e);
                    report.failed.push(channel.id.clone());
                    Some(e.to_string())
                }
            };
            records.push(DeliveryRecord {
                alert_id: message.alert_id.clone(),
                alert_key: message.alert_key.clone(),
                channel: channel.id.clone(),
                kind: channel.kind(),
                step: message.step,
                success: error.is_none(),
                error,
                timestamp: now,
            });
        }

        self.log_deliveries(records).await;
        report
    }

    async fn send_one(&self, channel: &NotificationChannel, message: &NotifyMessage) -> Result<(), SentinelError> {
        let failure = |reason: String| SentinelError::NotificationFailure {
            channel: channel.id.clone(),
            reason,
        };

        let notifier = self
            .transports
            .get(&channel.kind())
            .ok_or_else(|| failure(format!("no transport registered for {}", channel.kind())))?;

        match tokio::time::timeout(self.timeout, notifier.send(channel, message)).await {
            Ok(Ok(result)) if result.success => Ok(()),
            Ok(Ok(result)) => Err(failure(result.message)),
            Ok(Err(e)) => Err(failure(e.to_string())),
            Err(_) => Err(failure(format!("timed out after {:?}", self.timeout))),
        }
    }

    async fn log_deliveries(&self, records: Vec<DeliveryRecord>) {
        let mut log = self.deliveries.lock().await;
        for record in records {
            if log.len() >= self.delivery_log_size {
                log.pop_front();
            }
            log.push_back(record);
        }
    }

    /// 最近的投递记录，最新的在前
    pub async fn recent_deliveries(&self, limit: usize) -> Vec<DeliveryRecord> {
        self.deliveries
            .lock()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// 为告警启动升级定时器
    ///
    /// 每个步骤的延迟从告警开始时间算起；触发时告警必须仍处于 active，
    /// 处于 silenced 时推迟到静默结束后再发送。`shutdown` 之后不再启动。
    pub async fn arm_escalation(
        self: &Arc<Self>,
        alert: &Alert,
        policy: &EscalationPolicy,
        lookup: Arc<dyn AlertLookup>,
    ) {
        if policy.steps.is_empty() {
            return;
        }
        if self.closed.load(Ordering::SeqCst) {
            debug!(key = %alert.key, "Dispatcher shut down, escalation not armed");
            return;
        }

        let elapsed = (self.clock.now() - alert.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let origin = Instant::now()
            .checked_sub(elapsed)
            .unwrap_or_else(Instant::now);

        let dispatcher = Arc::clone(self);
        let steps = policy.steps.clone();
        let alert_id = alert.id.clone();
        let key = alert.key.clone();
        let policy_id = policy.id.clone();

        let task = {
            let alert_id = alert_id.clone();
            tokio::spawn(async move {
                for (index, step) in steps.iter().enumerate() {
                    let mut due = origin + step.delay();
                    loop {
                        tokio::time::sleep_until(due).await;

                        match lookup.live_alert(&key).await {
                            Some(current) if current.id == alert_id && current.is_active() => {
                                info!(key = %key, policy = %policy_id, step = index + 1, "Escalating alert");
                                dispatcher.notify_step(&current, index, step).await;
                                break;
                            }
                            Some(current) if current.id == alert_id => {
                                let wait = dispatcher.silence_remaining(&current);
                                debug!(
                                    key = %key,
                                    status = %current.status,
                                    step = index + 1,
                                    wait_secs = wait.as_secs(),
                                    "Escalation step deferred"
                                );
                                due = Instant::now() + wait;
                            }
                            _ => {
                                debug!(key = %key, "Alert no longer live, stopping escalation");
                                return;
                            }
                        }
                    }
                }
            })
        };

        let mut escalations = self.escalations.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            task.abort();
            return;
        }
        escalations.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = escalations.insert(alert_id, task) {
            previous.abort();
        }
    }

    /// 距离静默结束的时间，至少为一个复查间隔
    fn silence_remaining(&self, alert: &Alert) -> Duration {
        alert
            .silenced_until
            .and_then(|until| (until - self.clock.now()).to_std().ok())
            .unwrap_or(Duration::ZERO)
            .max(SILENCED_STEP_RECHECK)
    }

    /// 取消告警的升级定时器
    pub async fn cancel_escalation(&self, alert_id: &str) -> bool {
        match self.escalations.lock().await.remove(alert_id) {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                if pending {
                    debug!(alert_id = %alert_id, "Escalation cancelled");
                }
                pending
            }
            None => false,
        }
    }

    /// 尚未结束的升级定时器数量
    pub async fn pending_escalations(&self) -> usize {
        self.escalations
            .lock()
            .await
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// 取消全部升级定时器，此后不再接受新的升级
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut escalations = self.escalations.lock().await;
        let count = escalations.len();
        for (_, handle) in escalations.drain() {
            handle.abort();
        }
        if count > 0 {
            info!(count, "Escalation timers cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sentinel_config::ChannelTransport;
    use sentinel_core::{Clock, ManualClock};
    use sentinel_types::{AlertStatus, Labels, Severity};
    use std::sync::Mutex as StdMutex;

    use crate::notifier::NotifyResult;

    /// 记录所有发送的假通知器
    #[derive(Default)]
    struct RecordingNotifier {
        sent: StdMutex<Vec<(String, NotifyMessage)>>,
        fail_channel: Option<String>,
        hang_channel: Option<String>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, NotifyMessage)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, channel: &NotificationChannel, message: &NotifyMessage) -> Result<NotifyResult> {
            if self.hang_channel.as_deref() == Some(channel.id.as_str()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.fail_channel.as_deref() == Some(channel.id.as_str()) {
                anyhow::bail!("connection refused");
            }
            self.sent
                .lock()
                .unwrap()
                .push((channel.id.clone(), message.clone()));
            Ok(NotifyResult::success())
        }

        fn kind(&self) -> ChannelKind {
            ChannelKind::Webhook
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct FakeLookup {
        alert: StdMutex<Option<Alert>>,
    }

    #[async_trait]
    impl AlertLookup for FakeLookup {
        async fn live_alert(&self, key: &str) -> Option<Alert> {
            self.alert
                .lock()
                .unwrap()
                .clone()
                .filter(|a| a.key == key && a.is_live())
        }
    }

    fn hook(id: &str) -> NotificationChannel {
        NotificationChannel::new(
            id,
            ChannelTransport::Webhook {
                url: format!("http://localhost/{}", id),
                headers: HashMap::new(),
            },
        )
    }

    fn alert(severity: Severity) -> Alert {
        let now = Utc::now();
        Alert {
            id: "alert-1".to_string(),
            key: "cpu_high".to_string(),
            rule_id: "cpu_high".to_string(),
            metric: "cpu".to_string(),
            current_value: 95.0,
            threshold: 90.0,
            severity,
            status: AlertStatus::Active,
            start_time: now,
            end_time: None,
            updated_at: now,
            description: "cpu > 90".to_string(),
            labels: Labels::new(),
            channels: vec![],
            silenced_until: None,
            silence_reason: None,
        }
    }

    fn dispatcher(
        channels: Vec<NotificationChannel>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
    ) -> Arc<NotificationDispatcher> {
        Arc::new(NotificationDispatcher::new(
            channels,
            vec![notifier as Arc<dyn Notifier>],
            Duration::from_secs(5),
            10,
            clock,
        ))
    }

    fn policy(delays: &[u64]) -> EscalationPolicy {
        EscalationPolicy {
            id: "critical".to_string(),
            severities: vec![Severity::Critical],
            rules: vec![],
            steps: delays
                .iter()
                .map(|d| EscalationStep {
                    delay_minutes: *d,
                    channels: vec!["pager".to_string()],
                    assignees: vec!["oncall".to_string()],
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_routes_by_severity_and_skips_disabled() {
        let notifier = Arc::new(RecordingNotifier::default());
        let channels = vec![
            hook("all"),
            hook("critical-only").with_severities(vec![Severity::Critical]),
            hook("off").disabled(),
        ];
        let dispatcher = dispatcher(channels, notifier.clone(), Arc::new(ManualClock::default()));

        let report = dispatcher.notify(&alert(Severity::Warning)).await;
        assert_eq!(report.delivered, vec!["all".to_string()]);

        let report = dispatcher.notify(&alert(Severity::Critical)).await;
        assert_eq!(report.delivered.len(), 2);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_channels_override_routing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(
            vec![hook("a"), hook("b")],
            notifier.clone(),
            Arc::new(ManualClock::default()),
        );

        let mut alert = alert(Severity::Info);
        alert.channels = vec!["b".to_string(), "missing".to_string()];

        let report = dispatcher.notify(&alert).await;
        assert_eq!(report.delivered, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_on_one_channel_does_not_block_others() {
        let notifier = Arc::new(RecordingNotifier {
            fail_channel: Some("broken".to_string()),
            ..Default::default()
        });
        let dispatcher = dispatcher(
            vec![hook("broken"), hook("ok")],
            notifier.clone(),
            Arc::new(ManualClock::default()),
        );

        let report = dispatcher.notify(&alert(Severity::Critical)).await;
        assert_eq!(report.delivered, vec!["ok".to_string()]);
        assert_eq!(report.failed, vec!["broken".to_string()]);

        let log = dispatcher.recent_deliveries(10).await;
        assert_eq!(log.len(), 2);
        let broken = log.iter().find(|r| r.channel == "broken").unwrap();
        assert!(!broken.success);
        assert!(broken.error.as_ref().unwrap().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_is_bounded_by_timeout() {
        let notifier = Arc::new(RecordingNotifier {
            hang_channel: Some("slow".to_string()),
            ..Default::default()
        });
        let dispatcher = dispatcher(
            vec![hook("slow"), hook("fast")],
            notifier.clone(),
            Arc::new(ManualClock::default()),
        );

        let report = dispatcher.notify(&alert(Severity::Critical)).await;
        assert_eq!(report.delivered, vec!["fast".to_string()]);
        assert_eq!(report.failed, vec!["slow".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_transport_is_failure() {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            vec![NotificationChannel::new(
                "chat",
                ChannelTransport::Chat {
                    webhook_url: "http://localhost/chat".to_string(),
                },
            )],
            vec![Arc::new(RecordingNotifier::default()) as Arc<dyn Notifier>],
            Duration::from_secs(1),
            10,
            Arc::new(ManualClock::default()),
        ));

        let report = dispatcher.notify(&alert(Severity::Critical)).await;
        assert_eq!(report.failed, vec!["chat".to_string()]);
    }

    #[tokio::test]
    async fn test_delivery_log_is_bounded() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(vec![hook("a")], notifier, Arc::new(ManualClock::default()));

        for _ in 0..15 {
            dispatcher.notify(&alert(Severity::Info)).await;
        }
        assert_eq!(dispatcher.recent_deliveries(100).await.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_steps_fire_in_order() {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::default());
        let dispatcher = dispatcher(vec![hook("pager")], notifier.clone(), clock);
        let alert = alert(Severity::Critical);
        let lookup = Arc::new(FakeLookup {
            alert: StdMutex::new(Some(alert.clone())),
        });

        dispatcher.arm_escalation(&alert, &policy(&[5, 15]), lookup).await;
        assert_eq!(dispatcher.pending_escalations().await, 1);

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert!(notifier.sent().is_empty());

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent()[0].1.step, Some(1));

        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1.step, Some(2));
        assert_eq!(sent[1].1.assignees, vec!["oncall".to_string()]);
        assert_eq!(dispatcher.pending_escalations().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_pending_steps() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(vec![hook("pager")], notifier.clone(), Arc::new(ManualClock::default()));
        let alert = alert(Severity::Critical);
        let lookup = Arc::new(FakeLookup {
            alert: StdMutex::new(Some(alert.clone())),
        });

        dispatcher.arm_escalation(&alert, &policy(&[10]), lookup).await;
        assert!(dispatcher.cancel_escalation(&alert.id).await);

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert!(notifier.sent().is_empty());
        assert!(!dispatcher.cancel_escalation(&alert.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silenced_step_waits_until_active() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(vec![hook("pager")], notifier.clone(), Arc::new(ManualClock::default()));
        let alert = alert(Severity::Critical);
        let mut silenced = alert.clone();
        silenced.status = AlertStatus::Silenced;
        let lookup = Arc::new(FakeLookup {
            alert: StdMutex::new(Some(silenced)),
        });

        dispatcher.arm_escalation(&alert, &policy(&[1, 2]), lookup.clone()).await;

        // 第一步在 60s 到期，静默中推迟
        tokio::time::sleep(Duration::from_secs(75)).await;
        assert!(notifier.sent().is_empty());
        assert_eq!(dispatcher.pending_escalations().await, 1);

        *lookup.alert.lock().unwrap() = Some(alert.clone());
        tokio::time::sleep(Duration::from_secs(60)).await;
        let steps: Vec<_> = notifier.sent().iter().map(|(_, m)| m.step).collect();
        assert_eq!(steps, vec![Some(1), Some(2)]);
        assert_eq!(dispatcher.pending_escalations().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silenced_step_sleeps_until_silence_ends() {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::default());
        let dispatcher = dispatcher(vec![hook("pager")], notifier.clone(), clock.clone());
        let alert = alert(Severity::Critical);
        let mut silenced = alert.clone();
        silenced.status = AlertStatus::Silenced;
        silenced.silenced_until = Some(clock.now() + chrono::Duration::minutes(30));
        let lookup = Arc::new(FakeLookup {
            alert: StdMutex::new(Some(silenced)),
        });

        dispatcher.arm_escalation(&alert, &policy(&[5]), lookup.clone()).await;

        tokio::time::sleep(Duration::from_secs(20 * 60)).await;
        *lookup.alert.lock().unwrap() = Some(alert.clone());
        assert!(notifier.sent().is_empty());

        // 推迟到 5min + 30min 再检查
        tokio::time::sleep(Duration::from_secs(14 * 60)).await;
        assert!(notifier.sent().is_empty());

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent()[0].1.step, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_all_timers() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(vec![hook("pager")], notifier.clone(), Arc::new(ManualClock::default()));

        for i in 0..3 {
            let mut alert = alert(Severity::Critical);
            alert.id = format!("alert-{}", i);
            alert.key = format!("key-{}", i);
            let lookup = Arc::new(FakeLookup {
                alert: StdMutex::new(Some(alert.clone())),
            });
            dispatcher.arm_escalation(&alert, &policy(&[5]), lookup).await;
        }
        assert_eq!(dispatcher.pending_escalations().await, 3);

        dispatcher.shutdown().await;
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert!(notifier.sent().is_empty());
        assert_eq!(dispatcher.pending_escalations().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_escalation_armed_after_shutdown() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = dispatcher(vec![hook("pager")], notifier.clone(), Arc::new(ManualClock::default()));
        dispatcher.shutdown().await;

        let alert = alert(Severity::Critical);
        let lookup = Arc::new(FakeLookup {
            alert: StdMutex::new(Some(alert.clone())),
        });
        dispatcher.arm_escalation(&alert, &policy(&[1]), lookup).await;
        assert_eq!(dispatcher.pending_escalations().await, 0);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert!(notifier.sent().is_empty());

        // 普通通知不受影响
        let report = dispatcher.notify(&alert).await;
        assert_eq!(report.delivered, vec!["pager".to_string()]);
    }
}
