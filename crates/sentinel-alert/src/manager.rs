use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_config::{AlertRule, EscalationPolicy};
use sentinel_core::{Result, SentinelError, SharedClock};
use sentinel_notify::{AlertLookup, NotificationDispatcher};
use sentinel_types::{Alert, AlertStatus, Labels, Severity, TimeRange};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::silence::Silence;

/// 告警摘要的保留天数，覆盖最长的月报窗口
const RECORD_RETENTION_DAYS: i64 = 31;

/// 触发请求
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub key: String,
    pub rule_id: String,
    pub metric: String,
    pub severity: Severity,
    pub description: String,
    pub current_value: f64,
    pub threshold: f64,
    pub labels: Labels,
    pub channels: Vec<String>,
}

impl TriggerRequest {
    /// 由阈值规则和违规序列构造
    pub fn from_rule(rule: &AlertRule, labels: Labels, value: f64) -> Self {
        Self {
            key: rule.alert_key(&labels),
            rule_id: rule.id.clone(),
            metric: rule.metric.clone(),
            severity: rule.severity,
            description: rule.describe(value),
            current_value: value,
            threshold: rule.threshold,
            labels,
            channels: rule.channels.clone(),
        }
    }
}

/// 触发结果
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// 新建告警
    Created(Alert),
    /// 告警已存在，只更新了当前值
    Updated(Alert),
}

impl TriggerOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            TriggerOutcome::Created(alert) | TriggerOutcome::Updated(alert) => alert,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, TriggerOutcome::Created(_))
    }
}

/// 报表统计用的告警摘要
///
/// 与 `history` 不同，摘要不受 `max_history` 限制，只按开始时间保留
/// 最近 31 天内的记录。
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub id: String,
    pub key: String,
    pub severity: Severity,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AlertRecord {
    pub fn is_resolved(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn time_to_resolve(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

#[derive(Default)]
struct AlertState {
    live: HashMap<String, Alert>,
    history: VecDeque<Alert>,
    records: VecDeque<AlertRecord>,
    silences: Vec<Silence>,
}

impl AlertState {
    fn matching_silence(&self, key: &str, now: DateTime<Utc>) -> Option<&Silence> {
        self.silences
            .iter()
            .filter(|s| s.is_active(now) && s.matches(key))
            .max_by_key(|s| s.ends_at)
    }

    fn push_record(&mut self, alert: &Alert, now: DateTime<Utc>) {
        let horizon = now - chrono::Duration::days(RECORD_RETENTION_DAYS);
        while self
            .records
            .front()
            .is_some_and(|r| r.is_resolved() && r.start_time < horizon)
        {
            self.records.pop_front();
        }
        self.records.push_back(AlertRecord {
            id: alert.id.clone(),
            key: alert.key.clone(),
            severity: alert.severity,
            start_time: alert.start_time,
            end_time: None,
        });
    }

    fn close_record(&mut self, id: &str, now: DateTime<Utc>) {
        if let Some(record) = self.records.iter_mut().rev().find(|r| r.id == id) {
            record.end_time = Some(now);
        }
    }

    fn push_history(&mut self, alert: Alert, max_history: usize) {
        if self.history.len() >= max_history {
            self.history.pop_front();
        }
        self.history.push_back(alert);
    }

    /// 没有生效静默覆盖的 silenced 告警恢复为 active
    fn release(&mut self, now: DateTime<Utc>, only_due: bool) -> Vec<Alert> {
        let keys: Vec<String> = self
            .live
            .values()
            .filter(|a| a.status == AlertStatus::Silenced)
            .filter(|a| !only_due || a.silenced_until.map(|t| t <= now).unwrap_or(true))
            .map(|a| a.key.clone())
            .collect();

        let mut released = Vec::new();
        for key in keys {
            let cover = self
                .matching_silence(&key, now)
                .map(|s| (s.ends_at, s.reason.clone()));
            let Some(alert) = self.live.get_mut(&key) else {
                continue;
            };
            match cover {
                Some((ends_at, reason)) => {
                    alert.silenced_until = Some(ends_at);
                    alert.silence_reason = Some(reason);
                }
                None => {
                    alert.status = AlertStatus::Active;
                    alert.silenced_until = None;
                    alert.silence_reason = None;
                    alert.updated_at = now;
                    released.push(alert.clone());
                }
            }
        }
        released
    }
}

struct Shared {
    state: RwLock<AlertState>,
}

#[async_trait]
impl AlertLookup for Shared {
    async fn live_alert(&self, key: &str) -> Option<Alert> {
        self.state.read().await.live.get(key).cloned()
    }
}

/// 告警管理器
///
/// 状态迁移在写锁内完成，通知在释放锁之后发送。
pub struct AlertManager {
    shared: Arc<Shared>,
    dispatcher: Arc<NotificationDispatcher>,
    policies: Vec<EscalationPolicy>,
    clock: SharedClock,
    max_history: usize,
}

impl AlertManager {
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        policies: Vec<EscalationPolicy>,
        max_history: usize,
        clock: SharedClock,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(AlertState::default()),
            }),
            dispatcher,
            policies,
            clock,
            max_history: max_history.max(1),
        }
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// 触发告警：同一个键只保留一个未恢复的告警
    pub async fn trigger(&self, request: TriggerRequest) -> TriggerOutcome {
        let now = self.clock.now();

        let outcome = {
            let mut state = self.shared.state.write().await;

            if let Some(existing) = state.live.get_mut(&request.key) {
                existing.current_value = request.current_value;
                existing.updated_at = now;
                debug!(key = %request.key, value = request.current_value, "Alert still firing");
                TriggerOutcome::Updated(existing.clone())
            } else {
                let silence = state
                    .matching_silence(&request.key, now)
                    .map(|s| (s.ends_at, s.reason.clone()));

                let mut alert = Alert {
                    id: Uuid::new_v4().to_string(),
                    key: request.key.clone(),
                    rule_id: request.rule_id,
                    metric: request.metric,
                    current_value: request.current_value,
                    threshold: request.threshold,
                    severity: request.severity,
                    status: AlertStatus::Active,
                    start_time: now,
                    end_time: None,
                    updated_at: now,
                    description: request.description,
                    labels: request.labels,
                    channels: request.channels,
                    silenced_until: None,
                    silence_reason: None,
                };
                if let Some((ends_at, reason)) = silence {
                    alert.status = AlertStatus::Silenced;
                    alert.silenced_until = Some(ends_at);
                    alert.silence_reason = Some(reason);
                }

                state.push_record(&alert, now);
                state.live.insert(alert.key.clone(), alert.clone());
                TriggerOutcome::Created(alert)
            }
        };

        if let TriggerOutcome::Created(alert) = &outcome {
            info!(
                key = %alert.key,
                rule_id = %alert.rule_id,
                severity = %alert.severity,
                status = %alert.status,
                "Alert fired: {}",
                alert.description
            );

            if alert.is_active() {
                self.dispatcher.notify(alert).await;
            }
            if let Some(policy) = EscalationPolicy::find(&self.policies, &alert.rule_id, alert.severity) {
                self.dispatcher
                    .arm_escalation(alert, policy, self.shared.clone())
                    .await;
            }
        }

        outcome
    }

    /// 恢复告警；键不存在或已恢复时返回 false
    pub async fn resolve(&self, key: &str) -> bool {
        let now = self.clock.now();

        let resolved = {
            let mut state = self.shared.state.write().await;
            let Some(mut alert) = state.live.remove(key) else {
                return false;
            };
            let was_silenced = alert.status == AlertStatus::Silenced;
            alert.status = AlertStatus::Resolved;
            alert.end_time = Some(now);
            alert.updated_at = now;
            state.close_record(&alert.id, now);
            state.push_history(alert.clone(), self.max_history);
            (alert, was_silenced)
        };

        let (alert, was_silenced) = resolved;
        info!(
            key = %alert.key,
            rule_id = %alert.rule_id,
            duration_secs = alert.duration(now).num_seconds(),
            "Alert resolved"
        );

        self.dispatcher.cancel_escalation(&alert.id).await;
        if !was_silenced {
            self.dispatcher.notify(&alert).await;
        }
        true
    }

    /// 创建静默，立即作用于匹配的未恢复告警
    pub async fn silence(
        &self,
        pattern: &str,
        duration: chrono::Duration,
        reason: &str,
    ) -> Result<Silence> {
        if pattern.trim().is_empty() {
            return Err(SentinelError::InvalidInput(
                "silence pattern must not be empty".to_string(),
            ));
        }
        if duration <= chrono::Duration::zero() {
            return Err(SentinelError::InvalidInput(
                "silence duration must be positive".to_string(),
            ));
        }

        let now = self.clock.now();
        let ends_at = now.checked_add_signed(duration).ok_or_else(|| {
            SentinelError::InvalidInput("silence duration is out of range".to_string())
        })?;
        let silence = Silence {
            id: Uuid::new_v4().to_string(),
            pattern: pattern.to_string(),
            reason: reason.to_string(),
            created_at: now,
            ends_at,
        };

        let mut state = self.shared.state.write().await;
        let mut affected = 0;
        for alert in state.live.values_mut() {
            if !silence.matches(&alert.key) {
                continue;
            }
            let until = alert
                .silenced_until
                .filter(|_| alert.status == AlertStatus::Silenced)
                .map(|t| t.max(silence.ends_at))
                .unwrap_or(silence.ends_at);
            alert.status = AlertStatus::Silenced;
            alert.silenced_until = Some(until);
            alert.silence_reason = Some(silence.reason.clone());
            alert.updated_at = now;
            affected += 1;
        }
        state.silences.push(silence.clone());

        info!(
            silence_id = %silence.id,
            pattern = %silence.pattern,
            until = %silence.ends_at,
            affected,
            "Silence created"
        );
        Ok(silence)
    }

    /// 提前解除静默
    pub async fn unsilence(&self, id: &str) -> Result<Vec<Alert>> {
        let now = self.clock.now();
        let released = {
            let mut state = self.shared.state.write().await;
            let before = state.silences.len();
            state.silences.retain(|s| s.id != id);
            if state.silences.len() == before {
                return Err(SentinelError::NotFound(format!("silence {}", id)));
            }
            state.release(now, false)
        };

        info!(silence_id = %id, released = released.len(), "Silence removed");
        self.notify_released(&released).await;
        Ok(released)
    }

    /// 清理到期静默，被静默的告警恢复为 active 并重新通知
    pub async fn expire_silences(&self) -> Vec<Alert> {
        let now = self.clock.now();
        let released = {
            let mut state = self.shared.state.write().await;
            let before = state.silences.len();
            state.silences.retain(|s| s.is_active(now));
            let expired = before - state.silences.len();
            if expired > 0 {
                debug!(expired, "Silences expired");
            }
            state.release(now, true)
        };

        self.notify_released(&released).await;
        released
    }

    async fn notify_released(&self, released: &[Alert]) {
        for alert in released {
            info!(key = %alert.key, "Silence ended, alert active again");
            let report = self.dispatcher.notify(alert).await;
            if !report.failed.is_empty() {
                warn!(key = %alert.key, failed = ?report.failed, "Some notifications failed");
            }
        }
    }

    /// 未恢复的告警（active + silenced），按开始时间排序
    pub async fn active_alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.shared.state.read().await.live.values().cloned().collect();
        alerts.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.key.cmp(&b.key)));
        alerts
    }

    pub async fn get(&self, key: &str) -> Option<Alert> {
        self.shared.state.read().await.live.get(key).cloned()
    }

    /// 已恢复告警，最新的在前
    pub async fn history(&self, limit: usize) -> Vec<Alert> {
        self.shared
            .state
            .read()
            .await
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// 开始时间落在范围内的告警摘要（含已恢复），不受历史上限影响
    pub async fn records_in_range(&self, range: TimeRange) -> Vec<AlertRecord> {
        self.shared
            .state
            .read()
            .await
            .records
            .iter()
            .filter(|r| range.contains(r.start_time))
            .cloned()
            .collect()
    }

    /// 开始时间落在范围内的告警（含已恢复）
    ///
    /// 已恢复的部分来自 `history`，超出 `max_history` 的旧告警不在其中。
    pub async fn alerts_in_range(&self, range: TimeRange) -> Vec<Alert> {
        let state = self.shared.state.read().await;
        let mut alerts: Vec<Alert> = state
            .history
            .iter()
            .chain(state.live.values())
            .filter(|a| range.contains(a.start_time))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.key.cmp(&b.key)));
        alerts
    }

    /// 仍在生效的静默
    pub async fn silences(&self) -> Vec<Silence> {
        let now = self.clock.now();
        self.shared
            .state
            .read()
            .await
            .silences
            .iter()
            .filter(|s| s.is_active(now))
            .cloned()
            .collect()
    }
}
