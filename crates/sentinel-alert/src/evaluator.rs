use chrono::{DateTime, Duration, Utc};
use sentinel_config::{Aggregate, AlertRule};
use sentinel_core::{SentinelError, SharedClock};
use sentinel_timeseries::{stats, MetricStore, SeriesWindow};
use sentinel_types::{Labels, TimeRange};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::manager::{AlertManager, TriggerRequest};

/// 一次评估的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    /// 参与评估的序列数
    pub evaluated: usize,
    /// 处于违规状态并调用了 trigger 的序列数
    pub triggered: usize,
    /// 实际恢复的告警数
    pub resolved: usize,
    pub skipped: usize,
    /// 最新样本违规但尚未持续满窗口
    pub pending: usize,
}

enum Verdict {
    Violating(f64),
    Healthy,
    Pending,
    Skipped(String),
}

/// 阈值规则评估器
pub struct ThresholdEvaluator {
    rules: Vec<AlertRule>,
    store: Arc<MetricStore>,
    manager: Arc<AlertManager>,
    clock: SharedClock,
}

impl ThresholdEvaluator {
    pub fn new(
        rules: Vec<AlertRule>,
        store: Arc<MetricStore>,
        manager: Arc<AlertManager>,
        clock: SharedClock,
    ) -> Self {
        Self {
            rules,
            store,
            manager,
            clock,
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// 评估全部启用的规则，并清理到期静默
    pub async fn evaluate_once(&self) -> EvaluationSummary {
        self.manager.expire_silences().await;

        let mut summary = EvaluationSummary::default();
        for rule in self.rules.iter().filter(|r| r.enabled) {
            self.evaluate_rule(rule, &mut summary).await;
        }

        if summary.triggered > 0 || summary.resolved > 0 {
            info!(
                evaluated = summary.evaluated,
                triggered = summary.triggered,
                resolved = summary.resolved,
                skipped = summary.skipped,
                pending = summary.pending,
                "Evaluation finished"
            );
        } else {
            debug!(
                evaluated = summary.evaluated,
                skipped = summary.skipped,
                pending = summary.pending,
                "Evaluation finished"
            );
        }
        summary
    }

    async fn evaluate_rule(&self, rule: &AlertRule, summary: &mut EvaluationSummary) {
        let now = self.clock.now();
        let start = Duration::from_std(rule.sustained())
            .ok()
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let range = TimeRange::new(start, now);

        let windows = self.store.select(&rule.metric, &rule.labels, range).await;
        if windows.is_empty() {
            summary.skipped += 1;
            log_skip(rule, &Labels::new(), "no data".to_string());
            return;
        }

        for window in windows {
            summary.evaluated += 1;
            let key = rule.alert_key(&window.labels);

            match judge(rule, &window, range) {
                Verdict::Violating(value) => {
                    summary.triggered += 1;
                    let request = TriggerRequest::from_rule(rule, window.labels, value);
                    self.manager.trigger(request).await;
                }
                Verdict::Healthy => {
                    if self.manager.resolve(&key).await {
                        summary.resolved += 1;
                    }
                }
                Verdict::Pending => {
                    summary.pending += 1;
                    debug!(rule_id = %rule.id, key = %key, "Violation not yet sustained");
                }
                Verdict::Skipped(reason) => {
                    summary.skipped += 1;
                    log_skip(rule, &window.labels, reason);
                }
            }
        }
    }
}

fn log_skip(rule: &AlertRule, labels: &Labels, reason: String) {
    let err = SentinelError::EvaluationSkipped {
        rule: rule.alert_key(labels),
        reason,
    };
    debug!(rule_id = %rule.id, "{}", err);
}

/// 窗口被数据覆盖：存在时间不晚于窗口起点的样本
fn covered(window: &SeriesWindow, range: TimeRange) -> bool {
    window.anchor.is_some()
        || window
            .points
            .first()
            .map(|p| p.timestamp <= range.start)
            .unwrap_or(false)
}

fn judge(rule: &AlertRule, window: &SeriesWindow, range: TimeRange) -> Verdict {
    let Some(latest) = window.latest() else {
        return Verdict::Skipped("no data".to_string());
    };
    let violates = |value: f64| rule.operator.check(value, rule.threshold);

    match rule.aggregate {
        Aggregate::Last => {
            if !violates(latest.value) {
                return Verdict::Healthy;
            }
            let sustained = covered(window, range)
                && window.points.iter().all(|p| violates(p.value))
                && window.anchor.as_ref().map(|a| violates(a.value)).unwrap_or(true);
            if sustained {
                Verdict::Violating(latest.value)
            } else {
                Verdict::Pending
            }
        }
        aggregate => {
            if !covered(window, range) {
                return Verdict::Skipped(format!(
                    "data does not cover the {}s window",
                    rule.sustained_secs
                ));
            }

            let mut values = window.values();
            if values.is_empty() {
                // 窗口内无新样本，沿用窗口前最后一个值
                values.push(latest.value);
            }

            let value = match aggregate {
                Aggregate::Average => stats::average(&values),
                Aggregate::Min => stats::min(&values),
                Aggregate::Max => stats::max(&values),
                Aggregate::Percentile(p) => stats::percentile(&values, p),
                Aggregate::Last => values.last().copied(),
            };

            match value {
                Some(v) if violates(v) => Verdict::Violating(v),
                Some(_) => Verdict::Healthy,
                None => Verdict::Skipped("no samples in window".to_string()),
            }
        }
    }
}
