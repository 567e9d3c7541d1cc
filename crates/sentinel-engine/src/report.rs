//! 报表与看板汇总
//!
//! 数据只从指标存储、告警管理器和健康检查器读取，不写入任何状态。
//! 没有数据时对应字段为 `None` 或 0。

use chrono::{DateTime, Duration, Utc};
use sentinel_alert::{AlertManager, AlertRecord};
use sentinel_core::{SentinelError, SharedClock};
use sentinel_health::{HealthChecker, RESPONSE_TIME_METRIC, STATUS_METRIC};
use sentinel_notify::NotificationDispatcher;
use sentinel_timeseries::{stats, MetricStore};
use sentinel_types::{labels_from, AlertStatus, Labels, Severity, TimeRange};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// 报表周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ReportPeriod {
    pub fn span(&self) -> Duration {
        match self {
            ReportPeriod::Daily => Duration::days(1),
            ReportPeriod::Weekly => Duration::days(7),
            ReportPeriod::Monthly => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Daily => "daily",
            ReportPeriod::Weekly => "weekly",
            ReportPeriod::Monthly => "monthly",
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Self::Daily),
            "weekly" | "week" => Ok(Self::Weekly),
            "monthly" | "month" => Ok(Self::Monthly),
            _ => Err(SentinelError::InvalidInput(format!(
                "unknown report period: {s}"
            ))),
        }
    }
}

/// 响应时间与可用性统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStats {
    /// 可用率（%）
    pub availability: Option<f64>,
    pub avg_response_time_ms: Option<f64>,
    pub p95_response_time_ms: Option<f64>,
    pub p99_response_time_ms: Option<f64>,
    /// 失败检查占比（%）
    pub error_rate: Option<f64>,
    pub total_checks: usize,
    pub failed_checks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReport {
    pub endpoint: String,
    #[serde(flatten)]
    pub stats: HealthStats,
}

/// 区间内开始的告警统计
///
/// 基于告警管理器保留 31 天的告警摘要，不受告警历史上限影响。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total_alerts: usize,
    pub critical_alerts: usize,
    pub warning_alerts: usize,
    pub info_alerts: usize,
    /// 区间内开始、目前仍未恢复的告警
    pub active_alerts: usize,
    pub resolved_alerts: usize,
    pub mean_time_to_resolve_secs: Option<f64>,
}

impl AlertSummary {
    fn from_records(records: &[AlertRecord]) -> Self {
        let count = |severity: Severity| records.iter().filter(|r| r.severity == severity).count();
        let resolve_secs: Vec<f64> = records
            .iter()
            .filter_map(|r| r.time_to_resolve())
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .collect();

        Self {
            total_alerts: records.len(),
            critical_alerts: count(Severity::Critical),
            warning_alerts: count(Severity::Warning),
            info_alerts: count(Severity::Info),
            active_alerts: records.iter().filter(|r| !r.is_resolved()).count(),
            resolved_alerts: resolve_secs.len(),
            mean_time_to_resolve_secs: stats::average(&resolve_secs),
        }
    }
}

/// 周期报表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub period: Option<ReportPeriod>,
    pub range: TimeRange,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub overall: HealthStats,
    pub endpoints: Vec<EndpointReport>,
    pub alerts: AlertSummary,
}

/// 按级别统计的告警数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

/// 看板实时快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    pub active_alerts: usize,
    pub silenced_alerts: usize,
    pub alerts_by_severity: SeverityCounts,
    pub healthy_endpoints: usize,
    pub unhealthy_endpoints: usize,
    /// 尚未完成首次检查的端点
    pub unknown_endpoints: usize,
    pub series_count: usize,
    pub point_count: usize,
    pub pending_escalations: usize,
}

/// 报表生成器
#[derive(Clone)]
pub struct Reporter {
    store: Arc<MetricStore>,
    manager: Arc<AlertManager>,
    checker: Arc<HealthChecker>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: SharedClock,
}

impl Reporter {
    pub fn new(
        store: Arc<MetricStore>,
        manager: Arc<AlertManager>,
        checker: Arc<HealthChecker>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            manager,
            checker,
            dispatcher,
            clock,
        }
    }

    /// 以当前时间为终点的周期报表
    pub async fn generate(&self, period: ReportPeriod) -> Report {
        let range = TimeRange::ending_at(self.clock.now(), period.span());
        let mut report = self.report_for(range).await;
        report.period = Some(period);
        report
    }

    pub async fn report_for(&self, range: TimeRange) -> Report {
        let overall = self.health_stats(range, None).await;

        let mut endpoints = Vec::with_capacity(self.checker.endpoints().len());
        for endpoint in self.checker.endpoints() {
            let labels = labels_from([("endpoint", endpoint.name.as_str())]);
            endpoints.push(EndpointReport {
                endpoint: endpoint.name.clone(),
                stats: self.health_stats(range, Some(&labels)).await,
            });
        }

        let alerts = self.manager.records_in_range(range).await;

        Report {
            period: None,
            range,
            generated_at: self.clock.now(),
            overall,
            endpoints,
            alerts: AlertSummary::from_records(&alerts),
        }
    }

    async fn health_stats(&self, range: TimeRange, labels: Option<&Labels>) -> HealthStats {
        let statuses = self.store.values(STATUS_METRIC, range, labels).await;
        let latencies = self.store.values(RESPONSE_TIME_METRIC, range, labels).await;

        let total_checks = statuses.len();
        let failed_checks = statuses.iter().filter(|v| **v < 1.0).count();
        let error_rate = if total_checks == 0 {
            None
        } else {
            Some(failed_checks as f64 / total_checks as f64 * 100.0)
        };

        HealthStats {
            availability: stats::average(&statuses).map(|v| v * 100.0),
            avg_response_time_ms: stats::average(&latencies),
            p95_response_time_ms: stats::percentile(&latencies, 95.0),
            p99_response_time_ms: stats::percentile(&latencies, 99.0),
            error_rate,
            total_checks,
            failed_checks,
        }
    }

    pub async fn dashboard(&self) -> Dashboard {
        let alerts = self.manager.active_alerts().await;
        let health = self.checker.status().await;

        let severity = |s: Severity| alerts.iter().filter(|a| a.severity == s).count();
        let alerts_by_severity = SeverityCounts {
            critical: severity(Severity::Critical),
            warning: severity(Severity::Warning),
            info: severity(Severity::Info),
        };

        Dashboard {
            generated_at: self.clock.now(),
            active_alerts: alerts.iter().filter(|a| a.is_active()).count(),
            silenced_alerts: alerts
                .iter()
                .filter(|a| a.status == AlertStatus::Silenced)
                .count(),
            alerts_by_severity,
            healthy_endpoints: health.iter().filter(|h| h.healthy == Some(true)).count(),
            unhealthy_endpoints: health.iter().filter(|h| h.healthy == Some(false)).count(),
            unknown_endpoints: health.iter().filter(|h| h.healthy.is_none()).count(),
            series_count: self.store.series_count().await,
            point_count: self.store.point_count().await,
            pending_escalations: self.dispatcher.pending_escalations().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_alert::TriggerRequest;
    use sentinel_config::HealthCheckEndpoint;
    use sentinel_core::ManualClock;
    use sentinel_health::{HttpProbe, Probe};
    use sentinel_timeseries::RetentionPolicy;
    use std::time::Duration as StdDuration;

    struct Fixture {
        reporter: Reporter,
        store: Arc<MetricStore>,
        manager: Arc<AlertManager>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        fixture_with_history(100)
    }

    fn fixture_with_history(max_history: usize) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MetricStore::new(RetentionPolicy::default(), clock.clone()));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            vec![],
            vec![],
            StdDuration::from_secs(1),
            10,
            clock.clone(),
        ));
        let manager = Arc::new(AlertManager::new(dispatcher.clone(), vec![], max_history, clock.clone()));
        let checker = Arc::new(HealthChecker::new(
            vec![
                HealthCheckEndpoint::new("api", "http://localhost/api"),
                HealthCheckEndpoint::new("web", "http://localhost/web"),
            ],
            Arc::new(HttpProbe::new()) as Arc<dyn Probe>,
            store.clone(),
            manager.clone(),
            clock.clone(),
        ));

        Fixture {
            reporter: Reporter::new(store.clone(), manager.clone(), checker, dispatcher, clock.clone()),
            store,
            manager,
            clock,
        }
    }

    fn request(key: &str, severity: Severity) -> TriggerRequest {
        TriggerRequest {
            key: key.to_string(),
            rule_id: key.to_string(),
            metric: "cpu".to_string(),
            severity,
            description: "cpu high".to_string(),
            current_value: 95.0,
            threshold: 90.0,
            labels: Labels::new(),
            channels: vec![],
        }
    }

    #[test]
    fn test_period_parse_and_span() {
        assert_eq!("Weekly".parse::<ReportPeriod>().unwrap(), ReportPeriod::Weekly);
        assert_eq!(ReportPeriod::Monthly.span(), Duration::days(30));
        assert!(matches!(
            "yearly".parse::<ReportPeriod>(),
            Err(SentinelError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_report() {
        let f = fixture();
        let report = f.reporter.generate(ReportPeriod::Daily).await;

        assert_eq!(report.period, Some(ReportPeriod::Daily));
        assert_eq!(report.overall.availability, None);
        assert_eq!(report.overall.error_rate, None);
        assert_eq!(report.overall.total_checks, 0);
        assert_eq!(report.endpoints.len(), 2);
        assert_eq!(report.alerts, AlertSummary::default());
    }

    #[tokio::test]
    async fn test_availability_and_latency() {
        let f = fixture();
        let api = labels_from([("endpoint", "api")]);
        let web = labels_from([("endpoint", "web")]);

        for (status, latency) in [(1.0, 100.0), (1.0, 200.0), (0.0, 300.0), (1.0, 400.0)] {
            f.store.record(STATUS_METRIC, status, api.clone()).await.unwrap();
            f.store.record(RESPONSE_TIME_METRIC, latency, api.clone()).await.unwrap();
            f.clock.advance(Duration::seconds(10));
        }
        f.store.record(STATUS_METRIC, 1.0, web.clone()).await.unwrap();
        f.store.record(RESPONSE_TIME_METRIC, 50.0, web).await.unwrap();

        let report = f.reporter.generate(ReportPeriod::Daily).await;

        assert_eq!(report.overall.total_checks, 5);
        assert_eq!(report.overall.failed_checks, 1);
        assert_eq!(report.overall.availability, Some(80.0));
        assert_eq!(report.overall.error_rate, Some(20.0));
        assert_eq!(report.overall.avg_response_time_ms, Some(210.0));
        assert_eq!(report.overall.p99_response_time_ms, Some(400.0));

        let api_report = &report.endpoints[0];
        assert_eq!(api_report.endpoint, "api");
        assert_eq!(api_report.stats.availability, Some(75.0));
        assert_eq!(api_report.stats.p95_response_time_ms, Some(400.0));
        assert_eq!(report.endpoints[1].stats.total_checks, 1);
    }

    #[tokio::test]
    async fn test_alert_summary_and_mttr() {
        let f = fixture();
        f.manager.trigger(request("cpu_high", Severity::Critical)).await;
        f.manager.trigger(request("disk_low", Severity::Warning)).await;
        f.clock.advance(Duration::minutes(10));
        assert!(f.manager.resolve("cpu_high").await);

        let report = f.reporter.generate(ReportPeriod::Weekly).await;

        assert_eq!(report.alerts.total_alerts, 2);
        assert_eq!(report.alerts.critical_alerts, 1);
        assert_eq!(report.alerts.warning_alerts, 1);
        assert_eq!(report.alerts.active_alerts, 1);
        assert_eq!(report.alerts.resolved_alerts, 1);
        assert_eq!(report.alerts.mean_time_to_resolve_secs, Some(600.0));
    }

    #[tokio::test]
    async fn test_alert_summary_beyond_history_cap() {
        let f = fixture_with_history(2);
        for i in 0..6 {
            let key = format!("flapping_{}", i);
            f.manager.trigger(request(&key, Severity::Warning)).await;
            f.clock.advance(Duration::minutes(5));
            f.manager.resolve(&key).await;
        }
        f.clock.advance(Duration::days(3));

        let report = f.reporter.generate(ReportPeriod::Weekly).await;

        assert_eq!(report.alerts.total_alerts, 6);
        assert_eq!(report.alerts.warning_alerts, 6);
        assert_eq!(report.alerts.resolved_alerts, 6);
        assert_eq!(report.alerts.mean_time_to_resolve_secs, Some(300.0));
        assert_eq!(f.manager.history(10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_dashboard_snapshot() {
        let f = fixture();
        f.manager.trigger(request("cpu_high", Severity::Critical)).await;
        f.manager
            .silence("disk*", Duration::hours(1), "maintenance")
            .await
            .unwrap();
        f.manager.trigger(request("disk_low", Severity::Warning)).await;
        f.store.record("cpu", 50.0, Labels::new()).await.unwrap();

        let dashboard = f.reporter.dashboard().await;

        assert_eq!(dashboard.active_alerts, 1);
        assert_eq!(dashboard.silenced_alerts, 1);
        assert_eq!(dashboard.alerts_by_severity.critical, 1);
        assert_eq!(dashboard.alerts_by_severity.warning, 1);
        assert_eq!(dashboard.unknown_endpoints, 2);
        assert_eq!(dashboard.series_count, 1);
        assert_eq!(dashboard.point_count, 1);
    }
}
