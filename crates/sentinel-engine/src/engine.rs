use async_trait::async_trait;
use chrono::Duration;
use sentinel_alert::{AlertManager, EvaluationSummary, Silence, ThresholdEvaluator};
use sentinel_config::EngineConfig;
use sentinel_core::{Result, SentinelError, SharedClock, SystemClock};
use sentinel_health::{CheckOutcome, HealthChecker, HttpProbe, Probe};
use sentinel_notify::{default_notifiers, DeliveryRecord, NotificationDispatcher, Notifier};
use sentinel_shutdown::{Resource, ResourceError};
use sentinel_timeseries::{MetricStore, RetentionPolicy};
use sentinel_types::{Alert, EndpointHealth, Labels, Metric, TimeRange};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::collector::{MetricCollector, SystemCollector};
use crate::report::{Dashboard, Report, ReportPeriod, Reporter};
use crate::scheduler::{Scheduler, StopReport};
use crate::telemetry::EngineTelemetry;

// chrono::Duration 的秒数上限
const MAX_AGE_SECS: u64 = i64::MAX as u64 / 1000;

/// 监控告警引擎实例
///
/// 持有全部组件；`start` 启动周期任务，`shutdown` 停止任务并取消升级定时器。
pub struct Engine {
    config: Arc<EngineConfig>,
    clock: SharedClock,
    store: Arc<MetricStore>,
    dispatcher: Arc<NotificationDispatcher>,
    manager: Arc<AlertManager>,
    evaluator: Arc<ThresholdEvaluator>,
    checker: Arc<HealthChecker>,
    collectors: Vec<Arc<dyn MetricCollector>>,
    reporter: Reporter,
    telemetry: Arc<EngineTelemetry>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl Engine {
    /// 使用给定的通知器、探测器和时钟创建引擎
    pub fn new(
        config: EngineConfig,
        notifiers: Vec<Arc<dyn Notifier>>,
        probe: Arc<dyn Probe>,
        clock: SharedClock,
    ) -> Result<Self> {
        Self::builder(config)
            .with_notifiers(notifiers)
            .with_probe(probe)
            .with_clock(clock)
            .build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// 启动全部周期任务
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.scheduler.lock().await;
        if guard.is_some() {
            return Err(SentinelError::Internal("engine already started".to_string()));
        }

        let mut scheduler = Scheduler::new();

        for endpoint in self.checker.endpoints().iter().cloned() {
            let checker = self.checker.clone();
            let telemetry = self.telemetry.clone();
            let period = endpoint.interval();
            let name = format!("health:{}", endpoint.name);
            scheduler.spawn_periodic(name, period, move || {
                let checker = checker.clone();
                let telemetry = telemetry.clone();
                let endpoint = endpoint.clone();
                async move {
                    let outcome = checker.check(&endpoint).await;
                    telemetry.record_probe(&outcome);
                    Ok(())
                }
            });
        }

        let evaluator = self.evaluator.clone();
        let telemetry = self.telemetry.clone();
        scheduler.spawn_periodic(
            "evaluation",
            self.config.engine.evaluation_interval(),
            move || {
                let evaluator = evaluator.clone();
                let telemetry = telemetry.clone();
                async move {
                    let summary = evaluator.evaluate_once().await;
                    telemetry.record_evaluation(&summary);
                    Ok(())
                }
            },
        );

        let manager = self.manager.clone();
        scheduler.spawn_periodic(
            "housekeeping",
            self.config.engine.housekeeping_interval(),
            move || {
                let manager = manager.clone();
                async move {
                    let released = manager.expire_silences().await;
                    if !released.is_empty() {
                        debug!(count = released.len(), "Silenced alerts released");
                    }
                    Ok(())
                }
            },
        );

        for collector in &self.collectors {
            let collector = collector.clone();
            let store = self.store.clone();
            let telemetry = self.telemetry.clone();
            let name = format!("collector:{}", collector.name());
            let period = collector.interval();
            scheduler.spawn_periodic(name, period, move || {
                let collector = collector.clone();
                let store = store.clone();
                let telemetry = telemetry.clone();
                async move {
                    let metrics = match collector.collect().await {
                        Ok(metrics) => metrics,
                        Err(e) => {
                            telemetry.record_collector_error(collector.name());
                            return Err(e);
                        }
                    };
                    for metric in metrics {
                        if let Err(e) = store.record_point(metric).await {
                            telemetry.record_collector_error(collector.name());
                            warn!(collector = collector.name(), "Dropped collected metric: {}", e);
                        }
                    }
                    Ok(())
                }
            });
        }

        info!(
            engine = %self.config.engine.name,
            tasks = scheduler.task_count(),
            "Engine started"
        );
        *guard = Some(scheduler);
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.lock().await.is_some()
    }

    /// 停止周期任务并取消全部升级定时器，可重复调用
    pub async fn shutdown(&self) -> StopReport {
        let scheduler = self.scheduler.lock().await.take();
        let report = match scheduler {
            Some(scheduler) => {
                scheduler
                    .shutdown(self.config.engine.shutdown_timeout())
                    .await
            }
            None => StopReport::default(),
        };

        self.dispatcher.shutdown().await;
        info!(engine = %self.config.engine.name, "Engine stopped");
        report
    }

    // ========================================================================
    // 手动驱动（测试与运维）
    // ========================================================================

    pub async fn evaluate_now(&self) -> EvaluationSummary {
        let summary = self.evaluator.evaluate_once().await;
        self.telemetry.record_evaluation(&summary);
        summary
    }

    pub async fn check_now(&self) -> Vec<CheckOutcome> {
        let outcomes = self.checker.run_once().await;
        for outcome in &outcomes {
            self.telemetry.record_probe(outcome);
        }
        outcomes
    }

    // ========================================================================
    // 查询接口
    // ========================================================================

    pub async fn get_metric(&self, name: &str, range: TimeRange, labels: Option<&Labels>) -> Vec<Metric> {
        self.store.query(name, range, labels).await
    }

    pub async fn record_metric(&self, name: &str, value: f64, labels: Labels) -> Result<Metric> {
        self.store.record(name, value, labels).await
    }

    pub async fn metric_names(&self) -> Vec<String> {
        self.store.series_names().await
    }

    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        self.manager.active_alerts().await
    }

    pub async fn get_alert(&self, key: &str) -> Option<Alert> {
        self.manager.get(key).await
    }

    pub async fn alert_history(&self, limit: usize) -> Vec<Alert> {
        self.manager.history(limit).await
    }

    pub async fn get_health_status(&self) -> Vec<EndpointHealth> {
        self.checker.status().await
    }

    pub async fn generate_report(&self, period: ReportPeriod) -> Report {
        self.reporter.generate(period).await
    }

    pub async fn report_for(&self, range: TimeRange) -> Report {
        self.reporter.report_for(range).await
    }

    pub async fn dashboard(&self) -> Dashboard {
        self.reporter.dashboard().await
    }

    pub async fn silence(&self, pattern: &str, duration: Duration, reason: &str) -> Result<Silence> {
        self.manager.silence(pattern, duration, reason).await
    }

    pub async fn unsilence(&self, id: &str) -> Result<Vec<Alert>> {
        self.manager.unsilence(id).await
    }

    pub async fn silences(&self) -> Vec<Silence> {
        self.manager.silences().await
    }

    pub async fn recent_deliveries(&self, limit: usize) -> Vec<DeliveryRecord> {
        self.dispatcher.recent_deliveries(limit).await
    }

    /// 刷新状态类指标后导出 Prometheus 文本
    pub async fn telemetry_text(&self) -> Result<String> {
        self.telemetry
            .set_active_alerts(&self.manager.active_alerts().await);
        self.telemetry.set_store_size(
            self.store.series_count().await,
            self.store.point_count().await,
        );
        self.telemetry
            .export()
            .map_err(|e| SentinelError::Internal(format!("telemetry export failed: {}", e)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<AlertManager> {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn checker(&self) -> &Arc<HealthChecker> {
        &self.checker
    }
}

#[async_trait]
impl Resource for Engine {
    async fn cleanup(&self) -> std::result::Result<(), ResourceError> {
        let report = self.shutdown().await;
        if report.aborted.is_empty() {
            Ok(())
        } else {
            Err(ResourceError::CleanupFailed(format!(
                "aborted tasks: {}",
                report.aborted.join(", ")
            )))
        }
    }

    fn name(&self) -> &str {
        "engine"
    }

    fn priority(&self) -> u32 {
        10
    }
}

/// 引擎构建器
pub struct EngineBuilder {
    config: EngineConfig,
    notifiers: Option<Vec<Arc<dyn Notifier>>>,
    probe: Option<Arc<dyn Probe>>,
    collectors: Vec<Arc<dyn MetricCollector>>,
    clock: Option<SharedClock>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            notifiers: None,
            probe: None,
            collectors: Vec::new(),
            clock: None,
        }
    }

    /// 替换默认通知器
    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers = Some(notifiers);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_collector(mut self, collector: Arc<dyn MetricCollector>) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let config = Arc::new(self.config);
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let notifiers = self.notifiers.unwrap_or_else(default_notifiers);
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(HttpProbe::new()) as Arc<dyn Probe>);

        let retention = RetentionPolicy::new(
            config.retention.max_points_per_series,
            Duration::seconds(config.retention.max_age_secs.min(MAX_AGE_SECS) as i64),
        );
        let store = Arc::new(MetricStore::new(retention, clock.clone()));

        let dispatcher = Arc::new(NotificationDispatcher::new(
            config.channels.clone(),
            notifiers,
            config.engine.notification_timeout(),
            config.engine.delivery_log_size,
            clock.clone(),
        ));

        let manager = Arc::new(AlertManager::new(
            dispatcher.clone(),
            config.escalation_policies.clone(),
            config.engine.max_alert_history,
            clock.clone(),
        ));

        let evaluator = Arc::new(ThresholdEvaluator::new(
            config.rules.clone(),
            store.clone(),
            manager.clone(),
            clock.clone(),
        ));

        let checker = Arc::new(HealthChecker::new(
            config.endpoints.clone(),
            probe,
            store.clone(),
            manager.clone(),
            clock.clone(),
        ));

        let mut collectors = self.collectors;
        let system = &config.collectors.system;
        if system.enabled {
            collectors.push(Arc::new(SystemCollector::new(
                std::time::Duration::from_secs(system.interval_secs),
                clock.clone(),
            )));
        }

        let telemetry = EngineTelemetry::new()
            .map_err(|e| SentinelError::Internal(format!("telemetry registry: {}", e)))?;

        let reporter = Reporter::new(
            store.clone(),
            manager.clone(),
            checker.clone(),
            dispatcher.clone(),
            clock.clone(),
        );

        info!(
            engine = %config.engine.name,
            endpoints = config.endpoints.len(),
            rules = config.rules.len(),
            channels = config.channels.len(),
            collectors = collectors.len(),
            "Engine initialized"
        );

        Ok(Engine {
            config,
            clock,
            store,
            dispatcher,
            manager,
            evaluator,
            checker,
            collectors,
            reporter,
            telemetry: Arc::new(telemetry),
            scheduler: Mutex::new(None),
        })
    }
}
