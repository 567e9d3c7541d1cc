use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use sentinel_alert::EvaluationSummary;
use sentinel_health::CheckOutcome;
use sentinel_types::{Alert, Severity};

/// 引擎自身的运行指标
pub struct EngineTelemetry {
    // 健康检查
    probes_total: CounterVec,
    probe_latency: HistogramVec,

    // 规则评估
    evaluation_runs_total: IntCounter,
    evaluation_series_total: CounterVec,

    // 当前状态
    active_alerts: GaugeVec,
    series_count: Gauge,
    point_count: Gauge,

    // 采集
    collector_errors_total: CounterVec,

    registry: Registry,
}

impl EngineTelemetry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let probes_total = CounterVec::new(
            Opts::new("sentinel_probes_total", "Total number of health check probes"),
            &["endpoint", "result"],
        )?;
        registry.register(Box::new(probes_total.clone()))?;

        let probe_latency = HistogramVec::new(
            HistogramOpts::new("sentinel_probe_latency_seconds", "Health check response time")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["endpoint"],
        )?;
        registry.register(Box::new(probe_latency.clone()))?;

        let evaluation_runs_total = IntCounter::new(
            "sentinel_evaluation_runs_total",
            "Total number of rule evaluation passes",
        )?;
        registry.register(Box::new(evaluation_runs_total.clone()))?;

        let evaluation_series_total = CounterVec::new(
            Opts::new(
                "sentinel_evaluation_series_total",
                "Evaluated series by verdict",
            ),
            &["verdict"],
        )?;
        registry.register(Box::new(evaluation_series_total.clone()))?;

        let active_alerts = GaugeVec::new(
            Opts::new("sentinel_active_alerts", "Live alerts by severity"),
            &["severity"],
        )?;
        registry.register(Box::new(active_alerts.clone()))?;

        let series_count = Gauge::new("sentinel_series", "Number of stored series")?;
        registry.register(Box::new(series_count.clone()))?;

        let point_count = Gauge::new("sentinel_points", "Number of stored data points")?;
        registry.register(Box::new(point_count.clone()))?;

        let collector_errors_total = CounterVec::new(
            Opts::new(
                "sentinel_collector_errors_total",
                "Total number of failed collector runs",
            ),
            &["collector"],
        )?;
        registry.register(Box::new(collector_errors_total.clone()))?;

        Ok(Self {
            probes_total,
            probe_latency,
            evaluation_runs_total,
            evaluation_series_total,
            active_alerts,
            series_count,
            point_count,
            collector_errors_total,
            registry,
        })
    }

    pub fn record_probe(&self, outcome: &CheckOutcome) {
        let result = if outcome.healthy { "healthy" } else { "unhealthy" };
        self.probes_total
            .with_label_values(&[outcome.endpoint.as_str(), result])
            .inc();

        if let Some(latency_ms) = outcome.latency_ms {
            self.probe_latency
                .with_label_values(&[outcome.endpoint.as_str()])
                .observe(latency_ms / 1000.0);
        }
    }

    pub fn record_evaluation(&self, summary: &EvaluationSummary) {
        self.evaluation_runs_total.inc();
        for (verdict, count) in [
            ("triggered", summary.triggered),
            ("resolved", summary.resolved),
            ("skipped", summary.skipped),
            ("pending", summary.pending),
        ] {
            self.evaluation_series_total
                .with_label_values(&[verdict])
                .inc_by(count as f64);
        }
    }

    pub fn record_collector_error(&self, collector: &str) {
        self.collector_errors_total
            .with_label_values(&[collector])
            .inc();
    }

    /// 用当前告警重置各级别的计数
    pub fn set_active_alerts(&self, alerts: &[Alert]) {
        for severity in [Severity::Info, Severity::Warning, Severity::Critical] {
            let count = alerts.iter().filter(|a| a.severity == severity).count();
            self.active_alerts
                .with_label_values(&[severity.as_str()])
                .set(count as f64);
        }
    }

    pub fn set_store_size(&self, series: usize, points: usize) {
        self.series_count.set(series as f64);
        self.point_count.set(points as f64);
    }

    /// 导出 Prometheus 文本格式
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(endpoint: &str, healthy: bool) -> CheckOutcome {
        CheckOutcome {
            endpoint: endpoint.to_string(),
            healthy,
            status_code: Some(200),
            latency_ms: Some(120.0),
            attempts: 1,
            error: None,
        }
    }

    #[test]
    fn test_probe_counters_exported() {
        let telemetry = EngineTelemetry::new().unwrap();
        telemetry.record_probe(&outcome("api", true));
        telemetry.record_probe(&outcome("api", false));

        let text = telemetry.export().unwrap();
        assert!(text.contains("sentinel_probes_total{endpoint=\"api\",result=\"healthy\"} 1"));
        assert!(text.contains("sentinel_probes_total{endpoint=\"api\",result=\"unhealthy\"} 1"));
        assert!(text.contains("sentinel_probe_latency_seconds"));
    }

    #[test]
    fn test_evaluation_and_gauges() {
        let telemetry = EngineTelemetry::new().unwrap();
        telemetry.record_evaluation(&EvaluationSummary {
            evaluated: 3,
            triggered: 1,
            resolved: 0,
            skipped: 2,
            pending: 0,
        });
        telemetry.set_active_alerts(&[]);
        telemetry.set_store_size(4, 40);

        let text = telemetry.export().unwrap();
        assert!(text.contains("sentinel_evaluation_runs_total 1"));
        assert!(text.contains("sentinel_evaluation_series_total{verdict=\"skipped\"} 2"));
        assert!(text.contains("sentinel_active_alerts{severity=\"critical\"} 0"));
        assert!(text.contains("sentinel_series 4"));
        assert!(text.contains("sentinel_points 40"));
    }
}
