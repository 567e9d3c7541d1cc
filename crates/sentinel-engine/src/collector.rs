use async_trait::async_trait;
use sentinel_core::{Result, SharedClock};
use sentinel_types::{labels_from, Labels, Metric};
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::System;
use tracing::debug;

pub const CPU_USAGE_METRIC: &str = "system_cpu_usage";
pub const MEMORY_USED_METRIC: &str = "system_memory_used_bytes";
pub const MEMORY_USAGE_METRIC: &str = "system_memory_usage";

/// 指标采集器：由调度器按 `interval` 周期调用，产出的数据点写入指标存储
#[async_trait]
pub trait MetricCollector: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn collect(&self) -> Result<Vec<Metric>>;
}

/// 本机系统指标采集器（CPU、内存）
pub struct SystemCollector {
    system: Mutex<System>,
    interval: Duration,
    labels: Labels,
    clock: SharedClock,
}

impl SystemCollector {
    pub fn new(interval: Duration, clock: SharedClock) -> Self {
        let host = System::host_name().unwrap_or_else(|| "localhost".to_string());
        Self {
            system: Mutex::new(System::new()),
            interval,
            labels: labels_from([("host", host)]),
            clock,
        }
    }

    fn sample(&self) -> (f64, u64, u64) {
        // 锁中毒时继续使用内部数据
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_cpu();
        system.refresh_memory();

        (
            system.global_cpu_info().cpu_usage() as f64,
            system.used_memory(),
            system.total_memory(),
        )
    }
}

#[async_trait]
impl MetricCollector for SystemCollector {
    fn name(&self) -> &str {
        "system"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn collect(&self) -> Result<Vec<Metric>> {
        let (cpu_usage, memory_used, memory_total) = self.sample();
        let now = self.clock.now();

        let mut metrics = vec![
            Metric::new(CPU_USAGE_METRIC, cpu_usage, now).with_labels(self.labels.clone()),
            Metric::new(MEMORY_USED_METRIC, memory_used as f64, now)
                .with_labels(self.labels.clone()),
        ];
        if memory_total > 0 {
            let usage = memory_used as f64 / memory_total as f64 * 100.0;
            metrics.push(Metric::new(MEMORY_USAGE_METRIC, usage, now).with_labels(self.labels.clone()));
        }

        debug!(
            "System metrics collected: CPU={:.2}%, Memory={}MB",
            cpu_usage,
            memory_used / 1024 / 1024
        );
        Ok(metrics)
    }
}
