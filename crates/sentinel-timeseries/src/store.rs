use chrono::{DateTime, Utc};
use sentinel_core::{Result, SentinelError, SharedClock};
use sentinel_types::{Labels, Metric, TimeRange};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::query::{labels_match, SeriesWindow};
use crate::series::{RetentionPolicy, Series};
use crate::stats;

type SeriesRef = Arc<RwLock<Series>>;

/// 内存时序存储
///
/// 序列索引由一把读写锁保护，每条序列各自持有一把读写锁，
/// 同一序列的写入串行，读取可并发。
pub struct MetricStore {
    series: RwLock<HashMap<String, HashMap<Labels, SeriesRef>>>,
    retention: RetentionPolicy,
    clock: SharedClock,
}

impl MetricStore {
    pub fn new(retention: RetentionPolicy, clock: SharedClock) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            retention,
            clock,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// 以当前时钟时间记录一个数据点
    pub async fn record(&self, name: &str, value: f64, labels: Labels) -> Result<Metric> {
        let now = self.clock.now();
        self.record_at(name, value, labels, now).await
    }

    /// 以指定时间记录一个数据点
    pub async fn record_at(
        &self,
        name: &str,
        value: f64,
        labels: Labels,
        timestamp: DateTime<Utc>,
    ) -> Result<Metric> {
        let metric = Metric::new(name, value, timestamp).with_labels(labels);
        self.record_point(metric.clone()).await?;
        Ok(metric)
    }

    pub async fn record_point(&self, metric: Metric) -> Result<()> {
        validate(&metric)?;

        let series = self.series_for(&metric.name, &metric.labels).await;
        let now = self.clock.now();
        let evicted = series.write().await.push(metric, now, &self.retention);
        if evicted > 0 {
            trace!(evicted, "Evicted points past retention");
        }
        Ok(())
    }

    async fn series_for(&self, name: &str, labels: &Labels) -> SeriesRef {
        if let Some(existing) = self
            .series
            .read()
            .await
            .get(name)
            .and_then(|by_labels| by_labels.get(labels))
        {
            return existing.clone();
        }

        let mut index = self.series.write().await;
        index
            .entry(name.to_string())
            .or_default()
            .entry(labels.clone())
            .or_insert_with(|| {
                debug!(metric = %name, "Creating series");
                Arc::new(RwLock::new(Series::new(labels.clone())))
            })
            .clone()
    }

    async fn series_of(&self, name: &str) -> Vec<SeriesRef> {
        self.series
            .read()
            .await
            .get(name)
            .map(|by_labels| by_labels.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 按时间范围查询；指定 labels 时只匹配完全相同的标签集
    ///
    /// 多条序列的结果按时间戳合并（同一时间戳保持写入顺序）。
    pub async fn query(&self, name: &str, range: TimeRange, labels: Option<&Labels>) -> Vec<Metric> {
        let mut result = Vec::new();
        let mut sources = 0;

        for series in self.series_of(name).await {
            let series = series.read().await;
            if let Some(wanted) = labels {
                if series.labels() != wanted {
                    continue;
                }
            }
            sources += 1;
            result.extend(
                series
                    .points()
                    .iter()
                    .filter(|p| range.contains(p.timestamp))
                    .cloned(),
            );
        }

        if sources > 1 {
            result.sort_by_key(|p| p.timestamp);
        }
        result
    }

    /// 选出标签包含 `selector` 的所有序列，逐条返回窗口数据
    pub async fn select(&self, name: &str, selector: &Labels, range: TimeRange) -> Vec<SeriesWindow> {
        let mut windows = Vec::new();

        for series in self.series_of(name).await {
            let series = series.read().await;
            if !labels_match(series.labels(), selector) {
                continue;
            }

            let mut anchor: Option<&Metric> = None;
            let mut points = Vec::new();
            for point in series.points() {
                if point.timestamp < range.start {
                    if anchor.map(|a| point.timestamp >= a.timestamp).unwrap_or(true) {
                        anchor = Some(point);
                    }
                } else if point.timestamp <= range.end {
                    points.push(point.clone());
                }
            }

            windows.push(SeriesWindow {
                labels: series.labels().clone(),
                anchor: anchor.cloned(),
                points,
            });
        }

        windows.sort_by(|a, b| a.labels.cmp(&b.labels));
        windows
    }

    pub async fn values(&self, name: &str, range: TimeRange, labels: Option<&Labels>) -> Vec<f64> {
        self.query(name, range, labels)
            .await
            .into_iter()
            .map(|p| p.value)
            .collect()
    }

    pub async fn average(&self, name: &str, range: TimeRange, labels: Option<&Labels>) -> Option<f64> {
        stats::average(&self.values(name, range, labels).await)
    }

    pub async fn percentile(
        &self,
        name: &str,
        range: TimeRange,
        p: f64,
        labels: Option<&Labels>,
    ) -> Option<f64> {
        stats::percentile(&self.values(name, range, labels).await, p)
    }

    pub async fn min(&self, name: &str, range: TimeRange, labels: Option<&Labels>) -> Option<f64> {
        stats::min(&self.values(name, range, labels).await)
    }

    pub async fn max(&self, name: &str, range: TimeRange, labels: Option<&Labels>) -> Option<f64> {
        stats::max(&self.values(name, range, labels).await)
    }

    /// 最新数据点（按时间戳）
    pub async fn latest(&self, name: &str, labels: Option<&Labels>) -> Option<Metric> {
        let mut latest: Option<Metric> = None;
        for series in self.series_of(name).await {
            let series = series.read().await;
            if let Some(wanted) = labels {
                if series.labels() != wanted {
                    continue;
                }
            }
            if let Some(point) = series.latest() {
                if latest
                    .as_ref()
                    .map(|l| point.timestamp >= l.timestamp)
                    .unwrap_or(true)
                {
                    latest = Some(point.clone());
                }
            }
        }
        latest
    }

    pub async fn series_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn series_labels(&self, name: &str) -> Vec<Labels> {
        let mut labels: Vec<Labels> = self
            .series
            .read()
            .await
            .get(name)
            .map(|by_labels| by_labels.keys().cloned().collect())
            .unwrap_or_default();
        labels.sort();
        labels
    }

    pub async fn series_count(&self) -> usize {
        self.series.read().await.values().map(|m| m.len()).sum()
    }

    pub async fn point_count(&self) -> usize {
        let all: Vec<SeriesRef> = self
            .series
            .read()
            .await
            .values()
            .flat_map(|m| m.values().cloned())
            .collect();

        let mut total = 0;
        for series in all {
            total += series.read().await.len();
        }
        total
    }
}

fn validate(metric: &Metric) -> Result<()> {
    if metric.name.trim().is_empty() {
        return Err(SentinelError::InvalidMetric(
            "metric name must not be empty".to_string(),
        ));
    }
    if !metric.value.is_finite() {
        return Err(SentinelError::InvalidMetric(format!(
            "{} has non-finite value {}",
            metric.name, metric.value
        )));
    }
    Ok(())
}
