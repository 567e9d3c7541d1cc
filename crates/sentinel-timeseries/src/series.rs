use chrono::{DateTime, Duration, Utc};
use sentinel_types::{Labels, Metric};
use std::collections::VecDeque;

/// 保留策略：点数上限与最大时长同时生效
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_points: usize,
    pub max_age: Duration,
}

impl RetentionPolicy {
    pub fn new(max_points: usize, max_age: Duration) -> Self {
        Self {
            max_points: max_points.max(1),
            max_age,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(43_200, Duration::days(30))
    }
}

/// 单条序列：同名同标签的数据点，按写入顺序保存
#[derive(Debug)]
pub struct Series {
    labels: Labels,
    points: VecDeque<Metric>,
}

impl Series {
    pub fn new(labels: Labels) -> Self {
        Self {
            labels,
            points: VecDeque::new(),
        }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// 追加数据点并执行淘汰，返回被淘汰的点数
    pub fn push(&mut self, point: Metric, now: DateTime<Utc>, retention: &RetentionPolicy) -> usize {
        self.points.push_back(point);
        self.evict(now, retention)
    }

    pub fn evict(&mut self, now: DateTime<Utc>, retention: &RetentionPolicy) -> usize {
        let cutoff = now - retention.max_age;
        let mut evicted = 0;

        while self.points.len() > retention.max_points {
            self.points.pop_front();
            evicted += 1;
        }

        while let Some(front) = self.points.front() {
            if front.timestamp < cutoff {
                self.points.pop_front();
                evicted += 1;
            } else {
                break;
            }
        }

        evicted
    }

    pub fn points(&self) -> &VecDeque<Metric> {
        &self.points
    }

    pub fn latest(&self) -> Option<&Metric> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
