use sentinel_types::{Labels, Metric};
use serde::{Deserialize, Serialize};

/// 单条序列在查询窗口内的数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesWindow {
    pub labels: Labels,
    /// 窗口起点之前的最后一个点，用于判断窗口是否被数据覆盖
    pub anchor: Option<Metric>,
    /// 窗口内的数据点（写入顺序）
    pub points: Vec<Metric>,
}

impl SeriesWindow {
    /// 最新的数据点（窗口内优先，否则取 anchor）
    pub fn latest(&self) -> Option<&Metric> {
        self.points.last().or(self.anchor.as_ref())
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.anchor.is_none()
    }
}

/// 序列标签是否包含选择器中的全部键值
pub fn labels_match(series: &Labels, selector: &Labels) -> bool {
    selector
        .iter()
        .all(|(k, v)| series.get(k).map(|sv| sv == v).unwrap_or(false))
}
