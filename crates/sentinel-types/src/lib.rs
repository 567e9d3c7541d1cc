pub mod alert;
pub mod health;
pub mod metric;

pub use alert::{Alert, AlertStatus, Severity};
pub use health::EndpointHealth;
pub use metric::{format_labels, labels_from, Labels, Metric, TimeRange};
