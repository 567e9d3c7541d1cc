pub mod query;
pub mod series;
pub mod stats;
pub mod store;

pub use query::SeriesWindow;
pub use series::{RetentionPolicy, Series};
pub use store::MetricStore;
