pub mod collector;
pub mod engine;
pub mod report;
pub mod scheduler;
pub mod telemetry;

pub use collector::{MetricCollector, SystemCollector};
pub use engine::{Engine, EngineBuilder};
pub use report::{
    AlertSummary, Dashboard, EndpointReport, HealthStats, Report, ReportPeriod, Reporter,
    SeverityCounts,
};
pub use scheduler::{Scheduler, StopReport};
pub use telemetry::EngineTelemetry;
