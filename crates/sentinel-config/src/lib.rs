pub mod channel;
pub mod endpoint;
pub mod escalation;
pub mod global;
pub mod loader;
pub mod rule;
mod validate;

pub use channel::{ChannelKind, ChannelTransport, NotificationChannel};
pub use endpoint::{HealthCheckEndpoint, HttpMethod};
pub use escalation::{EscalationPolicy, EscalationStep};
pub use global::{
    CollectorsConfig, EngineConfig, EngineSettings, LogFormat, LoggingConfig, RetentionConfig,
    ServerConfig, SystemCollectorConfig,
};
pub use loader::ConfigLoader;
pub use rule::{Aggregate, AlertRule, ComparisonOp};
