pub mod checker;
pub mod probe;

pub use checker::{CheckOutcome, HealthChecker, HEALTH_ALERT_RULE, RESPONSE_TIME_METRIC, STATUS_METRIC};
pub use probe::{HttpProbe, Probe, ProbeError, ProbeRequest, ProbeResponse};
