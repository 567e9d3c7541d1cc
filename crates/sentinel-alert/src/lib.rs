pub mod evaluator;
pub mod manager;
pub mod silence;

#[cfg(test)]
pub(crate) mod testing;

pub use evaluator::{EvaluationSummary, ThresholdEvaluator};
pub use manager::{AlertManager, AlertRecord, TriggerOutcome, TriggerRequest};
pub use silence::Silence;
