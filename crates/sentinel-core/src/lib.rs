pub mod clock;
pub mod error;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{Result, SentinelError};
