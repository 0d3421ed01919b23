mod counters;
mod estimator;
mod poll;

pub use self::counters::{TransferCounters, TransferSample};
pub use self::estimator::{ProgressEstimator, ProgressReport, MAX_RUNNING_FRACTION};
pub use self::poll::poll_progress;
