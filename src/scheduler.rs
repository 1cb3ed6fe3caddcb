pub(crate) mod cadence;
pub mod daemon;
pub mod jobs;

pub use jobs::{JobContext, RefreshOutcome, Scheduler};
