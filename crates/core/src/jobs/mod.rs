//! DataStage job execution
//!
//! - [`runner`]: one job from submission to a final state
//! - [`scheduler`]: many jobs under a worker bound and a batch deadline
//! - [`tally`]: live per-state counts plus a transition event stream
//! - [`reporter`]: renders tally events as status lines

pub mod ports;
pub mod reporter;
pub mod runner;
pub mod scheduler;
pub mod tally;

pub use ports::{JobApiError, JobRunApi};
pub use reporter::{ReporterHandle, StatusReporter};
pub use runner::{retry_config, JobRunner, RunnerSettings};
pub use scheduler::{BatchScheduler, SchedulerSettings};
pub use tally::{StatusEvent, StatusTally};
