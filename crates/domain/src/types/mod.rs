//! Domain types and models
//!
//! Job lifecycle types shared between the batch engine and its adapters,
//! plus the catalog records used to discover which jobs to run.

pub mod catalog;
pub mod job;
pub mod run_info;
pub mod summary;

pub use catalog::{FlowEntry, FlowJobMatrix, JobCreation, MatrixTotals};
pub use job::{JobHandle, JobResult, JobState, StatusCounts, SubmittedRun};
pub use run_info::RunInfo;
pub use summary::{BatchResult, BatchSummary, JobContext, JobSummary};
