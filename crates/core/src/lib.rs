//! # cpdbatch Core
//!
//! Business logic layer - no HTTP or configuration loading.
//!
//! This crate contains:
//! - Port interfaces for the job and catalog services (traits)
//! - The job runner, batch scheduler and status tally
//! - Catalog discovery of the rule -> flow -> job matrix
//!
//! ## Architecture Principles
//! - Depends only on `cpdbatch-domain` and `cpdbatch-common`
//! - All remote calls go through the port traits
//! - Time-dependent behaviour runs on `tokio::time` so tests can pause it

pub mod catalog;
pub mod jobs;

pub use catalog::{build_matrix, AssetSummary, CatalogError, JobCatalog};
pub use jobs::{
    BatchScheduler, JobApiError, JobRunApi, JobRunner, ReporterHandle, RunnerSettings,
    SchedulerSettings, StatusEvent, StatusReporter, StatusTally,
};
