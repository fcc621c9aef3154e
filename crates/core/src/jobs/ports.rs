//! Port interfaces for job run operations

use async_trait::async_trait;
use cpdbatch_domain::constants::RETRYABLE_STATUSES;
use cpdbatch_domain::{RunInfo, SubmittedRun};
use thiserror::Error;

/// Failure of a single job service call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobApiError {
    /// Network-level failure; the request may not have reached the service
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with an unexpected status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered with a body we could not interpret
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request never left the client (pool exhausted, auth throttled, ...)
    #[error("client error: {0}")]
    Client(String),
}

impl JobApiError {
    /// Transport failures and 429/502/503/504 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => RETRYABLE_STATUSES.contains(status),
            Self::InvalidResponse(_) | Self::Client(_) => false,
        }
    }
}

/// Trait for creating and inspecting job runs
#[async_trait]
pub trait JobRunApi: Send + Sync {
    /// Start a new run of `job_id`.
    async fn submit_run(&self, job_id: &str, run_name: &str) -> Result<SubmittedRun, JobApiError>;

    /// Fetch the current state and timing of a run.
    async fn get_run(&self, job_id: &str, run_id: &str) -> Result<RunInfo, JobApiError>;
}
