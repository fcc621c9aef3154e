//! Per-job report records and batch level aggregates.

use serde::{Deserialize, Serialize};

use super::job::{JobResult, StatusCounts};
use crate::utils::format::{format_duration, format_timestamp, NOT_AVAILABLE};

/// Catalog context of a job: the flow it runs and the rule that uses it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub dqr_id: String,
    pub dqr_name: String,
    pub flow_id: String,
    pub flow_name: String,
    pub job_id: String,
    pub job_name: String,
}

/// One row of the batch report, with all values rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub dqr_id: String,
    pub dqr_name: String,
    pub flow_id: String,
    pub flow_name: String,
    pub job_id: String,
    pub job_name: String,
    pub run_id: String,
    pub state: String,
    pub success: bool,
    pub created: String,
    pub queue_start: String,
    pub queue_end: String,
    pub execution_start: String,
    pub execution_end: String,
    pub total_duration: String,
    pub queue_duration: String,
    pub execution_duration: String,
    /// Empty for successful jobs
    pub error: String,
}

impl JobSummary {
    pub fn from_result(result: &JobResult, context: Option<&JobContext>) -> Self {
        let context = context.cloned().unwrap_or_default();
        let info = result.run_info.as_ref();
        let ts = |pick: fn(&super::RunInfo) -> Option<i64>| {
            info.map_or_else(|| NOT_AVAILABLE.to_string(), |i| format_timestamp(pick(i)))
        };
        let dur = |pick: fn(&super::RunInfo) -> Option<f64>| {
            info.map_or_else(|| NOT_AVAILABLE.to_string(), |i| format_duration(pick(i)))
        };
        let job_id = if context.job_id.is_empty() { result.job_id.clone() } else { context.job_id };

        Self {
            dqr_id: context.dqr_id,
            dqr_name: context.dqr_name,
            flow_id: context.flow_id,
            flow_name: context.flow_name,
            job_id,
            job_name: result.job_name.clone().unwrap_or(context.job_name),
            run_id: result.run_id.clone().unwrap_or_default(),
            state: result.final_state.to_string(),
            success: result.success,
            created: ts(|i| i.created),
            queue_start: ts(|i| i.queue_start),
            queue_end: ts(|i| i.queue_end),
            execution_start: ts(|i| i.execution_start),
            execution_end: ts(|i| i.execution_end),
            total_duration: dur(super::RunInfo::total_duration),
            queue_duration: dur(super::RunInfo::queued_duration),
            execution_duration: dur(super::RunInfo::execution_duration),
            error: if result.success {
                String::new()
            } else {
                result.error.clone().unwrap_or_default()
            },
        }
    }
}

/// Aggregate view of a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_jobs: usize,
    /// Jobs whose final state counts as success
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    /// Percentage of successful jobs, `0.0` for an empty batch
    pub success_rate: f64,
    pub total_duration_seconds: f64,
    pub final_status_counts: StatusCounts,
}

impl BatchSummary {
    #[allow(clippy::cast_precision_loss)]
    pub fn from_results(
        results: &[JobResult],
        counts: StatusCounts,
        total_duration_seconds: f64,
    ) -> Self {
        let total_jobs = results.len();
        let completed_jobs = results.iter().filter(|r| r.success).count();
        let success_rate = if total_jobs == 0 {
            0.0
        } else {
            completed_jobs as f64 / total_jobs as f64 * 100.0
        };
        Self {
            total_jobs,
            completed_jobs,
            failed_jobs: total_jobs - completed_jobs,
            success_rate,
            total_duration_seconds,
            final_status_counts: counts,
        }
    }
}

/// Results of a batch, in submission order, plus the aggregate summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<JobResult>,
    pub summary: BatchSummary,
}
