//! Job lifecycle types
//!
//! `JobState` covers both the states reported by the remote job service and
//! the local classifications the runner assigns (`SubmitFailed`, `Timeout`,
//! `MonitorError`, `Exception`). Variant order is the reporting order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run_info::RunInfo;
use crate::impl_domain_status_conversions;

/// State of one job within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    NotSubmitted,
    Submitting,
    Starting,
    Queued,
    Running,
    Completed,
    CompletedWithWarnings,
    CompletedWithErrors,
    Failed,
    Canceled,
    Timeout,
    SubmitFailed,
    MonitorError,
    Exception,
    /// Any state string the remote service reports that is not listed above
    Other(String),
}

impl_domain_status_conversions!(JobState {
    NotSubmitted => "NotSubmitted",
    Submitting => "Submitting",
    Starting => "Starting",
    Queued => "Queued",
    Running => "Running",
    Completed => "Completed",
    CompletedWithWarnings => "CompletedWithWarnings",
    CompletedWithErrors => "CompletedWithErrors",
    Failed => "Failed",
    Canceled => "Canceled",
    Timeout => "Timeout",
    SubmitFailed => "SubmitFailed",
    MonitorError => "MonitorError",
    Exception => "Exception",
} else Other);

impl From<String> for JobState {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&str> for JobState {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(state) => state,
            Err(never) => match never {},
        }
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.to_string()
    }
}

impl JobState {
    /// States after which the remote service will not change the run again.
    pub fn is_remote_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::CompletedWithWarnings
                | Self::CompletedWithErrors
                | Self::Failed
                | Self::Canceled
        )
    }

    /// States a job can finish a batch in.
    pub fn is_final(&self) -> bool {
        self.is_remote_terminal()
            || matches!(
                self,
                Self::Timeout | Self::SubmitFailed | Self::MonitorError | Self::Exception
            )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithWarnings)
    }

    /// Transitions into these states are reported immediately.
    pub fn is_significant(&self) -> bool {
        self.is_remote_terminal()
    }
}

/// Run created by a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedRun {
    pub run_id: String,
    pub job_name: Option<String>,
    /// Initial state reported by the service, usually `Starting` or `Queued`
    pub state: JobState,
    pub job_ref: Option<String>,
}

/// Live view of one job, read by the batch accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub job_run_id: Option<String>,
    pub current_state: JobState,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            job_run_id: None,
            current_state: JobState::NotSubmitted,
            submitted_at: None,
        }
    }
}

/// Outcome of running one job to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub run_id: Option<String>,
    pub job_name: Option<String>,
    pub final_state: JobState,
    pub success: bool,
    pub run_info: Option<RunInfo>,
    /// Wall time spent by the runner on this job
    pub duration_seconds: f64,
    pub error: Option<String>,
}

impl JobResult {
    /// Result for a job that ended in `state` with no further details.
    pub fn terminal(job_id: impl Into<String>, state: JobState, duration_seconds: f64) -> Self {
        Self {
            job_id: job_id.into(),
            run_id: None,
            job_name: None,
            success: state.is_success(),
            final_state: state,
            run_info: None,
            duration_seconds,
            error: None,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Count of jobs per state, iterated in reporting order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCounts(BTreeMap<JobState, usize>);

impl StatusCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, state: &JobState) -> usize {
        self.0.get(state).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, state: JobState) {
        *self.0.entry(state).or_insert(0) += 1;
    }

    pub fn add(&mut self, state: JobState, n: usize) {
        if n > 0 {
            *self.0.entry(state).or_insert(0) += n;
        }
    }

    /// Move one job from `from` to `to`. Empty buckets are removed.
    pub fn transfer(&mut self, from: &JobState, to: JobState) {
        if let Some(count) = self.0.get_mut(from) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.0.remove(from);
            }
        }
        self.increment(to);
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Non-empty buckets in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (&JobState, usize)> {
        self.0.iter().filter(|(_, n)| **n > 0).map(|(s, n)| (s, *n))
    }

    /// `State:count | State:count` line.
    pub fn render(&self) -> String {
        self.iter().map(|(state, n)| format!("{state}:{n}")).collect::<Vec<_>>().join(" | ")
    }
}

impl FromIterator<JobState> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = JobState>>(iter: I) -> Self {
        let mut counts = Self::new();
        for state in iter {
            counts.increment(state);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_states_and_keeps_unknown() {
        assert_eq!(JobState::from("Completed"), JobState::Completed);
        assert_eq!(JobState::from("completedwithwarnings"), JobState::CompletedWithWarnings);
        assert_eq!(JobState::from("Paused"), JobState::Other("Paused".into()));
        assert!(!JobState::from("Paused").is_final());
    }

    #[test]
    fn success_is_completed_or_warnings() {
        assert!(JobState::Completed.is_success());
        assert!(JobState::CompletedWithWarnings.is_success());
        assert!(!JobState::CompletedWithErrors.is_success());
        assert!(!JobState::Timeout.is_success());
        assert!(JobState::Timeout.is_final());
        assert!(!JobState::Timeout.is_remote_terminal());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&JobState::MonitorError).unwrap();
        assert_eq!(json, "\"MonitorError\"");
        let state: JobState = serde_json::from_str("\"Queued\"").unwrap();
        assert_eq!(state, JobState::Queued);
    }

    #[test]
    fn counts_render_in_reporting_order() {
        let mut counts = StatusCounts::new();
        counts.add(JobState::Failed, 1);
        counts.add(JobState::Running, 2);
        counts.add(JobState::Other("Paused".into()), 1);
        counts.add(JobState::NotSubmitted, 3);
        assert_eq!(counts.render(), "NotSubmitted:3 | Running:2 | Failed:1 | Paused:1");
    }

    #[test]
    fn transfer_preserves_total() {
        let mut counts = StatusCounts::new();
        counts.add(JobState::NotSubmitted, 2);
        counts.transfer(&JobState::NotSubmitted, JobState::Submitting);
        counts.transfer(&JobState::Submitting, JobState::Running);
        assert_eq!(counts.total(), 2);
        assert_eq!(counts.get(&JobState::Submitting), 0);
        assert_eq!(counts.get(&JobState::Running), 1);
    }

    #[test]
    fn counts_serialize_as_object() {
        let counts: StatusCounts = [JobState::Completed, JobState::Completed, JobState::Failed]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&counts).unwrap();
        assert_eq!(json["Completed"], 2);
        assert_eq!(json["Failed"], 1);
    }
}
