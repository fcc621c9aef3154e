//! Scripted `JobRunApi` double

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cpdbatch_common::testing::{ConcurrencyGauge, GaugeGuard};
use cpdbatch_core::jobs::{JobApiError, JobRunApi};
use cpdbatch_domain::{JobState, RunInfo, SubmittedRun};
use parking_lot::Mutex;

/// Behaviour of one job id.
#[derive(Debug, Clone, Default)]
pub struct JobScript {
    /// Returned by successive submit calls before one succeeds
    pub submit_errors: VecDeque<JobApiError>,
    /// Successive poll states; `steady` once exhausted
    pub polls: VecDeque<String>,
    pub steady: Option<String>,
    pub panic_on_submit: bool,
}

impl JobScript {
    pub fn polls(states: &[&str]) -> Self {
        Self { polls: states.iter().map(|s| (*s).to_string()).collect(), ..Self::default() }
    }

    pub fn failing_submit(error: JobApiError, times: usize) -> Self {
        Self { submit_errors: std::iter::repeat(error).take(times).collect(), ..Self::default() }
    }

    pub fn never_finishing() -> Self {
        Self { steady: Some("Running".into()), ..Self::default() }
    }
}

/// In-memory job service. Unscripted jobs complete on their first poll.
///
/// A run counts as active on the gauge from its accepted submission until a
/// poll reports a terminal state.
#[derive(Default)]
pub struct ScriptedJobApi {
    scripts: Mutex<HashMap<String, JobScript>>,
    active: Mutex<HashMap<String, GaugeGuard>>,
    pub gauge: ConcurrencyGauge,
    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
}

impl ScriptedJobApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, job_id: &str, script: JobScript) -> Self {
        self.scripts.lock().insert(job_id.to_string(), script);
        self
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunApi for ScriptedJobApi {
    async fn submit_run(&self, job_id: &str, _run_name: &str) -> Result<SubmittedRun, JobApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let (error, panic) = {
            let mut scripts = self.scripts.lock();
            let script = scripts.entry(job_id.to_string()).or_default();
            (script.submit_errors.pop_front(), script.panic_on_submit)
        };
        assert!(!panic, "scripted worker panic for {job_id}");
        if let Some(error) = error {
            return Err(error);
        }

        self.active.lock().insert(job_id.to_string(), self.gauge.enter());
        Ok(SubmittedRun {
            run_id: format!("run-{job_id}"),
            job_name: Some(format!("{job_id}.DataStage job")),
            state: JobState::Queued,
            job_ref: None,
        })
    }

    async fn get_run(&self, job_id: &str, run_id: &str) -> Result<RunInfo, JobApiError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let state = {
            let mut scripts = self.scripts.lock();
            let script = scripts.entry(job_id.to_string()).or_default();
            script
                .polls
                .pop_front()
                .or_else(|| script.steady.clone())
                .unwrap_or_else(|| "Completed".to_string())
        };
        if JobState::from(state.as_str()).is_remote_terminal() {
            self.active.lock().remove(job_id);
        }
        Ok(RunInfo {
            run_id: run_id.to_string(),
            job_id: job_id.to_string(),
            job_name: Some(format!("{job_id}.DataStage job")),
            state: Some(state),
            ..RunInfo::default()
        })
    }
}
