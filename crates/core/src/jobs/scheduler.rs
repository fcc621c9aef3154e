//! Bounded-concurrency execution of a batch of jobs
//!
//! Runners are spawned one by one, spaced by the submission delay, each
//! holding a worker permit for its whole run. The batch as a whole is bounded
//! by the total timeout: when it expires, waiting and polling runners are
//! cancelled and every job without a result is recorded as `Canceled`.
//! Requests already on the wire are detached rather than aborted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use cpdbatch_common::resilience::jittered;
use cpdbatch_domain::{BatchConfig, BatchResult, BatchSummary, JobResult, JobState};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::ports::JobRunApi;
use super::reporter::StatusReporter;
use super::runner::{JobRunner, RunnerSettings};
use super::tally::StatusTally;

/// Limits applied to one batch.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_workers: usize,
    pub submission_delay: Duration,
    pub wait_jitter: Duration,
    pub total_timeout: Duration,
    pub report_interval: Duration,
}

impl From<&BatchConfig> for SchedulerSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            submission_delay: config.submission_delay(),
            wait_jitter: config.wait_jitter(),
            total_timeout: config.total_timeout(),
            report_interval: config.report_interval(),
        }
    }
}

/// Runs batches of jobs through a shared [`JobRunApi`].
pub struct BatchScheduler {
    api: Arc<dyn JobRunApi>,
    runner_settings: RunnerSettings,
    settings: SchedulerSettings,
}

impl BatchScheduler {
    pub fn new(api: Arc<dyn JobRunApi>, config: &BatchConfig) -> Self {
        Self {
            api,
            runner_settings: RunnerSettings::from(config),
            settings: SchedulerSettings::from(config),
        }
    }

    pub fn with_settings(
        api: Arc<dyn JobRunApi>,
        runner: RunnerSettings,
        settings: SchedulerSettings,
    ) -> Self {
        Self { api, runner_settings: runner, settings }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Run every job in `job_ids` and account for each one exactly once.
    ///
    /// Duplicate ids run once. Results follow submission order.
    #[instrument(
        skip(self, job_ids),
        fields(jobs = job_ids.len(), max_workers = self.settings.max_workers)
    )]
    pub async fn run_all(&self, job_ids: &[String]) -> BatchResult {
        let ids = dedupe(job_ids);
        let tally = Arc::new(StatusTally::new(&ids));
        self.run_with_tally(&ids, tally).await
    }

    /// Like [`run_all`](Self::run_all) with a caller-provided tally, which
    /// must have been created from exactly `ids`.
    pub async fn run_with_tally(&self, ids: &[String], tally: Arc<StatusTally>) -> BatchResult {
        let started = Instant::now();
        let deadline = started + self.settings.total_timeout;
        let cancel = CancellationToken::new();
        let reporter = StatusReporter::new(self.settings.report_interval).spawn(tally.clone());

        let runner = Arc::new(
            JobRunner::new(self.api.clone(), self.runner_settings.clone())
                .with_tally(tally.clone())
                .with_cancellation(cancel.clone()),
        );
        let permits = Arc::new(Semaphore::new(self.settings.max_workers));
        let mut slots: Vec<Option<JobResult>> = vec![None; ids.len()];

        info!(jobs = ids.len(), "starting batch");

        let completed = tokio::time::timeout_at(
            deadline,
            self.drive(ids, &runner, &tally, &permits, &cancel, &mut slots),
        )
        .await;

        if completed.is_err() {
            warn!(
                timeout_secs = self.settings.total_timeout.as_secs_f64(),
                "batch timeout reached, cancelling outstanding jobs"
            );
            cancel.cancel();
        }
        permits.close();

        let elapsed = started.elapsed().as_secs_f64();
        let results: Vec<JobResult> = ids
            .iter()
            .zip(slots)
            .map(|(id, slot)| slot.unwrap_or_else(|| cancelled_result(id, &tally, elapsed)))
            .collect();

        reporter.finish().await;
        let summary = BatchSummary::from_results(&results, tally.snapshot(), elapsed);
        info!(
            total = summary.total_jobs,
            completed = summary.completed_jobs,
            failed = summary.failed_jobs,
            success_rate = summary.success_rate,
            duration_secs = summary.total_duration_seconds,
            "batch finished"
        );
        BatchResult { results, summary }
    }

    /// Spawn one task per job, spaced by the submission delay, and collect
    /// results into `slots` as they finish. On batch timeout this future is
    /// dropped; spawned tasks then continue detached until they observe the
    /// cancellation.
    async fn drive(
        &self,
        ids: &[String],
        runner: &Arc<JobRunner>,
        tally: &Arc<StatusTally>,
        permits: &Arc<Semaphore>,
        cancel: &CancellationToken,
        slots: &mut [Option<JobResult>],
    ) {
        let mut pending = FuturesUnordered::new();

        for (index, id) in ids.iter().enumerate() {
            if index > 0 && !self.settings.submission_delay.is_zero() {
                let delay = jittered(self.settings.submission_delay, self.settings.wait_jitter);
                let pause = tokio::time::sleep(delay);
                tokio::pin!(pause);
                // Keep recording finished jobs while spacing submissions.
                loop {
                    tokio::select! {
                        () = &mut pause => break,
                        Some((slot, result)) = pending.next(), if !pending.is_empty() => {
                            slots[slot] = Some(result);
                        }
                    }
                }
            }
            let handle = spawn_worker(id.clone(), runner.clone(), permits.clone(), cancel.clone());
            pending.push(joined(index, id.clone(), handle, tally.clone()));
        }

        while let Some((slot, result)) = pending.next().await {
            slots[slot] = Some(result);
        }
    }
}

/// Task running one job once a worker permit is free.
fn spawn_worker(
    job_id: String,
    runner: Arc<JobRunner>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
) -> JoinHandle<JobResult> {
    tokio::spawn(async move {
        let permit = tokio::select! {
            permit = permits.acquire_owned() => permit.ok(),
            () = cancel.cancelled() => None,
        };
        let Some(_permit) = permit else {
            return JobResult::terminal(job_id, JobState::Canceled, 0.0)
                .with_error("batch cancelled before start");
        };
        runner.run(&job_id).await
    })
}

/// Await a worker; a panicked or aborted worker becomes an `Exception` result.
async fn joined(
    index: usize,
    job_id: String,
    handle: JoinHandle<JobResult>,
    tally: Arc<StatusTally>,
) -> (usize, JobResult) {
    match handle.await {
        Ok(result) => (index, result),
        Err(err) => {
            error!(job_id = %job_id, error = %err, "job worker failed");
            tally.transition(&job_id, JobState::Exception, None);
            let result =
                JobResult::terminal(job_id, JobState::Exception, 0.0).with_error(err.to_string());
            (index, result)
        }
    }
}

/// Result for a job whose result was not collected before the batch timed
/// out. Jobs the tally already saw finish keep that state.
fn cancelled_result(job_id: &str, tally: &StatusTally, batch_elapsed: f64) -> JobResult {
    let handle = tally.handle(job_id);
    let state = match handle.as_ref().map(|h| &h.current_state) {
        Some(state) if state.is_final() => state.clone(),
        _ => {
            tally.transition(job_id, JobState::Canceled, None);
            JobState::Canceled
        }
    };

    let duration = handle.as_ref().and_then(|h| h.submitted_at).map_or(0.0, |at| {
        #[allow(clippy::cast_precision_loss)]
        let secs = (chrono::Utc::now() - at).num_milliseconds() as f64 / 1000.0;
        secs.clamp(0.0, batch_elapsed)
    });

    let cancelled = state == JobState::Canceled;
    let mut result = JobResult::terminal(job_id, state, duration);
    if cancelled {
        result = result.with_error("Cancelled by batch timeout");
    }
    result.run_id = handle.and_then(|h| h.job_run_id);
    result
}

/// Keep the first occurrence of every id.
fn dedupe(job_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(job_ids.len());
    job_ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}
