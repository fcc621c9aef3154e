//! Single job execution: submit a run, then poll it to a final state
//!
//! ```text
//! NotSubmitted -> Submitting -> SubmitFailed
//!                            -> <initial remote state> -> ... poll ... ->
//!                               Completed | CompletedWithWarnings | CompletedWithErrors
//!                               | Failed | Canceled | Timeout | MonitorError
//! ```
//!
//! Waits use `tokio::time` and stop early when the runner's cancellation
//! token fires; the per-job timeout is checked once per poll iteration.

use std::sync::Arc;
use std::time::Duration;

use cpdbatch_common::resilience::policies::{AlwaysRetry, PredicateRetry};
use cpdbatch_common::resilience::{
    jittered, BackoffStrategy, Jitter, RetryConfig, RetryError, RetryExecutor,
};
use cpdbatch_domain::{BatchConfig, JobResult, JobState, RetrySettings, RunInfo, SubmittedRun};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::ports::{JobApiError, JobRunApi};
use super::tally::StatusTally;

/// Timing and retry settings of a runner.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub run_name: String,
    pub initial_monitor_delay: Duration,
    pub poll_interval: Duration,
    /// Upper bound of random extra wait added to monitor and poll delays
    pub wait_jitter: Duration,
    pub job_timeout: Duration,
    pub submit_retry: RetryConfig,
    pub monitor_retry: RetryConfig,
}

impl From<&BatchConfig> for RunnerSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            run_name: config.run_name.clone(),
            initial_monitor_delay: config.initial_monitor_delay(),
            poll_interval: config.poll_interval(),
            wait_jitter: config.wait_jitter(),
            job_timeout: config.job_timeout(),
            submit_retry: retry_config(&config.submit_retry),
            monitor_retry: retry_config(&config.monitor_retry),
        }
    }
}

/// Shared retry policy object built from configuration values.
pub fn retry_config(settings: &RetrySettings) -> RetryConfig {
    RetryConfig {
        max_attempts: settings.max_attempts.max(1),
        backoff: BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(settings.backoff_base_ms),
            factor: settings.backoff_factor,
            max_delay: Duration::from_millis(settings.max_backoff_ms),
        },
        jitter: match settings.max_jitter_ms {
            0 => Jitter::None,
            max => Jitter::Bounded(Duration::from_millis(max)),
        },
    }
}

/// Where monitoring of a submitted run ended.
struct Monitored {
    state: JobState,
    run_info: Option<RunInfo>,
    error: Option<String>,
}

impl Monitored {
    fn new(state: JobState, run_info: Option<RunInfo>, error: Option<String>) -> Self {
        Self { state, run_info, error }
    }

    fn cancelled(run_info: Option<RunInfo>) -> Self {
        Self::new(JobState::Canceled, run_info, Some("batch cancelled".into()))
    }
}

/// Executes jobs against a [`JobRunApi`]; one runner is shared by every
/// task of a batch.
pub struct JobRunner {
    api: Arc<dyn JobRunApi>,
    settings: RunnerSettings,
    tally: Option<Arc<StatusTally>>,
    cancel: CancellationToken,
}

impl JobRunner {
    pub fn new(api: Arc<dyn JobRunApi>, settings: RunnerSettings) -> Self {
        Self { api, settings, tally: None, cancel: CancellationToken::new() }
    }

    /// Report every transition to `tally`.
    #[must_use]
    pub fn with_tally(mut self, tally: Arc<StatusTally>) -> Self {
        self.tally = Some(tally);
        self
    }

    /// Stop waiting and finish as `Canceled` once `token` fires.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Submit a run of `job_id` and follow it to a final state.
    ///
    /// Never fails: every outcome is encoded in the returned [`JobResult`].
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, job_id: &str) -> JobResult {
        let started = Instant::now();
        self.report(job_id, JobState::Submitting, None);

        let submitted = match self.submit(job_id).await {
            Ok(run) => run,
            Err(err) => {
                let state = if matches!(err, RetryError::Cancelled { .. }) {
                    JobState::Canceled
                } else {
                    JobState::SubmitFailed
                };
                let message = describe(&err);
                warn!(error = %message, "job submission failed");
                self.report(job_id, state.clone(), None);
                return JobResult::terminal(job_id, state, elapsed_secs(started))
                    .with_error(message);
            }
        };

        tracing::Span::current().record("run_id", submitted.run_id.as_str());
        info!(
            job_name = submitted.job_name.as_deref().unwrap_or(""),
            state = %submitted.state,
            "job run submitted"
        );
        self.report(job_id, submitted.state.clone(), Some(&submitted.run_id));

        let Monitored { state, run_info, error } = self.monitor(job_id, &submitted, started).await;
        self.report(job_id, state.clone(), None);

        let job_name = run_info
            .as_ref()
            .and_then(|info| info.job_name.clone())
            .or_else(|| submitted.job_name.clone());
        info!(final_state = %state, "job finished");

        JobResult {
            job_id: job_id.to_string(),
            run_id: Some(submitted.run_id),
            job_name,
            success: state.is_success(),
            final_state: state,
            run_info,
            duration_seconds: elapsed_secs(started),
            error,
        }
    }

    async fn submit(&self, job_id: &str) -> Result<SubmittedRun, RetryError<JobApiError>> {
        let executor = RetryExecutor::new(
            self.settings.submit_retry.clone(),
            PredicateRetry::new(JobApiError::is_retryable),
        )
        .with_cancellation(self.cancel.clone());

        executor.execute(|_| self.api.submit_run(job_id, &self.settings.run_name)).await
    }

    async fn monitor(&self, job_id: &str, run: &SubmittedRun, started: Instant) -> Monitored {
        let initial = jittered(self.settings.initial_monitor_delay, self.settings.wait_jitter);
        if !self.wait(initial).await {
            return Monitored::cancelled(None);
        }

        let executor = RetryExecutor::new(self.settings.monitor_retry.clone(), AlwaysRetry)
            .with_cancellation(self.cancel.clone());
        let mut last_info: Option<RunInfo> = None;

        loop {
            if started.elapsed() > self.settings.job_timeout {
                let timeout_secs = self.settings.job_timeout.as_secs_f64();
                warn!(timeout_secs, "job exceeded its timeout");
                return Monitored::new(
                    JobState::Timeout,
                    last_info,
                    Some(format!("Job exceeded timeout of {timeout_secs}s")),
                );
            }

            match executor.execute(|_| self.api.get_run(job_id, &run.run_id)).await {
                Ok(info) => {
                    let state = info
                        .state
                        .as_deref()
                        .map_or(JobState::Other("Unknown".into()), JobState::from);
                    debug!(state = %state, "polled job run");
                    self.report(job_id, state.clone(), None);
                    let remote_terminal = state.is_remote_terminal();
                    last_info = Some(info);
                    if remote_terminal {
                        let error =
                            (!state.is_success()).then(|| format!("Job ended in state {state}"));
                        return Monitored::new(state, last_info, error);
                    }
                }
                Err(RetryError::Cancelled { .. }) => {
                    return Monitored::cancelled(last_info);
                }
                Err(err) => {
                    let message = describe(&err);
                    warn!(error = %message, "monitoring gave up after repeated failures");
                    return Monitored::new(JobState::MonitorError, last_info, Some(message));
                }
            }

            let pause = jittered(self.settings.poll_interval, self.settings.wait_jitter);
            if !self.wait(pause).await {
                return Monitored::cancelled(last_info);
            }
        }
    }

    /// Returns `false` if cancelled first.
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = self.cancel.cancelled() => false,
        }
    }

    fn report(&self, job_id: &str, state: JobState, run_id: Option<&str>) {
        if let Some(tally) = &self.tally {
            tally.transition(job_id, state, run_id);
        }
    }
}

fn describe(err: &RetryError<JobApiError>) -> String {
    match err {
        RetryError::AttemptsExhausted { attempts, last } => {
            format!("{last} (after {attempts} attempts)")
        }
        RetryError::NonRetryable { source } => source.to_string(),
        other => other.to_string(),
    }
}

fn elapsed_secs(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}
