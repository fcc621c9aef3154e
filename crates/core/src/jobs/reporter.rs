//! Status line rendering for a running batch
//!
//! The reporter consumes [`StatusEvent`]s from the tally's broadcast channel
//! and logs the current distribution. A line is written at most once per
//! reporting interval, except that a transition into a significant terminal
//! state is written immediately.

use std::sync::Arc;
use std::time::Duration;

use cpdbatch_domain::StatusCounts;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::tally::{StatusEvent, StatusTally};

/// Throttling decision for status lines.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    interval: Duration,
    last_render: Option<Instant>,
}

impl StatusReporter {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_render: None }
    }

    /// Whether `event` observed at `now` should produce a status line.
    pub fn should_render(&self, event: &StatusEvent, now: Instant) -> bool {
        if event.to.is_significant() {
            return true;
        }
        self.last_render.map_or(true, |last| now.duration_since(last) >= self.interval)
    }

    fn render(&mut self, event: &StatusEvent, total: usize, now: Instant) {
        self.last_render = Some(now);
        info!(
            job_id = %event.job_id,
            from = %event.from,
            to = %event.to,
            total,
            "status: {}",
            event.counts.render()
        );
    }

    /// Spawn a task that renders events from `tally` until the returned
    /// handle is finished.
    pub fn spawn(self, tally: Arc<StatusTally>) -> ReporterHandle {
        let stop = CancellationToken::new();
        let mut events = tally.subscribe();
        let total = tally.total();
        let token = stop.clone();
        let mut reporter = self;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => {
                            let now = Instant::now();
                            if reporter.should_render(&event, now) {
                                reporter.render(&event, total, now);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "status reporter lagged behind");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        ReporterHandle { stop, task, tally }
    }
}

/// Running reporter task.
#[derive(Debug)]
pub struct ReporterHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
    tally: Arc<StatusTally>,
}

impl ReporterHandle {
    /// Stop the reporter and log the final distribution.
    pub async fn finish(self) {
        self.stop.cancel();
        if let Err(err) = self.task.await {
            debug!(error = %err, "status reporter task ended abnormally");
        }
        log_final_distribution(&self.tally.snapshot());
    }
}

/// `(state, count, percent)` rows in reporting order.
pub fn distribution(counts: &StatusCounts) -> Vec<(String, usize, f64)> {
    let total = counts.total();
    counts
        .iter()
        .map(|(state, n)| {
            #[allow(clippy::cast_precision_loss)]
            let percent = if total == 0 { 0.0 } else { n as f64 * 100.0 / total as f64 };
            (state.to_string(), n, percent)
        })
        .collect()
}

pub fn log_final_distribution(counts: &StatusCounts) {
    info!(total = counts.total(), "final status distribution");
    for (state, n, percent) in distribution(counts) {
        info!(state = %state, count = n, "  {state}: {n} ({percent:.1}%)");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use cpdbatch_domain::JobState;

    use super::*;

    fn event(to: JobState) -> StatusEvent {
        StatusEvent {
            job_id: "job-1".into(),
            job_run_id: None,
            from: JobState::NotSubmitted,
            to,
            counts: StatusCounts::new(),
            at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_renders_first_event_then_throttles() {
        let mut reporter = StatusReporter::new(Duration::from_secs(5));
        let start = Instant::now();
        let running = event(JobState::Running);

        assert!(reporter.should_render(&running, start));
        reporter.render(&running, 1, start);

        assert!(!reporter.should_render(&running, start + Duration::from_secs(2)));
        assert!(reporter.should_render(&running, start + Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_significant_states_bypass_interval() {
        let mut reporter = StatusReporter::new(Duration::from_secs(5));
        let start = Instant::now();
        reporter.render(&event(JobState::Running), 1, start);

        let finals = [
            JobState::Completed,
            JobState::Failed,
            JobState::CompletedWithErrors,
            JobState::Canceled,
        ];
        for state in finals {
            assert!(reporter.should_render(&event(state), start));
        }
        assert!(!reporter.should_render(&event(JobState::Timeout), start));
    }

    #[test]
    fn test_distribution_percentages() {
        let counts: StatusCounts =
            [JobState::Completed, JobState::Completed, JobState::Completed, JobState::Failed]
                .into_iter()
                .collect();
        let rows = distribution(&counts);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "Completed");
        assert_eq!(rows[0].1, 3);
        assert!((rows[0].2 - 75.0).abs() < f64::EPSILON);
        assert!((rows[1].2 - 25.0).abs() < f64::EPSILON);
        assert!(distribution(&StatusCounts::new()).is_empty());
    }

    #[tokio::test]
    async fn test_spawned_reporter_finishes_cleanly() {
        let tally = Arc::new(StatusTally::new(&["job-1".to_string()]));
        let handle = StatusReporter::new(Duration::from_secs(5)).spawn(tally.clone());

        tally.transition("job-1", JobState::Submitting, None);
        tally.transition("job-1", JobState::Completed, Some("run-1"));
        handle.finish().await;

        assert_eq!(tally.snapshot().get(&JobState::Completed), 1);
    }
}
