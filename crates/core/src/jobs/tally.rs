//! Live per-state job counts shared by every runner of a batch
//!
//! One lock guards both the counts and the per-job handles, so a transition
//! (decrement old bucket, increment new bucket, update handle) is never
//! observable half applied. Each transition is published as a
//! [`StatusEvent`] on a broadcast channel for the reporter.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use cpdbatch_domain::{JobHandle, JobState, StatusCounts};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 1024;

/// One state change of one job, with the counts right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub job_id: String,
    pub job_run_id: Option<String>,
    pub from: JobState,
    pub to: JobState,
    pub counts: StatusCounts,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct TallyState {
    counts: StatusCounts,
    jobs: HashMap<String, JobHandle>,
}

/// Status tally for one batch.
#[derive(Debug)]
pub struct StatusTally {
    state: Mutex<TallyState>,
    events: broadcast::Sender<StatusEvent>,
    total: usize,
}

impl StatusTally {
    /// All `job_ids` start in `NotSubmitted`. Ids must be unique.
    pub fn new(job_ids: &[String]) -> Self {
        let mut counts = StatusCounts::new();
        counts.add(JobState::NotSubmitted, job_ids.len());
        let jobs = job_ids.iter().map(|id| (id.clone(), JobHandle::new(id.clone()))).collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { state: Mutex::new(TallyState { counts, jobs }), events, total: job_ids.len() }
    }

    /// Move `job_id` to `to`, optionally recording its run id.
    ///
    /// Returns the published event, or `None` for unknown jobs and no-op
    /// updates.
    pub fn transition(
        &self,
        job_id: &str,
        to: JobState,
        run_id: Option<&str>,
    ) -> Option<StatusEvent> {
        let mut state = self.state.lock();
        let TallyState { counts, jobs } = &mut *state;
        let Some(handle) = jobs.get_mut(job_id) else {
            warn!(job_id, state = %to, "status update for unknown job ignored");
            return None;
        };

        let run_changed = run_id.is_some_and(|r| handle.job_run_id.as_deref() != Some(r));
        if handle.current_state == to && !run_changed {
            return None;
        }
        // Final states are sticky; late updates come from detached runners.
        if handle.current_state.is_final() {
            debug!(
                job_id,
                from = %handle.current_state,
                to = %to,
                "update after final state ignored"
            );
            return None;
        }
        if let Some(run_id) = run_id {
            handle.job_run_id = Some(run_id.to_string());
        }
        if to == JobState::Submitting && handle.submitted_at.is_none() {
            handle.submitted_at = Some(Utc::now());
        }

        let from = std::mem::replace(&mut handle.current_state, to.clone());
        counts.transfer(&from, to.clone());

        let event = StatusEvent {
            job_id: job_id.to_string(),
            job_run_id: handle.job_run_id.clone(),
            from,
            to,
            counts: counts.clone(),
            at: Utc::now(),
        };
        // No subscribers is fine.
        let _ = self.events.send(event.clone());
        Some(event)
    }

    /// Consistent copy of the counts.
    pub fn snapshot(&self) -> StatusCounts {
        self.state.lock().counts.clone()
    }

    pub fn handle(&self, job_id: &str) -> Option<JobHandle> {
        self.state.lock().jobs.get(job_id).cloned()
    }

    pub fn state_of(&self, job_id: &str) -> Option<JobState> {
        self.state.lock().jobs.get(job_id).map(|h| h.current_state.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Number of jobs in the batch.
    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("job-{i}")).collect()
    }

    #[test]
    fn starts_all_not_submitted() {
        let tally = StatusTally::new(&ids(4));
        assert_eq!(tally.snapshot().get(&JobState::NotSubmitted), 4);
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn transitions_move_exactly_one_job() {
        let tally = StatusTally::new(&ids(3));
        tally.transition("job-1", JobState::Submitting, None);
        let event = tally.transition("job-1", JobState::Queued, Some("run-1")).unwrap();

        assert_eq!(event.from, JobState::Submitting);
        assert_eq!(event.counts.get(&JobState::NotSubmitted), 2);
        assert_eq!(event.counts.get(&JobState::Queued), 1);
        assert_eq!(event.counts.total(), 3);

        let handle = tally.handle("job-1").unwrap();
        assert_eq!(handle.job_run_id.as_deref(), Some("run-1"));
        assert!(handle.submitted_at.is_some());
    }

    #[test]
    fn repeated_state_is_not_republished() {
        let tally = StatusTally::new(&ids(1));
        assert!(tally.transition("job-1", JobState::Running, Some("r")).is_some());
        assert!(tally.transition("job-1", JobState::Running, Some("r")).is_none());
        assert!(tally.transition("missing", JobState::Running, None).is_none());
        assert_eq!(tally.snapshot().total(), 1);
    }

    #[test]
    fn final_state_is_sticky() {
        let tally = StatusTally::new(&ids(1));
        tally.transition("job-1", JobState::Canceled, None);
        assert!(tally.transition("job-1", JobState::Running, None).is_none());
        assert_eq!(tally.state_of("job-1"), Some(JobState::Canceled));
    }

    #[test]
    fn concurrent_transitions_conserve_total() {
        let jobs = ids(16);
        let tally = std::sync::Arc::new(StatusTally::new(&jobs));
        let states =
            &[JobState::Submitting, JobState::Queued, JobState::Running, JobState::Completed];

        std::thread::scope(|scope| {
            for job in &jobs {
                let tally = tally.clone();
                scope.spawn(move || {
                    for state in states {
                        tally.transition(job, state.clone(), None);
                        assert_eq!(tally.snapshot().total(), 16);
                    }
                });
            }
        });

        assert_eq!(tally.snapshot().get(&JobState::Completed), 16);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let tally = StatusTally::new(&ids(1));
        let mut rx = tally.subscribe();
        tally.transition("job-1", JobState::Submitting, None);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.to, JobState::Submitting);
    }
}
