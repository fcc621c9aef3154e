//! Timing details of a job run as reported by the job service.

use serde::{Deserialize, Serialize};

/// Run metadata with epoch-millisecond timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub job_id: String,
    pub job_name: Option<String>,
    pub state: Option<String>,
    pub created: Option<i64>,
    pub queue_start: Option<i64>,
    pub queue_end: Option<i64>,
    pub execution_start: Option<i64>,
    pub execution_end: Option<i64>,
    /// Duration as reported by the service
    pub duration: Option<f64>,
}

impl RunInfo {
    /// Seconds spent queued.
    pub fn queued_duration(&self) -> Option<f64> {
        span_seconds(self.queue_start, self.queue_end)
    }

    /// Seconds spent executing.
    pub fn execution_duration(&self) -> Option<f64> {
        span_seconds(self.execution_start, self.execution_end)
    }

    /// Seconds from run creation to end of execution.
    pub fn total_duration(&self) -> Option<f64> {
        span_seconds(self.created, self.execution_end)
    }
}

// Zero timestamps mean "not set" on the wire.
#[allow(clippy::cast_precision_loss)]
fn span_seconds(start: Option<i64>, end: Option<i64>) -> Option<f64> {
    match (start, end) {
        (Some(start), Some(end)) if start != 0 && end != 0 => {
            let millis = end.checked_sub(start)?;
            let centis = (millis as f64 / 10.0).round();
            Some(centis / 100.0)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunInfo {
        RunInfo {
            run_id: "run-1".into(),
            job_id: "job-1".into(),
            created: Some(1_700_000_000_000),
            queue_start: Some(1_700_000_001_000),
            queue_end: Some(1_700_000_003_345),
            execution_start: Some(1_700_000_003_345),
            execution_end: Some(1_700_000_065_000),
            ..Default::default()
        }
    }

    #[test]
    fn derives_rounded_durations() {
        let info = sample();
        assert_eq!(info.queued_duration(), Some(2.35));
        assert_eq!(info.execution_duration(), Some(61.66));
        assert_eq!(info.total_duration(), Some(65.0));
    }

    #[test]
    fn missing_or_zero_timestamps_yield_none() {
        let info = RunInfo { execution_end: None, queue_start: Some(0), ..sample() };
        assert_eq!(info.execution_duration(), None);
        assert_eq!(info.total_duration(), None);
        assert_eq!(info.queued_duration(), None);
    }

    #[test]
    fn overflowing_span_yields_none() {
        let info = RunInfo {
            execution_start: Some(i64::MIN),
            execution_end: Some(i64::MAX),
            ..sample()
        };
        assert_eq!(info.execution_duration(), None);
    }
}
