//! Human readable rendering of durations and timestamps.

use chrono::DateTime;

/// Placeholder used for absent values in reports.
pub const NOT_AVAILABLE: &str = "N/A";

/// Render seconds as `42.5s`, `3m 5s` or `1h 2m 3s`.
///
/// # Examples
///
/// ```
/// use cpdbatch_domain::format_duration;
///
/// assert_eq!(format_duration(Some(42.5)), "42.5s");
/// assert_eq!(format_duration(Some(185.0)), "3m 5s");
/// assert_eq!(format_duration(Some(3723.9)), "1h 2m 3s");
/// assert_eq!(format_duration(None), "N/A");
/// ```
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds else {
        return NOT_AVAILABLE.to_string();
    };
    if seconds < 60.0 {
        if seconds.fract() == 0.0 {
            format!("{seconds:.1}s")
        } else {
            format!("{seconds}s")
        }
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor() as u64;
        let secs = (seconds % 60.0).floor() as u64;
        format!("{minutes}m {secs}s")
    } else {
        let hours = (seconds / 3600.0).floor() as u64;
        let minutes = ((seconds % 3600.0) / 60.0).floor() as u64;
        let secs = (seconds % 60.0).floor() as u64;
        format!("{hours}h {minutes}m {secs}s")
    }
}

/// Render an epoch-millisecond timestamp as `%Y-%m-%d %H:%M:%S` (UTC).
///
/// Missing, zero and out of range values render as `N/A`.
pub fn format_timestamp(millis: Option<i64>) -> String {
    millis
        .filter(|ms| *ms != 0)
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(
            || NOT_AVAILABLE.to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        )
}
