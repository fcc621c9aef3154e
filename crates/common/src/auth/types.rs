//! Bearer credential held by the token manager.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Bearer token with its issue time and the last authentication failure
/// observed while it was active.
///
/// Replaced as a whole on refresh; never mutated field by field outside the
/// token manager's lock.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Opaque bearer token
    pub token: String,
    /// Monotonic issue time, used for age checks
    pub issued_at: Instant,
    /// Wall clock issue time, for logging
    pub issued_at_wall: DateTime<Utc>,
    /// When an authenticated call last reported this client as unauthorized
    pub last_auth_failure: Option<Instant>,
}

impl Credential {
    #[must_use]
    pub fn new(token: String, issued_at: Instant, issued_at_wall: DateTime<Utc>) -> Self {
        Self { token, issued_at, issued_at_wall, last_auth_failure: None }
    }

    #[must_use]
    pub fn with_last_auth_failure(mut self, at: Option<Instant>) -> Self {
        self.last_auth_failure = at;
        self
    }

    /// Age relative to `now`; zero if `now` precedes the issue time.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.issued_at)
    }

    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.age(now) > max_age
    }

    /// `true` if an auth failure was recorded less than `interval` before `now`.
    pub fn failed_within(&self, now: Instant, interval: Duration) -> bool {
        self.last_auth_failure
            .is_some_and(|at| now.saturating_duration_since(at) < interval)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at_wall", &self.issued_at_wall)
            .field("last_auth_failure", &self.last_auth_failure)
            .finish_non_exhaustive()
    }
}
