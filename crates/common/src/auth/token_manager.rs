//! Token manager with age and failure triggered refresh
//!
//! Owns the single bearer [`Credential`] of a client:
//! - lazily obtains a token on first use
//! - refreshes when the token is older than the configured maximum age
//! - refreshes after an authorization failure, at most once per minimum
//!   retry interval
//!
//! Refreshes are serialized by one async mutex and re-check state after
//! acquiring it, so concurrent callers that find the token stale share a
//! single identity call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::traits::{IdentityError, IdentityProvider};
use super::types::Credential;
use crate::time::{Clock, SystemClock};

/// Error type for token manager operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenManagerError {
    /// The identity endpoint rejected the credentials or was unreachable
    #[error("authentication failed: {0}")]
    Auth(#[from] IdentityError),

    /// A failure-triggered refresh was skipped because the previous auth
    /// failure is too recent
    #[error("refresh skipped: last auth failure {since:?} ago (min interval {min_interval:?})")]
    RecentRefreshFailed { since: Duration, min_interval: Duration },
}

/// Token manager for one client instance.
pub struct TokenManager<P: IdentityProvider + 'static> {
    provider: P,
    clock: Arc<dyn Clock>,
    credential: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
    max_age: Duration,
    min_auth_retry: Duration,
    refreshes: AtomicU64,
}

impl<P: IdentityProvider + 'static> TokenManager<P> {
    /// Create a new token manager
    ///
    /// # Arguments
    /// * `provider` - Identity endpoint used for every refresh
    /// * `max_age` - Tokens older than this are refreshed before use
    /// * `min_auth_retry` - Minimum spacing between failure-triggered
    ///   refreshes
    #[must_use]
    pub fn new(provider: P, max_age: Duration, min_auth_retry: Duration) -> Self {
        Self {
            provider,
            clock: Arc::new(SystemClock),
            credential: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            max_age,
            min_auth_retry,
            refreshes: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Live credential, refreshed first if missing or older than the maximum
    /// age.
    ///
    /// # Errors
    /// Returns [`TokenManagerError::Auth`] if a needed refresh fails.
    pub async fn current_token(&self) -> Result<Credential, TokenManagerError> {
        if let Some(credential) = self.fresh_credential().await {
            return Ok(credential);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(credential) = self.fresh_credential().await {
            debug!("token refreshed by a concurrent caller, reusing it");
            return Ok(credential);
        }

        debug!("token missing or past max age, refreshing");
        self.refresh_locked(None).await
    }

    /// Record the current time as the last authentication failure.
    ///
    /// Returns the previously recorded failure time, if any.
    pub async fn mark_auth_failure(&self) -> Option<Instant> {
        self.mark_auth_failure_at(self.clock.now()).await
    }

    /// Unconditionally obtain a new token.
    ///
    /// The recorded auth failure time carries over to the new credential.
    ///
    /// # Errors
    /// Returns [`TokenManagerError::Auth`] if the identity call fails.
    pub async fn refresh(&self) -> Result<Credential, TokenManagerError> {
        let _guard = self.refresh_lock.lock().await;
        let inherited = self.credential.read().await.as_ref().and_then(|c| c.last_auth_failure);
        self.refresh_locked(inherited).await
    }

    /// Handle an authorization failure of a call made with `rejected_token`.
    ///
    /// Under the refresh lock:
    /// 1. if another caller already replaced the rejected token, the current
    ///    token is returned without a network call;
    /// 2. if an auth failure was recorded less than the minimum retry
    ///    interval ago, [`TokenManagerError::RecentRefreshFailed`] is
    ///    returned without a network call;
    /// 3. otherwise the failure is recorded and the token refreshed.
    ///
    /// # Errors
    /// `RecentRefreshFailed` when throttled, `Auth` when the refresh fails.
    pub async fn refresh_after_auth_failure(
        &self,
        rejected_token: &str,
    ) -> Result<Credential, TokenManagerError> {
        let _guard = self.refresh_lock.lock().await;
        let now = self.clock.now();

        if let Some(current) = self.credential.read().await.as_ref() {
            if current.token != rejected_token && !current.is_stale(now, self.max_age) {
                debug!("rejected token already replaced, reusing current token");
                return Ok(current.clone());
            }
            if current.failed_within(now, self.min_auth_retry) {
                let since = current
                    .last_auth_failure
                    .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
                warn!(
                    since_secs = since.as_secs_f64(),
                    min_interval_secs = self.min_auth_retry.as_secs_f64(),
                    "auth failure too soon after the previous one, not refreshing"
                );
                return Err(TokenManagerError::RecentRefreshFailed {
                    since,
                    min_interval: self.min_auth_retry,
                });
            }
        }

        self.mark_auth_failure_at(now).await;
        info!("authorization failure reported, refreshing token");
        self.refresh_locked(Some(now)).await
    }

    /// Current credential without any refresh.
    pub async fn cached(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    /// Number of successful identity calls made so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn min_auth_retry(&self) -> Duration {
        self.min_auth_retry
    }

    async fn fresh_credential(&self) -> Option<Credential> {
        let now = self.clock.now();
        self.credential.read().await.as_ref().filter(|c| !c.is_stale(now, self.max_age)).cloned()
    }

    async fn mark_auth_failure_at(&self, at: Instant) -> Option<Instant> {
        let mut guard = self.credential.write().await;
        let current = guard.take()?;
        let previous = current.last_auth_failure;
        *guard = Some(current.with_last_auth_failure(Some(at)));
        previous
    }

    // Caller holds `refresh_lock`.
    async fn refresh_locked(
        &self,
        last_auth_failure: Option<Instant>,
    ) -> Result<Credential, TokenManagerError> {
        let token = self.provider.authorize().await.map_err(|e| {
            error!(error = %e, "token refresh failed");
            TokenManagerError::Auth(e)
        })?;

        let credential = Credential::new(token, self.clock.now(), self.clock.wall())
            .with_last_auth_failure(last_auth_failure);
        *self.credential.write().await = Some(credential.clone());
        let n = self.refreshes.fetch_add(1, Ordering::Relaxed) + 1;
        info!(refreshes = n, "obtained new access token");
        Ok(credential)
    }
}
