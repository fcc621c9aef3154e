//! Mock implementations of common traits
//!
//! Provides mock objects for testing purposes.

// Allow missing error/panic docs for test mocks - they are designed to be simple
// and errors are clearly indicated by their return types
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{IdentityError, IdentityProvider};

/// Scripted identity endpoint
///
/// Pops queued outcomes first; once the script is empty every call succeeds
/// with `token-<n>`, where `n` is the 1-based call number.
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use cpdbatch_common::auth::{IdentityError, IdentityProvider};
/// use cpdbatch_common::testing::MockIdentityProvider;
///
/// # tokio_test::block_on(async {
/// let provider = MockIdentityProvider::new();
/// provider.push_err(IdentityError::Unreachable("down".into()));
///
/// assert!(provider.authorize().await.is_err());
/// assert_eq!(provider.authorize().await.unwrap(), "token-2");
/// assert_eq!(provider.calls(), 2);
/// # });
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<String, IdentityError>>>,
    delay: Duration,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long (on the tokio clock) inside every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_ok(&self, token: impl Into<String>) {
        self.script.lock().push_back(Ok(token.into()));
    }

    pub fn push_err(&self, error: IdentityError) {
        self.script.lock().push_back(Err(error));
    }

    /// Number of `authorize` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn authorize(&self) -> Result<String, IdentityError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(format!("token-{n}")))
    }
}

/// Tracks how many operations are in flight at once
///
/// Hold the guard from [`ConcurrencyGauge::enter`] for the duration of the
/// instrumented section; [`ConcurrencyGauge::peak`] reports the maximum
/// overlap observed.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGauge {
    inner: Arc<GaugeState>,
}

#[derive(Debug, Default)]
struct GaugeState {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the gauge on drop.
#[derive(Debug)]
pub struct GaugeGuard {
    inner: Arc<GaugeState>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> GaugeGuard {
        let now = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard { inner: self.inner.clone() }
    }

    pub fn current(&self) -> usize {
        self.inner.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.inner.current.fetch_sub(1, Ordering::SeqCst);
    }
}
