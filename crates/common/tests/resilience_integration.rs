//! Integration tests for resilience module
//!
//! Retry executor behaviour against classified errors, as used for job
//! submission.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpdbatch_common::resilience::{
    BackoffStrategy, Jitter, RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryPolicy,
};

/// Custom error type for testing
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallError {
    Transport,
    Status(u16),
}

struct TransientOnly;

impl RetryPolicy<CallError> for TransientOnly {
    fn should_retry(&self, error: &CallError, _attempt: u32) -> RetryDecision {
        match error {
            CallError::Transport | CallError::Status(429 | 502 | 503 | 504) => RetryDecision::Retry,
            CallError::Status(_) => RetryDecision::Stop,
        }
    }
}

fn config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        backoff: BackoffStrategy::Exponential {
            initial_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
        },
        jitter: Jitter::Bounded(Duration::from_millis(500)),
    }
}

/// Validates recovery from a 503 followed by a transport error.
///
/// # Test Steps
/// 1. Fail with 503, then a transport error, then succeed
/// 2. Verify three attempts were made
/// 3. Verify the waits follow the exponential schedule plus bounded jitter
#[tokio::test(start_paused = true)]
async fn test_retryable_failures_then_success() {
    let attempts = Arc::new(AtomicU32::new(0));
    let executor = RetryExecutor::new(config(), TransientOnly);

    let outcome = executor
        .execute_with_outcome(|attempt| {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                match attempt {
                    0 => Err(CallError::Status(503)),
                    1 => Err(CallError::Transport),
                    _ => Ok("run-1"),
                }
            }
        })
        .await;

    assert_eq!(outcome.result.expect("success"), "run-1");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(outcome.total_delay >= Duration::from_secs(3));
    assert!(outcome.total_delay <= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_client_error_is_not_retried() {
    let executor = RetryExecutor::new(config(), TransientOnly);
    let result: Result<(), _> = executor.execute(|_| async { Err(CallError::Status(404)) }).await;

    assert!(matches!(result, Err(RetryError::NonRetryable { source: CallError::Status(404) })));
}

#[tokio::test(start_paused = true)]
async fn test_budget_exhaustion_reports_last_error() {
    let executor = RetryExecutor::new(config(), TransientOnly);
    let result: Result<(), _> = executor.execute(|_| async { Err(CallError::Status(502)) }).await;

    match result {
        Err(RetryError::AttemptsExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last, CallError::Status(502));
        }
        other => panic!("unexpected: {other:?}"),
    }
}
