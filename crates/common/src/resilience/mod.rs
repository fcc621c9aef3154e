//! Resilience patterns for remote calls
//!
//! - **Retry Logic**: bounded attempts with exponential backoff and jitter,
//!   shared by job submission and job polling
//!
//! The policy decides *whether* an error is worth another attempt; the
//! [`RetryConfig`] decides *how long* to wait. Callers classify their own
//! errors through [`RetryPolicy`].

pub mod retry;

pub use retry::{
    jittered, policies, random_duration, BackoffStrategy, Jitter, RetryConfig, RetryDecision,
    RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
