//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Client defaults
pub const DEFAULT_POOL_SIZE: usize = 50;
pub const MAX_INITIAL_POOL_FILL: usize = 10;
pub const DEFAULT_MAX_TOKEN_AGE_HOURS: f64 = 23.0;
pub const DEFAULT_MIN_AUTH_RETRY_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

// Batch defaults
pub const DEFAULT_MAX_WORKERS: usize = 20;
pub const DEFAULT_INITIAL_MONITOR_SECS: f64 = 10.0;
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 5.0;
pub const DEFAULT_SUBMISSION_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_JOB_TIMEOUT_SECS: f64 = 3600.0;
pub const DEFAULT_TOTAL_TIMEOUT_SECS: f64 = 86_400.0;
pub const DEFAULT_REPORT_INTERVAL_SECS: f64 = 5.0;
pub const DEFAULT_RUN_NAME: &str = "job run";

// Retry defaults
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
pub const DEFAULT_MAX_JITTER_MS: u64 = 1_000;

// Catalog
pub const DEFAULT_JOB_NAME_SUFFIX: &str = ".DataStage job";
pub const SEARCH_PAGE_LIMIT: u32 = 20;
pub const DEFAULT_SEARCH_AUTH_SCOPE: &str = "category";

/// HTTP statuses worth retrying on job submission and monitoring.
pub const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];
