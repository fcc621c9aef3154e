//! Configuration structures
//!
//! Plain data consumed by the client and the batch engine. Loading lives in
//! `cpdbatch-infra::config`; everything here is serde-friendly so the same
//! types back both environment and file based configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::errors::{CpdError, Result};

/// How the client authenticates against the identity endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMode {
    #[default]
    Password,
    ApiKey,
}

impl AuthMode {
    /// Interpret an `AUTH_TYPE` value. `PASSWORD` selects password auth, any
    /// other value selects API key auth.
    pub fn from_auth_type(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("PASSWORD") {
            Self::Password
        } else {
            Self::ApiKey
        }
    }
}

/// Secret half of the identity request.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    Password(String),
    ApiKey(String),
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// Connection and authentication settings for one CPD cluster.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host name (and optional port) of the cluster, without scheme
    pub host: String,
    /// URL scheme, `https` outside of tests
    pub scheme: String,
    pub username: String,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub auth_mode: AuthMode,
    /// Maximum number of pooled connections
    pub pool_size: usize,
    /// Connections created eagerly; defaults to `min(10, pool_size)`
    pub initial_pool_size: Option<usize>,
    pub pool_acquire_timeout_secs: u64,
    pub max_token_age_hours: f64,
    /// Minimum spacing between failure-triggered token refreshes
    pub min_auth_retry_secs: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub auth_timeout_secs: u64,
    /// Accept self-signed certificates (common on on-prem clusters)
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            scheme: "https".to_string(),
            username: String::new(),
            password: None,
            api_key: None,
            auth_mode: AuthMode::Password,
            pool_size: DEFAULT_POOL_SIZE,
            initial_pool_size: None,
            pool_acquire_timeout_secs: DEFAULT_POOL_ACQUIRE_TIMEOUT_SECS,
            max_token_age_hours: DEFAULT_MAX_TOKEN_AGE_HOURS,
            min_auth_retry_secs: DEFAULT_MIN_AUTH_RETRY_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            auth_timeout_secs: DEFAULT_AUTH_TIMEOUT_SECS,
            accept_invalid_certs: false,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("auth_mode", &self.auth_mode)
            .field("pool_size", &self.pool_size)
            .field("initial_pool_size", &self.initial_pool_size)
            .field("max_token_age_hours", &self.max_token_age_hours)
            .field("min_auth_retry_secs", &self.min_auth_retry_secs)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Check required fields for the selected authentication mode.
    ///
    /// # Errors
    /// Returns `CpdError::Config` when the host is missing, when password
    /// mode lacks username/password, or when API key mode lacks
    /// username/api key.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(CpdError::Config("CPD_HOST is required".into()));
        }
        if self.pool_size == 0 {
            return Err(CpdError::Config("pool size must be greater than 0".into()));
        }
        if self.max_token_age_hours.is_nan() || self.max_token_age_hours <= 0.0 {
            return Err(CpdError::Config("max_token_age_hours must be a positive number".into()));
        }
        match self.auth_mode {
            AuthMode::Password if self.username.is_empty() || is_blank(&self.password) => {
                Err(CpdError::Config(
                    "USERNAME and PASSWORD required for password authentication".into(),
                ))
            }
            AuthMode::ApiKey if self.username.is_empty() || is_blank(&self.api_key) => {
                Err(CpdError::Config(
                    "USERNAME and API_KEY required for API key authentication".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Secret matching the configured auth mode.
    ///
    /// # Errors
    /// Returns `CpdError::Config` if the secret for the mode is missing.
    pub fn secret(&self) -> Result<Secret> {
        match self.auth_mode {
            AuthMode::Password => self
                .password
                .clone()
                .map(Secret::Password)
                .ok_or_else(|| CpdError::Config("PASSWORD is not set".into())),
            AuthMode::ApiKey => self
                .api_key
                .clone()
                .map(Secret::ApiKey)
                .ok_or_else(|| CpdError::Config("API_KEY is not set".into())),
        }
    }

    /// Base URL such as `https://cpd.example.com`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host.trim_end_matches('/'))
    }

    pub fn initial_pool_fill(&self) -> usize {
        self.initial_pool_size.unwrap_or(MAX_INITIAL_POOL_FILL).min(self.pool_size)
    }

    pub fn max_token_age(&self) -> Duration {
        secs(self.max_token_age_hours * 3600.0)
    }

    pub fn min_auth_retry_interval(&self) -> Duration {
        Duration::from_secs(self.min_auth_retry_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn pool_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_acquire_timeout_secs)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.is_empty())
}

/// Bounded retry settings shared by submission and monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts (first try included)
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_ms: u64,
    /// Upper bound of the uniform random jitter added to each delay
    pub max_jitter_ms: u64,
}

impl RetrySettings {
    /// # Errors
    /// Returns `CpdError::Config` when the backoff factor is not a positive
    /// finite number.
    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 0.0 {
            return Err(CpdError::Config(format!(
                "{name}.backoff_factor must be a positive number"
            )));
        }
        Ok(())
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
        }
    }
}

/// Settings for one batch of job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_workers: usize,
    pub initial_monitor_delay_secs: f64,
    pub poll_interval_secs: f64,
    pub submission_delay_secs: f64,
    /// Upper bound of the random jitter added to monitor, poll and
    /// submission waits; `0` disables it
    pub wait_jitter_ms: u64,
    pub job_timeout_secs: f64,
    pub total_timeout_secs: f64,
    pub report_interval_secs: f64,
    pub run_name: String,
    pub submit_retry: RetrySettings,
    pub monitor_retry: RetrySettings,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            initial_monitor_delay_secs: DEFAULT_INITIAL_MONITOR_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            submission_delay_secs: DEFAULT_SUBMISSION_DELAY_SECS,
            wait_jitter_ms: 0,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            total_timeout_secs: DEFAULT_TOTAL_TIMEOUT_SECS,
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            run_name: DEFAULT_RUN_NAME.to_string(),
            submit_retry: RetrySettings::default(),
            monitor_retry: RetrySettings::default(),
        }
    }
}

impl BatchConfig {
    /// # Errors
    /// Returns `CpdError::Config` for a zero worker cap or negative durations.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(CpdError::Config("max_workers must be greater than 0".into()));
        }
        let durations = [
            ("initial_monitor_delay_secs", self.initial_monitor_delay_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("submission_delay_secs", self.submission_delay_secs),
            ("job_timeout_secs", self.job_timeout_secs),
            ("total_timeout_secs", self.total_timeout_secs),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(CpdError::Config(format!("{name} must be a non-negative number")));
            }
        }
        self.submit_retry.validate("submit_retry")?;
        self.monitor_retry.validate("monitor_retry")
    }

    pub fn initial_monitor_delay(&self) -> Duration {
        secs(self.initial_monitor_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_secs)
    }

    pub fn submission_delay(&self) -> Duration {
        secs(self.submission_delay_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        secs(self.job_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        secs(self.total_timeout_secs)
    }

    pub fn report_interval(&self) -> Duration {
        secs(self.report_interval_secs)
    }

    pub fn wait_jitter(&self) -> Duration {
        Duration::from_millis(self.wait_jitter_ms)
    }
}

/// Longest wait any setting expands to, so deadline arithmetic on
/// `Instant` cannot overflow.
const MAX_WAIT: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

// NaN and non-positive values are zero; infinite and huge values saturate.
fn secs(value: f64) -> Duration {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).map_or(MAX_WAIT, |d| d.min(MAX_WAIT))
    } else {
        Duration::ZERO
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub batch: BatchConfig,
    /// Project whose jobs are run
    pub project_id: String,
}

impl Config {
    /// # Errors
    /// Returns the first validation failure of the nested sections.
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.batch.validate()?;
        if self.project_id.trim().is_empty() {
            return Err(CpdError::Config("PROJECT_ID is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_config() -> ClientConfig {
        ClientConfig {
            host: "cpd.example.com".into(),
            username: "admin".into(),
            password: Some("secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn password_mode_requires_password() {
        let mut config = password_config();
        assert!(config.validate().is_ok());

        config.password = None;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CpdError::Config(msg) if msg.contains("PASSWORD")));
    }

    #[test]
    fn api_key_mode_requires_api_key() {
        let config = ClientConfig { auth_mode: AuthMode::ApiKey, ..password_config() };
        assert!(matches!(config.validate(), Err(CpdError::Config(msg)) if msg.contains("API_KEY")));

        let config = ClientConfig { api_key: Some("k".into()), ..config };
        assert!(config.validate().is_ok());
        assert_eq!(config.secret().unwrap(), Secret::ApiKey("k".into()));
    }

    #[test]
    fn missing_host_is_rejected() {
        let config = ClientConfig { host: String::new(), ..password_config() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn auth_type_parsing_matches_legacy_rules() {
        assert_eq!(AuthMode::from_auth_type("PASSWORD"), AuthMode::Password);
        assert_eq!(AuthMode::from_auth_type("password"), AuthMode::Password);
        assert_eq!(AuthMode::from_auth_type("API_KEY"), AuthMode::ApiKey);
        assert_eq!(AuthMode::from_auth_type("anything"), AuthMode::ApiKey);
    }

    #[test]
    fn initial_fill_is_capped_by_pool_size() {
        let config = ClientConfig { pool_size: 4, ..password_config() };
        assert_eq!(config.initial_pool_fill(), 4);

        let config = ClientConfig { pool_size: 50, ..password_config() };
        assert_eq!(config.initial_pool_fill(), 10);

        let config =
            ClientConfig { pool_size: 50, initial_pool_size: Some(2), ..password_config() };
        assert_eq!(config.initial_pool_fill(), 2);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", password_config());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn batch_defaults_match_legacy_runner() {
        let batch = BatchConfig::default();
        assert_eq!(batch.max_workers, 20);
        assert_eq!(batch.job_timeout(), Duration::from_secs(3600));
        assert_eq!(batch.total_timeout(), Duration::from_secs(86_400));
        assert_eq!(batch.poll_interval(), Duration::from_secs(5));
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn batch_rejects_zero_workers() {
        let batch = BatchConfig { max_workers: 0, ..Default::default() };
        assert!(batch.validate().is_err());
    }

    #[test]
    fn batch_rejects_unusable_backoff_factor() {
        for factor in [0.0, -1.5, f64::NAN, f64::INFINITY] {
            let mut batch = BatchConfig::default();
            batch.monitor_retry.backoff_factor = factor;
            let err = batch.validate().unwrap_err();
            assert!(matches!(err, CpdError::Config(msg) if msg.contains("monitor_retry")));
        }
    }

    #[test]
    fn extreme_durations_saturate_instead_of_panicking() {
        let config = ClientConfig { max_token_age_hours: f64::INFINITY, ..password_config() };
        assert_eq!(config.max_token_age(), MAX_WAIT);
        assert!(config.validate().is_ok());

        let config = ClientConfig { max_token_age_hours: f64::NAN, ..password_config() };
        assert_eq!(config.max_token_age(), Duration::ZERO);
        assert!(config.validate().is_err());

        let batch = BatchConfig { total_timeout_secs: 1e30, ..Default::default() };
        assert_eq!(batch.total_timeout(), MAX_WAIT);
    }
}
