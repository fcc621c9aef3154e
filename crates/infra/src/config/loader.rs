//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Variables from `.env` (or an explicit env file) are applied, overriding
//!    the process environment
//! 2. Attempts to load from environment variables
//! 3. If incomplete, falls back to loading from file
//! 4. Searches multiple paths for config files (JSON and TOML)
//!
//! ## Environment Variables
//! Required:
//! - `CPD_HOST`: Cluster host name, without scheme
//! - `CPD_USERNAME` / `USERNAME`: Login user
//! - `CPD_PASSWORD` / `PASSWORD`: Password (password auth)
//! - `CPD_API_KEY` / `API_KEY`: API key (API key auth)
//! - `PROJECT_ID`: Project whose jobs are run
//!
//! Optional:
//! - `AUTH_TYPE`: `PASSWORD` (default) or anything else for API key auth
//! - `CPD_POOL_SIZE`, `CPD_INITIAL_POOL_SIZE`: Connection pool sizing
//! - `CPD_MAX_TOKEN_AGE_HOURS`, `CPD_MIN_AUTH_RETRY_SECS`: Token refresh policy
//! - `CPD_CONNECT_TIMEOUT_SECS`, `CPD_READ_TIMEOUT_SECS`: Transport timeouts
//! - `CPD_ACCEPT_INVALID_CERTS`: Accept self-signed certificates (true/false)
//! - `CPD_MAX_WORKERS`, `CPD_JOB_TIMEOUT_SECS`, `CPD_TOTAL_TIMEOUT_SECS`: Batch limits
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./cpdbatch.json` or `./cpdbatch.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use cpdbatch_domain::{AuthMode, BatchConfig, ClientConfig, Config, CpdError, Result};

/// Load configuration with automatic fallback strategy
///
/// Applies `.env` from the working directory if present, then attempts to
/// load from environment variables. If any required variables are missing,
/// falls back to loading from a config file.
///
/// # Errors
/// Returns `CpdError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing
pub fn load() -> Result<Config> {
    load_with_env(None)
}

/// Like [`load`], reading `env_file` instead of `.env` when given.
///
/// Exactly one env file is applied, so a `.env` in the working directory
/// never overrides an explicit one.
///
/// # Errors
/// Returns `CpdError::Config` if `env_file` cannot be read, or for the same
/// reasons as [`load`].
pub fn load_with_env(env_file: Option<&Path>) -> Result<Config> {
    match env_file {
        Some(path) => load_env_file(path)?,
        None => {
            if let Ok(path) = dotenvy::dotenv_override() {
                tracing::debug!(path = %path.display(), "applied .env file");
            }
        }
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Apply an explicit env file, overriding variables already set.
///
/// # Errors
/// Returns `CpdError::Config` if the file cannot be read or parsed.
pub fn load_env_file(path: &Path) -> Result<()> {
    dotenvy::from_path_override(path)
        .map_err(|e| CpdError::Config(format!("Failed to read env file {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "applied env file");
    Ok(())
}

/// Load configuration from environment variables
///
/// # Environment Variables
/// See module documentation for the complete list.
///
/// # Errors
/// Returns `CpdError::Config` if required variables are missing, optional
/// ones have invalid values, or the result fails validation.
pub fn load_from_env() -> Result<Config> {
    let defaults = ClientConfig::default();
    let auth_mode =
        std::env::var("AUTH_TYPE").map_or(AuthMode::Password, |v| AuthMode::from_auth_type(&v));

    let client = ClientConfig {
        host: env_var("CPD_HOST")?,
        username: env_any(&["CPD_USERNAME", "USERNAME"])
            .ok_or_else(|| {
                CpdError::Config("Missing required environment variable: USERNAME".into())
            })?,
        password: env_any(&["CPD_PASSWORD", "PASSWORD"]),
        api_key: env_any(&["CPD_API_KEY", "API_KEY"]),
        auth_mode,
        pool_size: env_parse("CPD_POOL_SIZE", defaults.pool_size)?,
        initial_pool_size: env_parse_opt("CPD_INITIAL_POOL_SIZE")?,
        max_token_age_hours: env_parse("CPD_MAX_TOKEN_AGE_HOURS", defaults.max_token_age_hours)?,
        min_auth_retry_secs: env_parse("CPD_MIN_AUTH_RETRY_SECS", defaults.min_auth_retry_secs)?,
        connect_timeout_secs: env_parse("CPD_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs)?,
        read_timeout_secs: env_parse("CPD_READ_TIMEOUT_SECS", defaults.read_timeout_secs)?,
        accept_invalid_certs: env_bool("CPD_ACCEPT_INVALID_CERTS", false),
        ..defaults
    };

    let batch_defaults = BatchConfig::default();
    let batch = BatchConfig {
        max_workers: env_parse("CPD_MAX_WORKERS", batch_defaults.max_workers)?,
        job_timeout_secs: env_parse("CPD_JOB_TIMEOUT_SECS", batch_defaults.job_timeout_secs)?,
        total_timeout_secs: env_parse("CPD_TOTAL_TIMEOUT_SECS", batch_defaults.total_timeout_secs)?,
        ..batch_defaults
    };

    let config = Config { client, batch, project_id: env_var("PROJECT_ID")? };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `CpdError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Required fields are missing
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CpdError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => find_config_file().ok_or_else(|| {
            CpdError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CpdError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `CpdError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CpdError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CpdError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CpdError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Search multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn find_config_file() -> Option<PathBuf> {
    const NAMES: [&str; 6] = [
        "config.json",
        "config.toml",
        "cpdbatch.json",
        "cpdbatch.toml",
        "../config.json",
        "../config.toml",
    ];

    let mut candidates = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(NAMES.iter().map(|name| cwd.join(name)));
    }
    let exe_dir = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf));
    if let Some(exe_dir) = exe_dir {
        candidates.extend(NAMES.iter().map(|name| exe_dir.join(name)));
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
///
/// # Errors
/// Returns `CpdError::Config` if the variable is not set or empty.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CpdError::Config(format!("Missing required environment variable: {key}")))
}

/// First non-empty value among `keys`.
fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_parse_opt(key)?.unwrap_or(default))
}

fn env_parse_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CpdError::Config(format!("Invalid value for {key}: {e}"))),
        _ => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
