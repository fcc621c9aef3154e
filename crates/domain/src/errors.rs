//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for cpdbatch
///
/// Remote failures have their own error types at the ports; this enum covers
/// what the application itself rejects.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
#[non_exhaustive]
pub enum CpdError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for cpdbatch operations
pub type Result<T> = std::result::Result<T, CpdError>;
