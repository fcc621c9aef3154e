//! Identity endpoint abstraction
//!
//! The token manager only needs "give me a fresh bearer token". The HTTP
//! implementation lives in `cpdbatch-infra`; tests use
//! [`MockIdentityProvider`](crate::testing::MockIdentityProvider).

use async_trait::async_trait;
use thiserror::Error;

/// Failure to obtain a token from the identity endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The endpoint answered but refused the supplied credentials
    #[error("identity endpoint rejected credentials (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("identity endpoint unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered 200 without a usable token
    #[error("invalid identity response: {0}")]
    InvalidResponse(String),
}

/// Source of bearer tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange the configured credentials for a bearer token.
    ///
    /// # Errors
    /// Returns [`IdentityError`] if the endpoint rejects the credentials, is
    /// unreachable, or returns no token.
    async fn authorize(&self) -> Result<String, IdentityError>;
}

#[async_trait]
impl<T: IdentityProvider + ?Sized> IdentityProvider for std::sync::Arc<T> {
    async fn authorize(&self) -> Result<String, IdentityError> {
        (**self).authorize().await
    }
}
