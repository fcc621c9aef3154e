//! Bearer token lifecycle
//!
//! ```text
//! ┌──────────────────┐       ┌────────────────────┐
//! │   TokenManager   │──────►│  IdentityProvider  │  (POST /icp4d-api/v1/authorize)
//! └────────┬─────────┘       └────────────────────┘
//!          │
//!          └──► Credential (token, issued_at, last_auth_failure)
//! ```
//!
//! - **[`types`]**: the [`Credential`] value
//! - **[`traits`]**: the [`IdentityProvider`] seam and its error type
//! - **[`token_manager`]**: refresh policy and single-flight refresh

pub mod token_manager;
pub mod traits;
pub mod types;

pub use token_manager::{TokenManager, TokenManagerError};
pub use traits::{IdentityError, IdentityProvider};
pub use types::Credential;
