//! # cpdbatch Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - HTTP connection pool and authenticated request executor
//! - CPD endpoint clients (identity, job runs, catalog)
//! - Configuration loading (environment, `.env`, TOML/JSON files)
//! - Conversions from transport errors into HTTP and port errors
//!
//! ## Architecture
//! - Implements traits defined in `cpdbatch-core` and `cpdbatch-common`
//! - Depends on `cpdbatch-domain`, `cpdbatch-common` and `cpdbatch-core`
//! - Contains all "impure" code (network and file I/O)

pub mod api;
pub mod config;
pub mod errors;
pub mod http;

// Re-export commonly used items
pub use api::{CatalogApi, CpdIdentityProvider, JobsApi};
pub use http::{ApiResponse, ConnectionPool, CpdClient, HttpError, PoolError};
