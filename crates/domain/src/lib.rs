//! # cpdbatch Domain
//!
//! Business domain types and models for cpdbatch.
//!
//! This crate contains:
//! - Domain error types and Result definitions
//! - Configuration structures (client, retry, batch)
//! - Job state machine, run timing and batch summary types
//! - DQR -> flow -> job matrix records
//!
//! ## Architecture
//! - No dependencies on other cpdbatch crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
pub use utils::format::{format_duration, format_timestamp};
