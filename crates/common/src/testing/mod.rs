//! Testing utilities and helpers
//!
//! - **[`mocks`]**: Mock implementations of common traits
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "test-utils")]
//! # {
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cpdbatch_common::auth::TokenManager;
//! use cpdbatch_common::testing::{MockClock, MockIdentityProvider};
//!
//! let clock = MockClock::new();
//! let provider = Arc::new(MockIdentityProvider::new());
//! let manager = TokenManager::new(provider, Duration::from_secs(3600), Duration::from_secs(60))
//!     .with_clock(Arc::new(clock.clone()));
//! clock.advance(Duration::from_secs(5));
//! # drop(manager);
//! # }
//! ```

pub mod mocks;

pub use mocks::{ConcurrencyGauge, GaugeGuard, MockIdentityProvider};

pub use crate::time::{Clock, MockClock, SystemClock};
