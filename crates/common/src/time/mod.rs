//! Time abstractions
//!
//! The token manager measures credential age and auth-failure spacing through
//! [`Clock`], so tests can move time forward with [`MockClock`] instead of
//! sleeping.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use cpdbatch_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now() - start, Duration::from_secs(5));
//! ```

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
