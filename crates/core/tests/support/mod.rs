//! Shared test helpers for `cpdbatch-core` integration tests.
//!
//! These helpers provide scripted service doubles so that batch tests can
//! focus on scheduling behaviour instead of boilerplate.

pub mod jobs;
