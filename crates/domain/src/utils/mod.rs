//! Utility helpers for rendering domain values.

pub mod format;
