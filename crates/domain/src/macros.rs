//! Macro for implementing Display and FromStr for status enums
//!
//! Remote services report states as free-form strings. The macro maps the
//! known spellings onto unit variants and keeps anything else in a fallback
//! tuple variant, so parsing never fails and unknown states survive a round
//! trip unchanged.
//!
//! # Example
//!
//! ```rust
//! use cpdbatch_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, PartialEq, Eq)]
//! pub enum RunStatus {
//!     Queued,
//!     Running,
//!     Other(String),
//! }
//!
//! impl_domain_status_conversions!(RunStatus {
//!     Queued => "Queued",
//!     Running => "Running",
//! } else Other);
//!
//! assert_eq!("running".parse::<RunStatus>().unwrap(), RunStatus::Running);
//! assert_eq!(RunStatus::Other("Paused".into()).to_string(), "Paused");
//! ```

/// Implements Display and FromStr traits for status enums
///
/// This macro generates:
/// - Display trait: writes the canonical spelling of each variant, or the raw
///   string carried by the fallback variant
/// - FromStr trait: case-insensitive match on the canonical spellings, with
///   unknown input captured by the fallback variant
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? } else $fallback:ident) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                    Self::$fallback(raw) => f.write_str(raw),
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                $(
                    if trimmed.eq_ignore_ascii_case($str) {
                        return Ok(Self::$variant);
                    }
                )+
                Ok(Self::$fallback(trimmed.to_string()))
            }
        }
    };
}
