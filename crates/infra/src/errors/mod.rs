//! Error conversions from transport failures into the HTTP error and the
//! error types of the core ports.

pub mod conversions;
