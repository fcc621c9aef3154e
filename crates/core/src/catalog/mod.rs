//! Catalog discovery: which flows have jobs and which rules use them

pub mod matrix;
pub mod ports;

pub use matrix::build_matrix;
pub use ports::{AssetSummary, CatalogError, JobCatalog};
