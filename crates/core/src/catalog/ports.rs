//! Port interfaces for catalog lookups and job creation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a catalog call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("client error: {0}")]
    Client(String),
}

/// Identity of an asset returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub asset_id: String,
    pub name: String,
}

/// Asset types searched when building the matrix.
pub mod asset_types {
    pub const DATA_RULE: &str = "data_rule";
    pub const DATA_INTG_FLOW: &str = "data_intg_flow";
    pub const JOB: &str = "job";
}

/// Search queries paired with [`asset_types`].
pub mod queries {
    pub const ALL: &str = "*:*";
    pub const DATASTAGE_JOBS: &str = "job.asset_ref_type:data_intg_flow";
}

/// Trait for project catalog operations
#[async_trait]
pub trait JobCatalog: Send + Sync {
    /// Every asset of `asset_type` matching `query`, across all result pages.
    async fn list_assets(
        &self,
        asset_type: &str,
        query: &str,
    ) -> Result<Vec<AssetSummary>, CatalogError>;

    /// Id of the flow a job runs (`entity.job.asset_ref`).
    async fn job_flow_ref(&self, job_id: &str) -> Result<String, CatalogError>;

    /// Id of the first data rule that `uses` the flow, if any.
    async fn rule_using_flow(&self, flow_id: &str) -> Result<Option<String>, CatalogError>;

    /// Project-level suffix appended to generated job names.
    async fn job_name_suffix(&self) -> Result<String, CatalogError>;

    /// Create a job running `flow_id` and return its id.
    async fn create_job(&self, flow_id: &str, job_name: &str) -> Result<String, CatalogError>;
}
