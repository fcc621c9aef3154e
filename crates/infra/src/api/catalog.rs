//! Catalog search, asset lookups and job creation for one project

use std::sync::Arc;

use async_trait::async_trait;
use cpdbatch_core::catalog::{AssetSummary, CatalogError, JobCatalog};
use cpdbatch_domain::constants::{DEFAULT_JOB_NAME_SUFFIX, SEARCH_PAGE_LIMIT};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::http::{ApiResponse, CpdClient};

#[derive(Debug, Default, Deserialize)]
struct AssetMetadata {
    asset_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    metadata: AssetMetadata,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<SearchResult>,
    /// Request body for the following page
    next: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    asset_id: String,
}

#[derive(Debug, Deserialize)]
struct Relationships {
    #[serde(default)]
    total_rows: u64,
    #[serde(default)]
    resources: Vec<Relationship>,
}

/// Catalog operations scoped to one project.
#[derive(Debug, Clone)]
pub struct CatalogApi {
    client: Arc<CpdClient>,
    project_id: String,
}

impl CatalogApi {
    pub fn new(client: Arc<CpdClient>, project_id: impl Into<String>) -> Self {
        Self { client, project_id: project_id.into() }
    }

    fn project(&self) -> (&'static str, &str) {
        ("project_id", self.project_id.as_str())
    }
}

fn expect_status(response: &ApiResponse, expected: u16) -> Result<(), CatalogError> {
    if response.status().as_u16() == expected {
        Ok(())
    } else {
        Err(CatalogError::Status { status: response.status().as_u16(), body: response.text() })
    }
}

#[async_trait]
impl JobCatalog for CatalogApi {
    #[instrument(skip(self), fields(project_id = %self.project_id))]
    async fn list_assets(
        &self,
        asset_type: &str,
        query: &str,
    ) -> Result<Vec<AssetSummary>, CatalogError> {
        let path = format!("/v2/asset_types/{asset_type}/search");
        let params = [self.project(), ("hide_deprecated_response_fields", "true")];
        let mut payload = json!({ "query": query, "limit": SEARCH_PAGE_LIMIT });
        let mut assets = Vec::new();
        let mut pages = 0_usize;

        loop {
            let response = self.client.post(&path, &payload, &params).await?;
            expect_status(&response, 200)?;
            let page: SearchPage = response.json()?;
            pages += 1;

            assets.extend(page.results.into_iter().filter_map(|r| {
                let AssetMetadata { asset_id, name } = r.metadata;
                asset_id.map(|asset_id| AssetSummary { asset_id, name: name.unwrap_or_default() })
            }));

            match page.next {
                Some(next) if !next.is_null() => payload = next,
                _ => break,
            }
        }

        debug!(count = assets.len(), pages, "search complete");
        Ok(assets)
    }

    #[instrument(skip(self), fields(project_id = %self.project_id))]
    async fn job_flow_ref(&self, job_id: &str) -> Result<String, CatalogError> {
        let params = [
            self.project(),
            ("allow_metadata_on_dpr_deny", "true"),
            ("hide_deprecated_response_fields", "true"),
        ];
        let response = self.client.get(&format!("/v2/assets/{job_id}"), &params).await?;
        expect_status(&response, 200)?;

        let asset: Value = response.json()?;
        asset
            .pointer("/entity/job/asset_ref")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                CatalogError::InvalidResponse(format!("job {job_id} has no entity.job.asset_ref"))
            })
    }

    #[instrument(skip(self), fields(project_id = %self.project_id))]
    async fn rule_using_flow(&self, flow_id: &str) -> Result<Option<String>, CatalogError> {
        let params = [
            ("asset_id", flow_id),
            self.project(),
            ("related_asset_types", "data_rule"),
            ("relationship_names", "uses"),
            ("limit", "1"),
        ];
        let response = self
            .client
            .execute(Method::POST, "/v2/assets/get_relationships", None, &params)
            .await?;
        expect_status(&response, 200)?;

        let relationships: Relationships = response.json()?;
        if relationships.total_rows == 0 {
            return Ok(None);
        }
        Ok(relationships.resources.into_iter().next().map(|r| r.asset_id))
    }

    #[instrument(skip(self), fields(project_id = %self.project_id))]
    async fn job_name_suffix(&self) -> Result<String, CatalogError> {
        let response =
            self.client.get("/data_intg/v3/assets/datastage_settings", &[self.project()]).await?;
        expect_status(&response, 200)?;

        let settings: Value = response.json()?;
        let suffix = settings
            .pointer("/entity/project/jobNameSuffix")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_JOB_NAME_SUFFIX)
            .to_string();
        debug!(suffix = %suffix, "read datastage settings");
        Ok(suffix)
    }

    #[instrument(skip(self), fields(project_id = %self.project_id))]
    async fn create_job(&self, flow_id: &str, job_name: &str) -> Result<String, CatalogError> {
        let body = json!({
            "job": {
                "name": job_name,
                "asset_ref": flow_id,
                "configuration": {}
            }
        });
        let response = self.client.post("/v2/jobs", &body, &[self.project()]).await?;
        expect_status(&response, 201)?;

        let created: Value = response.json()?;
        let job_id = created
            .pointer("/metadata/asset_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                CatalogError::InvalidResponse("created job has no metadata.asset_id".into())
            })?;
        info!(job_id = %job_id, job_name, "created job");
        Ok(job_id)
    }
}
