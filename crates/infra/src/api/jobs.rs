//! DataStage job run endpoints (`/v2/jobs/{job_id}/runs`)

use std::sync::Arc;

use async_trait::async_trait;
use cpdbatch_core::jobs::{JobApiError, JobRunApi};
use cpdbatch_domain::{JobState, RunInfo, SubmittedRun};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::http::{ApiResponse, CpdClient};

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    asset_id: Option<String>,
    created: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct JobRunEntity {
    state: Option<String>,
    job_name: Option<String>,
    job_ref: Option<String>,
    queue_start: Option<i64>,
    queue_end: Option<i64>,
    execution_start: Option<i64>,
    execution_end: Option<i64>,
    duration: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Entity {
    #[serde(default)]
    job_run: JobRunEntity,
}

#[derive(Debug, Deserialize)]
struct JobRunEnvelope {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    entity: Entity,
}

/// Job run operations scoped to one project.
#[derive(Debug, Clone)]
pub struct JobsApi {
    client: Arc<CpdClient>,
    project_id: String,
}

impl JobsApi {
    pub fn new(client: Arc<CpdClient>, project_id: impl Into<String>) -> Self {
        Self { client, project_id: project_id.into() }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

fn expect_status(response: &ApiResponse, expected: u16) -> Result<(), JobApiError> {
    if response.status().as_u16() == expected {
        Ok(())
    } else {
        Err(JobApiError::Status { status: response.status().as_u16(), body: response.text() })
    }
}

#[async_trait]
impl JobRunApi for JobsApi {
    #[instrument(skip(self), fields(project_id = %self.project_id))]
    async fn submit_run(&self, job_id: &str, run_name: &str) -> Result<SubmittedRun, JobApiError> {
        let body = json!({ "job_run": { "name": run_name } });
        let path = format!("/v2/jobs/{job_id}/runs");
        let response =
            self.client.post(&path, &body, &[("project_id", self.project_id.as_str())]).await?;
        expect_status(&response, 201)?;

        let envelope: JobRunEnvelope = response.json()?;
        let run_id = envelope
            .metadata
            .asset_id
            .ok_or_else(|| {
                JobApiError::InvalidResponse("run response has no metadata.asset_id".into())
            })?;
        let run = envelope.entity.job_run;
        debug!(run_id = %run_id, state = ?run.state, "job run created");

        Ok(SubmittedRun {
            run_id,
            job_name: run.job_name,
            state: run.state.as_deref().map_or(JobState::Starting, JobState::from),
            job_ref: run.job_ref,
        })
    }

    #[instrument(skip(self), fields(project_id = %self.project_id))]
    async fn get_run(&self, job_id: &str, run_id: &str) -> Result<RunInfo, JobApiError> {
        let path = format!("/v2/jobs/{job_id}/runs/{run_id}");
        let response = self.client.get(&path, &[("project_id", self.project_id.as_str())]).await?;
        expect_status(&response, 200)?;

        let envelope: JobRunEnvelope = response.json()?;
        let run = envelope.entity.job_run;
        Ok(RunInfo {
            run_id: run_id.to_string(),
            job_id: job_id.to_string(),
            job_name: run.job_name,
            state: run.state,
            created: envelope.metadata.created,
            queue_start: run.queue_start,
            queue_end: run.queue_end,
            execution_start: run.execution_start,
            execution_end: run.execution_end,
            duration: run.duration,
        })
    }
}
