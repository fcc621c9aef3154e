//! Builds the data rule -> flow -> job matrix of a project
//!
//! Listing failures abort the build. Per-asset lookups that fail are logged
//! and treated as "no link": a job whose flow cannot be resolved is skipped,
//! a flow whose rule lookup fails has no rule.

use std::collections::HashMap;

use cpdbatch_domain::constants::DEFAULT_JOB_NAME_SUFFIX;
use cpdbatch_domain::{FlowEntry, FlowJobMatrix, JobCreation};
use tracing::{debug, info, instrument, warn};

use super::ports::{asset_types, queries, CatalogError, JobCatalog};

/// Discover every flow of the project with its rule and job.
///
/// With `create_missing_jobs`, a job named `{flow_name}{suffix}` is created
/// for each flow without one and the flow entry is updated on success.
///
/// # Errors
/// Returns the first failure from listing rules, flows or jobs.
#[instrument(skip(catalog))]
pub async fn build_matrix(
    catalog: &dyn JobCatalog,
    create_missing_jobs: bool,
) -> Result<FlowJobMatrix, CatalogError> {
    let rules = catalog.list_assets(asset_types::DATA_RULE, queries::ALL).await?;
    let flows = catalog.list_assets(asset_types::DATA_INTG_FLOW, queries::ALL).await?;
    let jobs = catalog.list_assets(asset_types::JOB, queries::DATASTAGE_JOBS).await?;
    info!(rules = rules.len(), flows = flows.len(), jobs = jobs.len(), "listed catalog assets");

    let rule_names: HashMap<&str, &str> =
        rules.iter().map(|r| (r.asset_id.as_str(), r.name.as_str())).collect();

    let mut flow_to_job: HashMap<String, (String, String)> = HashMap::with_capacity(jobs.len());
    for job in &jobs {
        match catalog.job_flow_ref(&job.asset_id).await {
            Ok(flow_id) => {
                flow_to_job.insert(flow_id, (job.asset_id.clone(), job.name.clone()));
            }
            Err(err) => warn!(
                job_id = %job.asset_id,
                job_name = %job.name,
                error = %err,
                "could not resolve job flow"
            ),
        }
    }
    debug!(mapped = flow_to_job.len(), "mapped flows to jobs");

    let mut entries = Vec::with_capacity(flows.len());
    for flow in &flows {
        let mut entry = FlowEntry {
            flow_id: flow.asset_id.clone(),
            flow_name: flow.name.clone(),
            ..FlowEntry::default()
        };

        match catalog.rule_using_flow(&flow.asset_id).await {
            Ok(Some(rule_id)) => {
                if let Some(name) = rule_names.get(rule_id.as_str()) {
                    entry.dqr_name = Some((*name).to_string());
                    entry.dqr_id = Some(rule_id);
                }
            }
            Ok(None) => {}
            Err(err) => debug!(
                flow_id = %flow.asset_id,
                error = %err,
                "rule lookup failed, treating flow as unruled"
            ),
        }

        if let Some((job_id, job_name)) = flow_to_job.remove(&flow.asset_id) {
            entry.job_id = Some(job_id);
            entry.job_name = Some(job_name);
        }
        entries.push(entry);
    }

    let mut matrix = FlowJobMatrix { flows: entries, job_creations: Vec::new() };
    let missing = matrix.flows.iter().filter(|f| !f.has_job()).count();

    if create_missing_jobs && missing > 0 {
        let suffix = match catalog.job_name_suffix().await {
            Ok(suffix) => suffix,
            Err(err) => {
                warn!(error = %err, "could not read job name suffix, using default");
                DEFAULT_JOB_NAME_SUFFIX.to_string()
            }
        };
        info!(missing, suffix = %suffix, "creating missing jobs");
        create_jobs(catalog, &mut matrix, &suffix).await;
    } else if missing > 0 {
        info!(missing, "flows without jobs left as is");
    }

    let totals = matrix.totals();
    info!(
        total_flows = totals.total_flows,
        flows_with_jobs = totals.flows_with_jobs,
        complete_chains = totals.complete_chains,
        coverage_percent = totals.coverage_percent,
        "matrix built"
    );
    Ok(matrix)
}

async fn create_jobs(catalog: &dyn JobCatalog, matrix: &mut FlowJobMatrix, suffix: &str) {
    for entry in matrix.flows.iter_mut().filter(|f| !f.has_job()) {
        let job_name = format!("{}{suffix}", entry.flow_name);
        let outcome = catalog.create_job(&entry.flow_id, &job_name).await;
        let creation = match outcome {
            Ok(job_id) => {
                info!(
                    flow_id = %entry.flow_id,
                    job_id = %job_id,
                    job_name = %job_name,
                    "job created"
                );
                entry.job_id = Some(job_id.clone());
                entry.job_name = Some(job_name.clone());
                JobCreation {
                    flow_id: entry.flow_id.clone(),
                    flow_name: entry.flow_name.clone(),
                    job_name,
                    job_id: Some(job_id),
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    flow_id = %entry.flow_id,
                    job_name = %job_name,
                    error = %err,
                    "job creation failed"
                );
                JobCreation {
                    flow_id: entry.flow_id.clone(),
                    flow_name: entry.flow_name.clone(),
                    job_name,
                    job_id: None,
                    error: Some(err.to_string()),
                }
            }
        };
        matrix.job_creations.push(creation);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::super::ports::AssetSummary;
    use super::*;

    /// In-memory project: rules, flows, jobs keyed to flows, rule links.
    #[derive(Default)]
    struct FakeCatalog {
        rules: Vec<AssetSummary>,
        flows: Vec<AssetSummary>,
        jobs: Vec<(AssetSummary, Option<String>)>,
        links: HashMap<String, String>,
        suffix: Option<String>,
        fail_creation_for: Option<String>,
        created: Mutex<Vec<(String, String)>>,
    }

    fn asset(id: &str, name: &str) -> AssetSummary {
        AssetSummary { asset_id: id.into(), name: name.into() }
    }

    #[async_trait]
    impl JobCatalog for FakeCatalog {
        async fn list_assets(
            &self,
            asset_type: &str,
            _query: &str,
        ) -> Result<Vec<AssetSummary>, CatalogError> {
            Ok(match asset_type {
                asset_types::DATA_RULE => self.rules.clone(),
                asset_types::DATA_INTG_FLOW => self.flows.clone(),
                _ => self.jobs.iter().map(|(a, _)| a.clone()).collect(),
            })
        }

        async fn job_flow_ref(&self, job_id: &str) -> Result<String, CatalogError> {
            self.jobs
                .iter()
                .find(|(a, _)| a.asset_id == job_id)
                .and_then(|(_, flow)| flow.clone())
                .ok_or_else(|| CatalogError::Status { status: 404, body: job_id.into() })
        }

        async fn rule_using_flow(&self, flow_id: &str) -> Result<Option<String>, CatalogError> {
            if flow_id == "flow-broken" {
                return Err(CatalogError::Transport("reset".into()));
            }
            Ok(self.links.get(flow_id).cloned())
        }

        async fn job_name_suffix(&self) -> Result<String, CatalogError> {
            self.suffix
                .clone()
                .ok_or_else(|| CatalogError::Status { status: 500, body: String::new() })
        }

        async fn create_job(&self, flow_id: &str, job_name: &str) -> Result<String, CatalogError> {
            if self.fail_creation_for.as_deref() == Some(flow_id) {
                return Err(CatalogError::Status { status: 403, body: "forbidden".into() });
            }
            self.created.lock().push((flow_id.to_string(), job_name.to_string()));
            Ok(format!("new-{flow_id}"))
        }
    }

    fn project() -> FakeCatalog {
        FakeCatalog {
            rules: vec![asset("rule-1", "Null check")],
            flows: vec![
                asset("flow-1", "orders"),
                asset("flow-2", "customers"),
                asset("flow-3", "invoices"),
                asset("flow-broken", "lost"),
            ],
            jobs: vec![
                (asset("job-1", "orders.DataStage job"), Some("flow-1".into())),
                (asset("job-2", "customers.DataStage job"), Some("flow-2".into())),
                (asset("job-x", "dangling"), None),
            ],
            links: HashMap::from([
                ("flow-1".to_string(), "rule-1".to_string()),
                ("flow-3".to_string(), "rule-unknown".to_string()),
            ]),
            ..FakeCatalog::default()
        }
    }

    #[tokio::test]
    async fn test_links_rules_flows_and_jobs() {
        let catalog = project();
        let matrix = build_matrix(&catalog, false).await.unwrap();

        assert_eq!(matrix.flows.len(), 4);
        let orders = &matrix.flows[0];
        assert_eq!(orders.job_id.as_deref(), Some("job-1"));
        assert_eq!(orders.dqr_name.as_deref(), Some("Null check"));
        assert_eq!(orders.status_label(), "COMPLETE CHAIN");
        assert_eq!(matrix.flows[1].status_label(), "NO DQR");
        // Rules not in the rule listing are ignored.
        assert!(matrix.flows[2].dqr_id.is_none());

        let totals = matrix.totals();
        assert_eq!(totals.flows_with_jobs, 2);
        assert_eq!(totals.complete_chains, 1);
        assert_eq!(totals.missing_jobs, 2);
        assert!(matrix.job_creations.is_empty());
        assert!(catalog.created.lock().is_empty());
        assert_eq!(matrix.runnable_jobs(), vec!["job-1".to_string(), "job-2".to_string()]);
    }

    #[tokio::test]
    async fn test_creates_missing_jobs_with_project_suffix() {
        let catalog = FakeCatalog {
            suffix: Some(" job".into()),
            fail_creation_for: Some("flow-broken".into()),
            ..project()
        };
        let matrix = build_matrix(&catalog, true).await.unwrap();

        let created = vec![("flow-3".to_string(), "invoices job".to_string())];
        assert_eq!(*catalog.created.lock(), created);
        assert_eq!(matrix.flows[2].job_id.as_deref(), Some("new-flow-3"));
        assert!(matrix.flows[3].job_id.is_none());

        let totals = matrix.totals();
        assert_eq!(totals.jobs_created, 1);
        assert_eq!(totals.job_creation_failures, 1);
        assert_eq!(totals.flows_with_jobs, 3);
    }

    #[tokio::test]
    async fn test_suffix_lookup_failure_uses_default() {
        let catalog = project();
        let matrix = build_matrix(&catalog, true).await.unwrap();

        assert_eq!(matrix.job_creations[0].job_name, format!("invoices{DEFAULT_JOB_NAME_SUFFIX}"));
    }
}
