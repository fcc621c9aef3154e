//! `run` and `matrix` subcommands

use std::collections::HashSet;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use cpdbatch_core::catalog::build_matrix;
use cpdbatch_core::jobs::BatchScheduler;
use cpdbatch_domain::{Config, FlowJobMatrix};
use cpdbatch_infra::{config, CatalogApi, CpdClient, JobsApi};
use tracing::{info, warn};

use crate::cli::{ConfigArgs, MatrixArgs, RunArgs};
use crate::report::{write_csv, write_json, MatrixReport, RunReport};

const RUN_REPORT_PREFIX: &str = "dqr_jobs_run_summary";
const MATRIX_REPORT_PREFIX: &str = "dqr_flow_job_matrix";

fn load_config(args: &ConfigArgs) -> anyhow::Result<Config> {
    let loaded = match &args.config {
        Some(path) => {
            if let Some(env_file) = &args.env_file {
                config::load_env_file(env_file)?;
            }
            config::load_from_file(Some(path.clone()))?
        }
        None => config::load_with_env(args.env_file.as_deref())?,
    };
    Ok(loaded)
}

/// Connect, run `body`, and close the pool whatever the outcome.
async fn with_client<F, Fut, T>(config: &Config, body: F) -> anyhow::Result<T>
where
    F: FnOnce(Arc<CpdClient>) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let client = Arc::new(CpdClient::from_config(&config.client).context("creating CPD client")?);
    let outcome = tokio::select! {
        outcome = body(client.clone()) => outcome,
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            warn!("interrupted, shutting down");
            Err(anyhow::anyhow!("interrupted"))
        }
    };
    client.shutdown();
    outcome
}

pub async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let mut config = load_config(&args.config)?;
    if let Some(workers) = args.max_workers {
        config.batch.max_workers = usize::from(workers);
    }
    if args.job_ids.is_empty() && !args.discover {
        bail!("nothing to run: pass --job-id or --discover");
    }

    let output = args.config.output.clone();
    let project_id = config.project_id.clone();
    let batch_config = config.batch.clone();

    let (matrix, batch) = with_client(&config, |client| async move {
        let matrix = if args.discover {
            let catalog = CatalogApi::new(client.clone(), project_id.as_str());
            let matrix = build_matrix(&catalog, args.create_missing_jobs)
                .await
                .context("building job matrix")?;
            Some(matrix)
        } else {
            None
        };

        let job_ids = job_list(&args.job_ids, matrix.as_ref());
        if job_ids.is_empty() {
            bail!("no runnable jobs found");
        }
        info!(jobs = job_ids.len(), max_workers = batch_config.max_workers, "running jobs");

        let api = Arc::new(JobsApi::new(client, project_id.as_str()));
        let batch = BatchScheduler::new(api, &batch_config).run_all(&job_ids).await;
        Ok((matrix, batch))
    })
    .await?;

    let report = RunReport::new(&config.project_id, &batch, matrix.as_ref());
    let path = write_json(&output, RUN_REPORT_PREFIX, report.generated_at, &report)?;
    let csv_path = write_csv(&output, RUN_REPORT_PREFIX, report.generated_at, &report.jobs)?;
    info!(
        path = %path.display(),
        csv = %csv_path.display(),
        total = batch.summary.total_jobs,
        completed = batch.summary.completed_jobs,
        failed = batch.summary.failed_jobs,
        success_rate = %format_args!("{:.1}%", batch.summary.success_rate),
        "report written"
    );
    for failed in report.jobs.iter().filter(|j| !j.success) {
        warn!(
            job_id = %failed.job_id,
            job_name = %failed.job_name,
            state = %failed.state,
            error = %failed.error,
            "job did not succeed"
        );
    }

    Ok(if batch.summary.failed_jobs == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

pub async fn matrix(args: MatrixArgs) -> anyhow::Result<ExitCode> {
    let config = load_config(&args.config)?;
    let project_id = config.project_id.clone();
    let create = args.create_missing_jobs;

    let matrix = with_client(&config, |client| async move {
        let catalog = CatalogApi::new(client, project_id.as_str());
        build_matrix(&catalog, create).await.context("building job matrix")
    })
    .await?;

    log_matrix(&matrix);
    let report = MatrixReport::new(&config.project_id, &matrix);
    let output = Path::new(&args.config.output);
    let path = write_json(output, MATRIX_REPORT_PREFIX, Utc::now(), &report)?;
    info!(path = %path.display(), "matrix written");
    Ok(ExitCode::SUCCESS)
}

/// Explicit ids first, then matrix jobs, without duplicates.
fn job_list(explicit: &[String], matrix: Option<&FlowJobMatrix>) -> Vec<String> {
    let discovered = matrix.map(FlowJobMatrix::runnable_jobs).unwrap_or_default();
    let mut seen = HashSet::new();
    explicit.iter().cloned().chain(discovered).filter(|id| seen.insert(id.clone())).collect()
}

fn log_matrix(matrix: &FlowJobMatrix) {
    for flow in &matrix.flows {
        info!(
            status = flow.status_label(),
            flow = %flow.flow_name,
            dqr = flow.dqr_name.as_deref().unwrap_or("-"),
            job = flow.job_name.as_deref().unwrap_or("-"),
            "flow"
        );
    }
    let totals = matrix.totals();
    info!(
        total_flows = totals.total_flows,
        flows_with_dqr = totals.flows_with_dqr,
        flows_with_jobs = totals.flows_with_jobs,
        complete_chains = totals.complete_chains,
        missing_jobs = totals.missing_jobs,
        coverage = %format_args!("{:.1}%", totals.coverage_percent),
        jobs_created = totals.jobs_created,
        job_creation_failures = totals.job_creation_failures,
        "matrix totals"
    );
}

#[cfg(test)]
mod tests {
    use cpdbatch_domain::FlowEntry;

    use super::*;

    fn entry(flow_id: &str, job_id: Option<&str>) -> FlowEntry {
        FlowEntry {
            flow_id: flow_id.into(),
            job_id: job_id.map(str::to_string),
            ..FlowEntry::default()
        }
    }

    #[test]
    fn job_list_merges_without_duplicates() {
        let matrix = FlowJobMatrix {
            flows: vec![
                entry("f1", Some("job-2")),
                entry("f2", Some("job-3")),
                entry("f3", None),
            ],
            job_creations: Vec::new(),
        };
        let explicit = vec!["job-1".to_string(), "job-2".to_string()];

        assert_eq!(job_list(&explicit, Some(&matrix)), vec!["job-1", "job-2", "job-3"]);
        assert_eq!(job_list(&explicit, None), explicit);
    }
}
