//! Report files written under the output directory: JSON documents and the
//! per-job CSV summary.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use cpdbatch_domain::{BatchResult, BatchSummary, FlowJobMatrix, JobSummary, MatrixTotals};
use serde::Serialize;

/// Summary of one batch run.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub project_id: &'a str,
    pub summary: &'a BatchSummary,
    pub jobs: Vec<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix: Option<MatrixTotals>,
}

impl<'a> RunReport<'a> {
    /// Job records carry the rule and flow of each job when `matrix` is known.
    pub fn new(
        project_id: &'a str,
        batch: &'a BatchResult,
        matrix: Option<&FlowJobMatrix>,
    ) -> Self {
        let jobs = batch
            .results
            .iter()
            .map(|result| {
                let context = matrix.and_then(|m| m.context_for(&result.job_id));
                JobSummary::from_result(result, context.as_ref())
            })
            .collect();
        Self {
            generated_at: Utc::now(),
            project_id,
            summary: &batch.summary,
            jobs,
            matrix: matrix.map(FlowJobMatrix::totals),
        }
    }
}

/// Matrix listing with totals.
#[derive(Debug, Serialize)]
pub struct MatrixReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub project_id: &'a str,
    pub totals: MatrixTotals,
    #[serde(flatten)]
    pub matrix: &'a FlowJobMatrix,
}

impl<'a> MatrixReport<'a> {
    pub fn new(project_id: &'a str, matrix: &'a FlowJobMatrix) -> Self {
        Self { generated_at: Utc::now(), project_id, totals: matrix.totals(), matrix }
    }
}

/// Column order of the CSV summary, one per [`JobSummary`] field.
pub const CSV_COLUMNS: [&str; 18] = [
    "dqr_id",
    "dqr_name",
    "flow_id",
    "flow_name",
    "job_id",
    "job_name",
    "run_id",
    "state",
    "success",
    "created",
    "queue_start",
    "queue_end",
    "execution_start",
    "execution_end",
    "total_duration",
    "queue_duration",
    "execution_duration",
    "error",
];

/// Write `value` as pretty JSON to `{dir}/{prefix}_{timestamp}.json`,
/// creating `dir` if needed.
///
/// # Errors
/// Fails if the directory cannot be created or the file cannot be written.
pub fn write_json<T: Serialize>(
    dir: &Path,
    prefix: &str,
    at: DateTime<Utc>,
    value: &T,
) -> anyhow::Result<PathBuf> {
    let path = timestamped_path(dir, prefix, at, "json")?;
    let body = serde_json::to_vec_pretty(value).context("serializing report")?;
    std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Write one CSV row per job to `{dir}/{prefix}_{timestamp}.csv`.
///
/// Fields holding a comma, quote or line break are quoted; rows end with
/// CRLF.
///
/// # Errors
/// Fails if the directory cannot be created or the file cannot be written.
pub fn write_csv(
    dir: &Path,
    prefix: &str,
    at: DateTime<Utc>,
    jobs: &[JobSummary],
) -> anyhow::Result<PathBuf> {
    let path = timestamped_path(dir, prefix, at, "csv")?;
    let mut body = csv_line(CSV_COLUMNS.iter().copied());
    for job in jobs {
        body.push_str(&csv_line(csv_fields(job).iter().map(String::as_str)));
    }
    std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn timestamped_path(
    dir: &Path,
    prefix: &str,
    at: DateTime<Utc>,
    extension: &str,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;
    Ok(dir.join(format!("{prefix}_{}.{extension}", at.format("%Y%m%d_%H%M%S"))))
}

fn csv_fields(job: &JobSummary) -> [String; 18] {
    [
        job.dqr_id.clone(),
        job.dqr_name.clone(),
        job.flow_id.clone(),
        job.flow_name.clone(),
        job.job_id.clone(),
        job.job_name.clone(),
        job.run_id.clone(),
        job.state.clone(),
        job.success.to_string(),
        job.created.clone(),
        job.queue_start.clone(),
        job.queue_end.clone(),
        job.execution_start.clone(),
        job.execution_end.clone(),
        job.total_duration.clone(),
        job.queue_duration.clone(),
        job.execution_duration.clone(),
        job.error.clone(),
    ]
}

fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(csv_escape).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

fn csv_escape(field: &str) -> String {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
