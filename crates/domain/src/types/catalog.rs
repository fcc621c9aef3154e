//! DQR -> flow -> job matrix records.

use serde::{Deserialize, Serialize};

use super::summary::JobContext;

/// One data integration flow with the rule that uses it and the job that runs it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub flow_id: String,
    pub flow_name: String,
    pub dqr_id: Option<String>,
    pub dqr_name: Option<String>,
    pub job_id: Option<String>,
    pub job_name: Option<String>,
}

impl FlowEntry {
    pub fn has_job(&self) -> bool {
        self.job_id.is_some()
    }

    pub fn has_dqr(&self) -> bool {
        self.dqr_id.is_some()
    }

    /// `COMPLETE CHAIN`, `NO DQR` or `MISSING JOB`.
    pub fn status_label(&self) -> &'static str {
        match (self.has_dqr(), self.has_job()) {
            (true, true) => "COMPLETE CHAIN",
            (false, true) => "NO DQR",
            _ => "MISSING JOB",
        }
    }

    pub fn context(&self) -> JobContext {
        JobContext {
            dqr_id: self.dqr_id.clone().unwrap_or_default(),
            dqr_name: self.dqr_name.clone().unwrap_or_default(),
            flow_id: self.flow_id.clone(),
            flow_name: self.flow_name.clone(),
            job_id: self.job_id.clone().unwrap_or_default(),
            job_name: self.job_name.clone().unwrap_or_default(),
        }
    }
}

/// Outcome of creating a job for a flow that had none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCreation {
    pub flow_id: String,
    pub flow_name: String,
    pub job_name: String,
    pub job_id: Option<String>,
    pub error: Option<String>,
}

impl JobCreation {
    pub fn success(&self) -> bool {
        self.job_id.is_some()
    }
}

/// Counters reported alongside the matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixTotals {
    pub total_flows: usize,
    pub flows_with_jobs: usize,
    pub flows_with_dqr: usize,
    pub complete_chains: usize,
    pub missing_jobs: usize,
    pub coverage_percent: f64,
    pub jobs_created: usize,
    pub job_creation_failures: usize,
}

/// Flows in listing order plus any job creation attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowJobMatrix {
    pub flows: Vec<FlowEntry>,
    pub job_creations: Vec<JobCreation>,
}

impl FlowJobMatrix {
    #[allow(clippy::cast_precision_loss)]
    pub fn totals(&self) -> MatrixTotals {
        let total_flows = self.flows.len();
        let flows_with_jobs = self.flows.iter().filter(|f| f.has_job()).count();
        let jobs_created = self.job_creations.iter().filter(|c| c.success()).count();
        MatrixTotals {
            total_flows,
            flows_with_jobs,
            flows_with_dqr: self.flows.iter().filter(|f| f.has_dqr()).count(),
            complete_chains: self.flows.iter().filter(|f| f.has_dqr() && f.has_job()).count(),
            missing_jobs: total_flows - flows_with_jobs,
            coverage_percent: if total_flows == 0 {
                0.0
            } else {
                flows_with_jobs as f64 / total_flows as f64 * 100.0
            },
            jobs_created,
            job_creation_failures: self.job_creations.len() - jobs_created,
        }
    }

    /// Job ids of every flow that has a job, in flow order.
    pub fn runnable_jobs(&self) -> Vec<String> {
        self.flows.iter().filter_map(|f| f.job_id.clone()).collect()
    }

    pub fn context_for(&self, job_id: &str) -> Option<JobContext> {
        self.flows
            .iter()
            .find(|f| f.job_id.as_deref() == Some(job_id))
            .map(FlowEntry::context)
    }
}
