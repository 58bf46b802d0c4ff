//! Types for the batch orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::runner::RunnerError;
use crate::scheduler::SchedulerReport;

/// Errors that stop a batch before any job is scheduled.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration is invalid or a configured file is missing.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The collection runner is unusable.
    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),
}

/// Aggregate figures of a finished batch, as logged at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummaryLine {
    pub run_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub peak_running: usize,
}

impl RunSummaryLine {
    pub fn from_report(run_id: impl Into<String>, report: &SchedulerReport) -> Self {
        Self {
            run_id: run_id.into(),
            total: report.total(),
            succeeded: report.succeeded(),
            failed: report.failed(),
            peak_running: report.queue.peak_running,
        }
    }
}
