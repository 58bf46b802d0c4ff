//! Types for the job module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::CollectionsConfig;
use crate::dataset::{DatasetError, InputDataset};
use crate::runner::{RunOptions, RunSummary};

/// Errors that fail a single job. None of these stop the batch.
#[derive(Debug, Error)]
pub enum JobError {
    /// The dataset could not be read for iteration counting.
    #[error("Data unreadable: {0}")]
    DataUnreadable(#[from] DatasetError),

    /// A phase reported an error or a failed summary.
    #[error("{phase} phase failed: {detail}")]
    PhaseFailure { phase: PhaseKind, detail: String },

    /// The job-scoped environment copy could not be prepared.
    #[error("Failed to prepare environment {path}: {reason}")]
    Environment { path: PathBuf, reason: String },

    /// Uncaught failure inside a scheduled job (panic or aborted task).
    #[error("Queue processing error: {0}")]
    QueueProcessing(String),
}

impl JobError {
    pub fn phase_failure(phase: PhaseKind, detail: impl Into<String>) -> Self {
        Self::PhaseFailure {
            phase,
            detail: detail.into(),
        }
    }

    /// Short machine friendly kind, used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnreadable(_) => "data_unreadable",
            Self::PhaseFailure { .. } => "phase_failure",
            Self::Environment { .. } => "environment",
            Self::QueueProcessing(_) => "queue_processing",
        }
    }
}

/// The two phases of a job, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// Obtains a token and writes it into the environment.
    Auth,
    /// Iterates the update collection over the job's dataset.
    Update,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run parameters for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseParams {
    pub kind: PhaseKind,
    pub collection: PathBuf,
    pub environment: PathBuf,
    /// Set for the auth phase: the environment it writes the token into.
    pub export_environment: Option<PathBuf>,
    pub iteration_data: Option<PathBuf>,
    pub iteration_count: Option<u64>,
}

impl PhaseParams {
    pub fn with_iteration_count(mut self, count: u64) -> Self {
        self.iteration_count = Some(count);
        self
    }

    /// Options handed to the collection runner. Transport is always insecure.
    pub fn to_run_options(&self) -> RunOptions {
        RunOptions {
            collection: self.collection.clone(),
            environment: self.environment.clone(),
            insecure: true,
            export_environment: self.export_environment.clone(),
            iteration_data: self.iteration_data.clone(),
            iteration_count: self.iteration_count,
        }
    }
}

/// The unit of work submitted to the scheduler: one dataset, two phases.
#[derive(Debug)]
pub struct JobSpec {
    dataset: InputDataset,
    environment: PathBuf,
    phases: [PhaseParams; 2],
}

impl JobSpec {
    /// Builds the auth + update phases for `dataset`.
    ///
    /// The update phase always iterates over the job's own dataset.
    pub fn new(dataset: InputDataset, collections: &CollectionsConfig, environment: &Path) -> Self {
        let auth = PhaseParams {
            kind: PhaseKind::Auth,
            collection: collections.auth.clone(),
            environment: environment.to_path_buf(),
            export_environment: Some(environment.to_path_buf()),
            iteration_data: None,
            iteration_count: None,
        };
        let update = PhaseParams {
            kind: PhaseKind::Update,
            collection: collections.update.clone(),
            environment: environment.to_path_buf(),
            export_environment: None,
            iteration_data: Some(dataset.path().to_path_buf()),
            iteration_count: None,
        };

        Self {
            dataset,
            environment: environment.to_path_buf(),
            phases: [auth, update],
        }
    }

    pub fn job_id(&self) -> &str {
        self.dataset.job_id()
    }

    pub fn dataset(&self) -> &InputDataset {
        &self.dataset
    }

    /// The configured environment (before any per-job copy).
    pub fn environment(&self) -> &Path {
        &self.environment
    }

    /// Both phases in execution order.
    pub fn phases(&self) -> &[PhaseParams; 2] {
        &self.phases
    }

    pub fn auth(&self) -> &PhaseParams {
        &self.phases[0]
    }

    pub fn update(&self) -> &PhaseParams {
        &self.phases[1]
    }
}

/// Result of one phase execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub phase: PhaseKind,
    pub success: bool,
    /// Always non-empty when `success` is false.
    pub error: Option<String>,
    pub summary: Option<RunSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn succeeded(
        phase: PhaseKind,
        summary: Option<RunSummary>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            phase,
            success: true,
            error: None,
            summary,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        phase: PhaseKind,
        error: impl Into<String>,
        summary: Option<RunSummary>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            format!("{} phase failed without an error message", phase)
        } else {
            error
        };

        Self {
            phase,
            success: false,
            error: Some(error),
            summary,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Error text of a failed outcome (empty for a successful one).
    pub fn error_detail(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}
