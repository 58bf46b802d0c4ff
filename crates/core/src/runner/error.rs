//! Error types for the runner module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors starting or validating a collection runner.
///
/// Failures *inside* a run (bad responses, failed assertions, run errors) are
/// not `RunnerError`s; they arrive as [`RunEvent`](super::RunEvent)s.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Runner executable not found.
    #[error("Runner executable not found: {path}")]
    ExecutableNotFound { path: PathBuf },

    /// The runner process could not be started.
    #[error("Failed to start runner: {reason}")]
    SpawnFailed { reason: String },

    /// The runner's report could not be interpreted.
    #[error("Failed to parse runner report: {reason}")]
    ReportParse { reason: String },

    /// I/O error while talking to the runner.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    pub fn report_parse(reason: impl Into<String>) -> Self {
        Self::ReportParse {
            reason: reason.into(),
        }
    }
}
