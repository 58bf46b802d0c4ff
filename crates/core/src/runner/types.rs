//! Types for the runner module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters for one collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Collection file to execute.
    pub collection: PathBuf,
    /// Environment file the run reads.
    pub environment: PathBuf,
    /// Accept self-signed certificates.
    pub insecure: bool,
    /// Where the run writes its final environment, if anywhere.
    pub export_environment: Option<PathBuf>,
    /// Dataset supplying one parameter set per iteration.
    pub iteration_data: Option<PathBuf>,
    /// Advisory number of iterations (data rows).
    pub iteration_count: Option<u64>,
}

impl RunOptions {
    /// Options for a plain run of `collection` against `environment`.
    pub fn new(collection: impl Into<PathBuf>, environment: impl Into<PathBuf>) -> Self {
        Self {
            collection: collection.into(),
            environment: environment.into(),
            insecure: true,
            export_environment: None,
            iteration_data: None,
            iteration_count: None,
        }
    }

    pub fn with_export_environment(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_environment = Some(path.into());
        self
    }

    pub fn with_iteration_data(mut self, path: impl Into<PathBuf>, count: Option<u64>) -> Self {
        self.iteration_data = Some(path.into());
        self.iteration_count = count;
        self
    }
}

/// The request a lifecycle event refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    /// Item name inside the collection.
    pub name: Option<String>,
    pub method: Option<String>,
    pub url: String,
}

/// Lifecycle signals emitted by a runner during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A request is about to be sent. `error` is a preparation failure.
    BeforeRequest {
        request: RequestInfo,
        error: Option<String>,
    },
    /// A request finished. `error` is a transport failure.
    Request {
        request: RequestInfo,
        status: Option<u16>,
        error: Option<String>,
    },
    /// Terminal signal; nothing after it is observed.
    Done {
        error: Option<String>,
        summary: Option<RunSummary>,
    },
}

impl RunEvent {
    /// A `Done` event for a clean run.
    pub fn done_ok(summary: Option<RunSummary>) -> Self {
        Self::Done {
            error: None,
            summary,
        }
    }

    /// A `Done` event carrying a run error.
    pub fn done_err(error: impl Into<String>) -> Self {
        Self::Done {
            error: Some(error.into()),
            summary: None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Aggregate figures reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub iterations: u64,
    pub requests_total: u64,
    pub requests_failed: u64,
    pub assertions_total: u64,
    pub assertions_failed: u64,
    /// Run-level error reported inside the summary. Non-empty fails the phase.
    pub error: Option<String>,
    /// Human readable assertion/test failures.
    #[serde(default)]
    pub failures: Vec<String>,
}

impl RunSummary {
    /// The summary error, if it carries any text.
    pub fn run_error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.trim().is_empty())
    }
}
