//! Batch orchestrator: the entry point that validates preconditions, builds
//! one job per dataset and drives them through the scheduler.

mod runner;
mod types;

pub use runner::BatchOrchestrator;
pub use types::{OrchestratorError, RunSummaryLine};
