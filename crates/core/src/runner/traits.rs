//! Trait definitions for the runner module.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::RunnerError;
use super::types::{RunEvent, RunOptions};

/// Executes a collection against an environment and reports lifecycle events.
#[async_trait]
pub trait CollectionRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Runs a collection.
    ///
    /// Implementations send zero or more `BeforeRequest`/`Request` events and
    /// then exactly one `Done`. An `Err` means the run could not be started at
    /// all. If the receiver is dropped the run may continue unobserved.
    async fn run(
        &self,
        options: RunOptions,
        events: mpsc::Sender<RunEvent>,
    ) -> Result<(), RunnerError>;

    /// Validates that the runner is properly configured and ready.
    async fn validate(&self) -> Result<(), RunnerError> {
        Ok(())
    }
}
