//! Two-phase job pipeline: auth, pause, update.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::IsolationConfig;
use crate::runner::CollectionRunner;

use super::environment::JobEnvironment;
use super::phase::PhaseExecutor;
use super::types::{JobError, JobSpec, PhaseKind, RunOutcome};

/// Runs the auth and update phases of a job in order.
pub struct JobPipeline {
    executor: PhaseExecutor,
    between_phases: Duration,
    isolation: IsolationConfig,
}

impl JobPipeline {
    /// Creates a pipeline with isolated per-job environments.
    pub fn new(runner: Arc<dyn CollectionRunner>, between_phases: Duration) -> Self {
        Self {
            executor: PhaseExecutor::new(runner),
            between_phases,
            isolation: IsolationConfig::default(),
        }
    }

    /// Sets how job environments are provisioned.
    pub fn with_isolation(mut self, isolation: IsolationConfig) -> Self {
        self.isolation = isolation;
        self
    }

    /// Executes one job.
    ///
    /// The update phase only runs after a successful auth phase. The job's
    /// result is the update phase's outcome. The dataset row count is logged
    /// and passed along but never decides whether the update phase runs.
    pub async fn execute(&self, job: &JobSpec) -> Result<RunOutcome, JobError> {
        let job_id = job.job_id();
        info!(job_id, dataset = %job.dataset().path().display(), "Starting job");

        let environment =
            JobEnvironment::provision(job.environment(), job_id, &self.isolation).await?;

        let auth = environment.apply(job.auth());
        let outcome = self.executor.run(job_id, &auth).await;
        if !outcome.success {
            return Err(JobError::phase_failure(
                PhaseKind::Auth,
                outcome.error_detail(),
            ));
        }

        if !self.between_phases.is_zero() {
            info!(
                job_id,
                delay_ms = self.between_phases.as_millis() as u64,
                "Waiting before update phase"
            );
            tokio::time::sleep(self.between_phases).await;
        }

        let iteration_count = job.dataset().row_count().await?;
        if iteration_count == 0 {
            warn!(job_id, "Dataset has no data rows; running update phase once anyway");
        }
        info!(
            job_id,
            iteration_count,
            "Running update collection for {} with {} iterations",
            job_id,
            iteration_count
        );

        let update = environment
            .apply(job.update())
            .with_iteration_count(iteration_count);
        let outcome = self.executor.run(job_id, &update).await;
        if !outcome.success {
            return Err(JobError::phase_failure(
                PhaseKind::Update,
                outcome.error_detail(),
            ));
        }

        info!(job_id, "Completed job");
        Ok(outcome)
    }
}
