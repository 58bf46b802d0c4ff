//! Batch orchestrator implementation.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{validate_config, validate_files, Config};
use crate::dataset::InputDataset;
use crate::job::{JobPipeline, JobSpec};
use crate::runner::CollectionRunner;
use crate::scheduler::{Scheduler, SchedulerReport};

use super::types::{OrchestratorError, RunSummaryLine};

/// Runs every configured dataset through the auth/update pipeline.
pub struct BatchOrchestrator {
    config: Config,
    runner: Arc<dyn CollectionRunner>,
}

impl BatchOrchestrator {
    pub fn new(config: Config, runner: Arc<dyn CollectionRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Checks configuration, configured files and the runner.
    ///
    /// Fails on the first problem, before any job exists.
    pub async fn validate(&self) -> Result<(), OrchestratorError> {
        validate_config(&self.config)?;
        validate_files(&self.config).await?;
        self.runner.validate().await?;
        Ok(())
    }

    /// One job per dataset, in configured order.
    pub fn build_jobs(&self) -> Vec<JobSpec> {
        self.config
            .datasets
            .iter()
            .map(|path| {
                JobSpec::new(
                    InputDataset::new(path),
                    &self.config.collections,
                    &self.config.environment,
                )
            })
            .collect()
    }

    /// Validates, then schedules every job and waits for the queue to drain.
    ///
    /// Per-job failures are part of the returned report; only precondition
    /// failures are errors.
    pub async fn run(&self) -> Result<SchedulerReport, OrchestratorError> {
        let run_id = Uuid::new_v4().to_string();

        info!(
            run_id = %run_id,
            runner = self.runner.name(),
            datasets = self.config.datasets.len(),
            max_concurrency = self.config.scheduler.max_concurrency,
            "Starting batch"
        );

        if let Err(e) = self.validate().await {
            error!(run_id = %run_id, "Batch validation failed: {}", e);
            return Err(e);
        }

        if !self.config.isolation.enabled && self.config.scheduler.max_concurrency > 1 {
            warn!(
                environment = %self.config.environment.display(),
                max_concurrency = self.config.scheduler.max_concurrency,
                "Environment isolation is disabled; concurrent jobs share one environment file"
            );
        }

        let pipeline = JobPipeline::new(
            Arc::clone(&self.runner),
            self.config.delays.between_phases(),
        )
        .with_isolation(self.config.isolation.clone());
        let mut scheduler = Scheduler::new(
            Arc::new(pipeline),
            &self.config.scheduler,
            self.config.delays.between_jobs(),
        );

        let report = scheduler.run_all(self.build_jobs()).await;

        let summary = RunSummaryLine::from_report(&run_id, &report);
        info!(
            run_id = %summary.run_id,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            peak_running = summary.peak_running,
            "All collections executed"
        );
        for (job_id, error) in report.failures() {
            warn!(run_id = %run_id, job_id, kind = error.kind(), "Job failed: {}", error);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::runner::RunnerError;
    use crate::testing::{fixtures, MockCollectionRunner};
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct MissingBinary;

    #[async_trait]
    impl CollectionRunner for MissingBinary {
        fn name(&self) -> &str {
            "missing"
        }

        async fn run(
            &self,
            _options: crate::runner::RunOptions,
            _events: mpsc::Sender<crate::runner::RunEvent>,
        ) -> Result<(), RunnerError> {
            unreachable!("validation should have failed")
        }

        async fn validate(&self) -> Result<(), RunnerError> {
            Err(RunnerError::ExecutableNotFound {
                path: "newman".into(),
            })
        }
    }

    #[test]
    fn test_build_jobs_in_configured_order() {
        let dir = TempDir::new().unwrap();
        let config = fixtures::config(dir.path(), &[("b", 1), ("a", 1), ("c", 1)]);
        let orchestrator = BatchOrchestrator::new(config, Arc::new(MockCollectionRunner::new()));

        let ids: Vec<_> = orchestrator
            .build_jobs()
            .iter()
            .map(|j| j.job_id().to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_missing_dataset_fails_before_scheduling() {
        let dir = TempDir::new().unwrap();
        let mut config = fixtures::config(dir.path(), &[("input1", 1)]);
        config.datasets.push(dir.path().join("absent.csv"));
        let runner = MockCollectionRunner::new();
        let orchestrator = BatchOrchestrator::new(config, Arc::new(runner.clone()));

        let err = orchestrator.run().await.unwrap_err();
        match err {
            OrchestratorError::Config(ConfigError::FileNotFound(path)) => {
                assert!(path.ends_with("absent.csv"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(runner.run_count().await, 0);
    }

    #[tokio::test]
    async fn test_runner_validation_failure() {
        let dir = TempDir::new().unwrap();
        let config = fixtures::config(dir.path(), &[("input1", 1)]);
        let orchestrator = BatchOrchestrator::new(config, Arc::new(MissingBinary));

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Runner(_)));
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = fixtures::config(dir.path(), &[("input1", 1)]);
        config.scheduler.max_concurrency = 0;
        let orchestrator = BatchOrchestrator::new(config, Arc::new(MockCollectionRunner::new()));

        let err = orchestrator.validate().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Config(ConfigError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_run_reports_every_job() {
        let dir = TempDir::new().unwrap();
        let config = fixtures::config(dir.path(), &[("input1", 2), ("input2", 3)]);
        let runner = MockCollectionRunner::new();
        let orchestrator = BatchOrchestrator::new(config, Arc::new(runner.clone()));

        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.total(), 2);
        assert!(report.all_succeeded());
        assert_eq!(runner.run_count().await, 4);

        let summary = RunSummaryLine::from_report("r", &report);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
    }
}
