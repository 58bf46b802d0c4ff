//! Bounded-concurrency job queue.

use futures::FutureExt;
use prometheus::IntGauge;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::job::{JobError, JobPipeline, JobSpec};
use crate::metrics;

use super::state::QueueState;
use super::types::{JobReport, QueueSnapshot, SchedulerReport};

/// Runs jobs through a [`JobPipeline`], at most `max_concurrency` at a time.
///
/// Jobs are admitted in submission order. After a job finishes, its slot
/// stays occupied for the inter-job delay before the next job may take it.
/// A failed or panicking job is recorded and never affects other jobs.
pub struct Scheduler {
    pipeline: Arc<JobPipeline>,
    max_concurrency: usize,
    between_jobs: Duration,
    semaphore: Arc<Semaphore>,
    state: Arc<QueueState>,
    queue: VecDeque<(usize, JobSpec)>,
}

impl Scheduler {
    /// Creates a scheduler. A concurrency of 0 is treated as 1.
    pub fn new(pipeline: Arc<JobPipeline>, config: &SchedulerConfig, between_jobs: Duration) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            pipeline,
            max_concurrency,
            between_jobs,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            state: Arc::new(QueueState::new()),
            queue: VecDeque::new(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Queues a job. Returns its submission index.
    pub fn submit(&mut self, job: JobSpec) -> usize {
        let index = self.state.enqueue();
        self.queue.push_back((index, job));
        index
    }

    /// Current queue counters.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.state.snapshot()
    }

    /// Submits every job, then drains the queue.
    pub async fn run_all(&mut self, jobs: impl IntoIterator<Item = JobSpec>) -> SchedulerReport {
        for job in jobs {
            self.submit(job);
        }
        self.drain().await
    }

    /// Runs every queued job and waits until all of them reached a terminal state.
    pub async fn drain(&mut self) -> SchedulerReport {
        let mut tasks = JoinSet::new();
        let mut reports: Vec<Option<JobReport>> = Vec::new();
        let mut identities = Vec::new();

        info!(
            queued = self.queue.len(),
            max_concurrency = self.max_concurrency,
            "Draining job queue"
        );

        while let Some((index, job)) = self.queue.pop_front() {
            identities.push((index, job.job_id().to_string(), job.dataset().path().to_path_buf()));

            // Semaphore is FIFO: acquisition order is submission order.
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(job_id = job.job_id(), "Scheduler closed before admission: {}", e);
                    self.state.abandon(index);
                    continue;
                }
            };

            self.state.admit(index);
            let running = RunningGuard::new(metrics::JOBS_RUNNING.clone());

            let pipeline = Arc::clone(&self.pipeline);
            let state = Arc::clone(&self.state);
            let between_jobs = self.between_jobs;

            tasks.spawn(async move {
                let report = Self::run_job(&pipeline, index, job).await;
                state.complete(index, report.result.is_ok());
                drop(running);

                if !between_jobs.is_zero() {
                    info!(
                        job_id = %report.job_id,
                        delay_ms = between_jobs.as_millis() as u64,
                        "Waiting before releasing slot"
                    );
                    tokio::time::sleep(between_jobs).await;
                }
                drop(permit);
                report
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    let index = report.index;
                    if reports.len() <= index {
                        reports.resize_with(index + 1, || None);
                    }
                    reports[index] = Some(report);
                }
                Err(e) => error!("Queue processing error: job task did not finish: {}", e),
            }
        }

        // Tasks that vanished (aborted) still need a terminal record.
        let mut jobs = Vec::with_capacity(identities.len());
        for (index, job_id, dataset) in identities {
            match reports.get_mut(index).and_then(Option::take) {
                Some(report) => jobs.push(report),
                None => {
                    if self.state.state(index).is_some_and(|s| !s.is_terminal()) {
                        self.state.complete(index, false);
                    }
                    jobs.push(JobReport {
                        index,
                        job_id,
                        dataset,
                        iteration_count: None,
                        duration: Duration::ZERO,
                        result: Err(JobError::QueueProcessing(
                            "job task ended without a result".to_string(),
                        )),
                    });
                }
            }
        }

        let queue = self.state.snapshot();
        debug_assert!(self.state.is_drained());
        info!(
            succeeded = queue.succeeded,
            failed = queue.failed,
            peak_running = queue.peak_running,
            "Job queue drained"
        );

        SchedulerReport { jobs, queue }
    }

    /// Runs one job, containing any panic as a `QueueProcessing` failure.
    async fn run_job(pipeline: &JobPipeline, index: usize, job: JobSpec) -> JobReport {
        let start = Instant::now();
        let result = AssertUnwindSafe(pipeline.execute(&job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::QueueProcessing(panic_message(panic))));
        let duration = start.elapsed();

        let label = if result.is_ok() { "succeeded" } else { "failed" };
        metrics::JOBS_TOTAL.with_label_values(&[label]).inc();
        metrics::JOB_DURATION
            .with_label_values(&[label])
            .observe(duration.as_secs_f64());

        match &result {
            Ok(_) => info!(job_id = job.job_id(), "Job succeeded"),
            Err(e @ JobError::QueueProcessing(_)) => {
                error!(job_id = job.job_id(), error = %e, "Queue processing error")
            }
            Err(e) => warn!(
                job_id = job.job_id(),
                kind = e.kind(),
                error = %e,
                "Failed to process job"
            ),
        }

        JobReport {
            index,
            job_id: job.job_id().to_string(),
            dataset: job.dataset().path().to_path_buf(),
            iteration_count: job.dataset().cached_row_count(),
            duration,
            result,
        }
    }
}

/// Counts a job in a running gauge until dropped, including when its task
/// is aborted or unwinds.
struct RunningGuard(IntGauge);

impl RunningGuard {
    fn new(gauge: IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("job panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("job panicked: {}", s)
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectionsConfig, IsolationConfig};
    use crate::dataset::InputDataset;
    use crate::runner::RunOptions;
    use crate::scheduler::JobState;
    use crate::testing::{fixtures, FailureMode, MockCollectionRunner};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        runner: MockCollectionRunner,
        collections: CollectionsConfig,
        environment: PathBuf,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let collections = fixtures::collections(dir.path());
            let environment = fixtures::environment(dir.path());
            Self {
                dir,
                runner: MockCollectionRunner::new(),
                collections,
                environment,
            }
        }

        fn jobs(&self, names: &[&str]) -> Vec<JobSpec> {
            names
                .iter()
                .map(|name| {
                    let path = fixtures::dataset(self.dir.path(), name, 2);
                    JobSpec::new(InputDataset::new(path), &self.collections, &self.environment)
                })
                .collect()
        }

        fn scheduler(&self, max_concurrency: usize, between_jobs: Duration) -> Scheduler {
            let pipeline = JobPipeline::new(Arc::new(self.runner.clone()), Duration::ZERO)
                .with_isolation(IsolationConfig {
                    enabled: false,
                    work_dir: None,
                });
            Scheduler::new(
                Arc::new(pipeline),
                &SchedulerConfig { max_concurrency },
                between_jobs,
            )
        }
    }

    fn dataset_is(name: &'static str) -> impl Fn(&RunOptions) -> bool + Send + Sync + 'static {
        move |options| {
            options
                .iteration_data
                .as_deref()
                .and_then(Path::file_stem)
                .is_some_and(|stem| stem == name)
        }
    }

    #[tokio::test]
    async fn test_all_jobs_succeed() {
        let harness = Harness::new();
        let mut scheduler = harness.scheduler(2, Duration::ZERO);

        let report = scheduler
            .run_all(harness.jobs(&["input1", "input2", "input3"]))
            .await;

        assert_eq!(report.total(), 3);
        assert!(report.all_succeeded());
        assert_eq!(report.queue.succeeded, 3);
        assert_eq!(report.queue.pending, 0);
        assert_eq!(report.queue.running, 0);
        let ids: Vec<_> = report.jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["input1", "input2", "input3"]);
        assert!(report.jobs.iter().all(|j| j.iteration_count == Some(2)));
        assert_eq!(harness.runner.run_count().await, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_max_concurrency() {
        let harness = Harness::new();
        harness
            .runner
            .set_run_duration(Duration::from_millis(100))
            .await;
        let mut scheduler = harness.scheduler(2, Duration::ZERO);

        let report = scheduler
            .run_all(harness.jobs(&["a", "b", "c", "d", "e"]))
            .await;

        assert!(report.all_succeeded());
        assert_eq!(harness.runner.peak_in_flight(), 2);
        assert_eq!(report.queue.peak_running, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_runs_jobs_sequentially_in_order() {
        let harness = Harness::new();
        harness
            .runner
            .set_run_duration(Duration::from_millis(50))
            .await;
        let mut scheduler = harness.scheduler(1, Duration::ZERO);

        scheduler.run_all(harness.jobs(&["first", "second", "third"])).await;

        assert_eq!(harness.runner.peak_in_flight(), 1);
        let order: Vec<_> = harness
            .runner
            .runs()
            .await
            .into_iter()
            .filter_map(|r| r.options.iteration_data)
            .map(|p| p.file_stem().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failed_job_does_not_block_others() {
        let harness = Harness::new();
        harness
            .runner
            .fail_when(dataset_is("input2"), FailureMode::RunError("500".to_string()))
            .await;
        let mut scheduler = harness.scheduler(1, Duration::ZERO);

        let report = scheduler
            .run_all(harness.jobs(&["input1", "input2", "input3"]))
            .await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        let failed = report.job("input2").unwrap();
        assert_eq!(failed.state(), JobState::Failed);
        assert!(matches!(failed.error(), Some(JobError::PhaseFailure { .. })));
        assert_eq!(report.job("input3").unwrap().state(), JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_panicking_job_is_contained() {
        let harness = Harness::new();
        harness
            .runner
            .fail_when(dataset_is("input1"), FailureMode::Panic("runner crashed".to_string()))
            .await;
        let mut scheduler = harness.scheduler(2, Duration::ZERO);

        let report = scheduler.run_all(harness.jobs(&["input1", "input2"])).await;

        let failed = report.job("input1").unwrap();
        match failed.error() {
            Some(JobError::QueueProcessing(msg)) => assert!(msg.contains("runner crashed")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(report.job("input2").unwrap().state(), JobState::Succeeded);
        assert_eq!(report.queue.failed, 1);
        assert_eq!(report.queue.running, 0);
    }

    #[tokio::test]
    async fn test_every_job_failing_still_drains() {
        let harness = Harness::new();
        harness
            .runner
            .fail_when(|_| true, FailureMode::RunError("down".to_string()))
            .await;
        let mut scheduler = harness.scheduler(2, Duration::ZERO);

        let report = scheduler.run_all(harness.jobs(&["a", "b", "c"])).await;
        assert_eq!(report.failed(), 3);
        assert_eq!(report.queue.failed, 3);
        assert_eq!(scheduler.snapshot().pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_job_delay_before_slot_reuse() {
        let harness = Harness::new();
        harness
            .runner
            .set_run_duration(Duration::from_millis(10))
            .await;
        let mut scheduler = harness.scheduler(1, Duration::from_secs(20));

        scheduler.run_all(harness.jobs(&["input1", "input2"])).await;

        let runs = harness.runner.runs().await;
        assert_eq!(runs.len(), 4);
        // runs[1] is input1's update phase, runs[2] is input2's auth phase
        let gap = runs[2].started_at - runs[1].finished_at;
        assert!(gap >= Duration::from_secs(20), "gap was {:?}", gap);
    }

    #[tokio::test]
    async fn test_empty_queue_drains_immediately() {
        let harness = Harness::new();
        let mut scheduler = harness.scheduler(2, Duration::from_secs(60));
        let report = scheduler.drain().await;
        assert_eq!(report.total(), 0);
        assert_eq!(report.queue, QueueSnapshot::default());
    }

    #[tokio::test]
    async fn test_running_gauge_released_when_task_dies() {
        let gauge = IntGauge::new("test_jobs_running", "test gauge").unwrap();

        let guard = RunningGuard::new(gauge.clone());
        assert_eq!(gauge.get(), 1);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("task died outside the job boundary");
        });
        assert!(handle.await.is_err());
        assert_eq!(gauge.get(), 0);

        let guard = RunningGuard::new(gauge.clone());
        let handle = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn test_zero_concurrency_treated_as_one() {
        let harness = Harness::new();
        let scheduler = harness.scheduler(0, Duration::ZERO);
        assert_eq!(scheduler.max_concurrency(), 1);
    }

    #[test]
    fn test_submit_tracks_pending() {
        let harness = Harness::new();
        let mut scheduler = harness.scheduler(2, Duration::ZERO);
        for job in harness.jobs(&["a", "b"]) {
            scheduler.submit(job);
        }
        assert_eq!(scheduler.snapshot().pending, 2);
    }
}
