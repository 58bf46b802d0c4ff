//! Mock collection runner for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

use crate::runner::{
    CollectionRunner, RequestInfo, RunEvent, RunOptions, RunSummary, RunnerError,
};

/// How a matching run misbehaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureMode {
    /// `Done` carries this error.
    RunError(String),
    /// `Done` succeeds but its summary carries this error.
    SummaryError(String),
    /// Every request reports this transport error; the run itself completes.
    RequestErrors(String),
    /// The run never starts.
    StartError(String),
    /// The run returns without emitting `Done`.
    NoDone,
    /// The run panics with this message.
    Panic(String),
}

/// A run the mock has seen, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub options: RunOptions,
    pub started_at: Instant,
    pub finished_at: Instant,
}

type Predicate = Box<dyn Fn(&RunOptions) -> bool + Send + Sync>;

/// Mock implementation of [`CollectionRunner`].
///
/// Clones share state, so a test can keep a handle while the code under test
/// owns another. Runs succeed by default; `fail_when` scripts failures for the
/// runs whose options match a predicate (first match wins).
#[derive(Clone, Default)]
pub struct MockCollectionRunner {
    requests: Arc<RwLock<Vec<(RequestInfo, u16)>>>,
    failures: Arc<RwLock<Vec<(Predicate, FailureMode)>>>,
    run_duration: Arc<RwLock<Duration>>,
    runs: Arc<RwLock<Vec<RecordedRun>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MockCollectionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCollectionRunner")
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .field("peak_in_flight", &self.peak_in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Decrements the in-flight counter even when a run panics.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockCollectionRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests every run reports, with their response status.
    pub async fn set_requests(&self, requests: Vec<(RequestInfo, u16)>) {
        *self.requests.write().await = requests;
    }

    /// Simulated duration of every run.
    pub async fn set_run_duration(&self, duration: Duration) {
        *self.run_duration.write().await = duration;
    }

    /// Makes runs whose options satisfy `predicate` fail with `mode`.
    pub async fn fail_when<F>(&self, predicate: F, mode: FailureMode)
    where
        F: Fn(&RunOptions) -> bool + Send + Sync + 'static,
    {
        self.failures.write().await.push((Box::new(predicate), mode));
    }

    /// Recorded runs, in start order.
    pub async fn runs(&self) -> Vec<RecordedRun> {
        self.runs.read().await.clone()
    }

    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Highest number of runs that were in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn failure_for(&self, options: &RunOptions) -> Option<FailureMode> {
        self.failures
            .read()
            .await
            .iter()
            .find(|(predicate, _)| predicate(options))
            .map(|(_, mode)| mode.clone())
    }

    fn summary(&self, options: &RunOptions, requests: &[(RequestInfo, u16)]) -> RunSummary {
        RunSummary {
            iterations: options.iteration_count.unwrap_or(1).max(1),
            requests_total: requests.len() as u64,
            ..Default::default()
        }
    }
}

#[async_trait]
impl CollectionRunner for MockCollectionRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(
        &self,
        options: RunOptions,
        events: mpsc::Sender<RunEvent>,
    ) -> Result<(), RunnerError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));

        let started_at = Instant::now();
        let index = {
            let mut runs = self.runs.write().await;
            runs.push(RecordedRun {
                options: options.clone(),
                started_at,
                finished_at: started_at,
            });
            runs.len() - 1
        };

        let duration = *self.run_duration.read().await;
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }

        let failure = self.failure_for(&options).await;
        let requests = self.requests.read().await.clone();
        let result = match failure {
            Some(FailureMode::StartError(reason)) => Err(RunnerError::spawn_failed(reason)),
            Some(FailureMode::NoDone) => Ok(()),
            Some(FailureMode::Panic(message)) => {
                self.runs.write().await[index].finished_at = Instant::now();
                panic!("{}", message);
            }
            Some(FailureMode::RunError(error)) => {
                let _ = events.send(RunEvent::done_err(error)).await;
                Ok(())
            }
            Some(FailureMode::SummaryError(error)) => {
                let mut summary = self.summary(&options, &requests);
                summary.error = Some(error);
                let _ = events.send(RunEvent::done_ok(Some(summary))).await;
                Ok(())
            }
            Some(FailureMode::RequestErrors(error)) => {
                let failing = if requests.is_empty() {
                    vec![(RequestInfo::default(), 0)]
                } else {
                    requests.clone()
                };
                for (request, _) in &failing {
                    let _ = events
                        .send(RunEvent::Request {
                            request: request.clone(),
                            status: None,
                            error: Some(error.clone()),
                        })
                        .await;
                }
                let mut summary = self.summary(&options, &failing);
                summary.requests_failed = failing.len() as u64;
                let _ = events.send(RunEvent::done_ok(Some(summary))).await;
                Ok(())
            }
            None => {
                for (request, status) in &requests {
                    let _ = events
                        .send(RunEvent::BeforeRequest {
                            request: request.clone(),
                            error: None,
                        })
                        .await;
                    let _ = events
                        .send(RunEvent::Request {
                            request: request.clone(),
                            status: Some(*status),
                            error: None,
                        })
                        .await;
                }
                let summary = self.summary(&options, &requests);
                let _ = events.send(RunEvent::done_ok(Some(summary))).await;
                Ok(())
            }
        };

        self.runs.write().await[index].finished_at = Instant::now();
        result
    }
}
