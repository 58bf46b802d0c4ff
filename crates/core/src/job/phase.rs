//! Runs a single phase and folds its event stream into one outcome.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::metrics;
use crate::runner::{CollectionRunner, RunEvent, RunSummary};

use super::types::{PhaseKind, PhaseParams, RunOutcome};

/// Buffer size for runner events
const EVENT_BUFFER_SIZE: usize = 64;

/// What the `Done` signal carried.
struct Terminal {
    error: Option<String>,
    summary: Option<RunSummary>,
}

/// Executes phases through a [`CollectionRunner`].
#[derive(Clone)]
pub struct PhaseExecutor {
    runner: Arc<dyn CollectionRunner>,
}

impl PhaseExecutor {
    pub fn new(runner: Arc<dyn CollectionRunner>) -> Self {
        Self { runner }
    }

    /// Runs one phase to its terminal signal.
    ///
    /// Per-request errors are logged but never fail the phase. The phase
    /// fails when `Done` carries an error or a summary error, when the
    /// runner cannot start, or when it returns without sending `Done`.
    pub async fn run(&self, job_id: &str, params: &PhaseParams) -> RunOutcome {
        let phase = params.kind;
        let started_at = Utc::now();
        let start = Instant::now();

        info!(
            job_id,
            %phase,
            collection = %params.collection.display(),
            environment = %params.environment.display(),
            "Running {} collection",
            phase
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (run_result, terminal) = tokio::join!(
            self.runner.run(params.to_run_options(), tx),
            Self::watch_events(job_id, phase, rx)
        );

        let outcome = match (terminal, run_result) {
            (Some(Terminal { error: Some(e), summary }), _) => {
                // A blank error still fails; `failed` supplies the message
                let detail = match e.trim() {
                    "" => String::new(),
                    e => format!("Run failed: {}", e),
                };
                RunOutcome::failed(phase, detail, summary, started_at)
            }
            (Some(Terminal { summary, .. }), _) => {
                match summary.as_ref().and_then(RunSummary::run_error) {
                    Some(e) => {
                        let detail = format!("Run failed: {}", e);
                        RunOutcome::failed(phase, detail, summary, started_at)
                    }
                    None => RunOutcome::succeeded(phase, summary, started_at),
                }
            }
            (None, Err(e)) => RunOutcome::failed(phase, e.to_string(), None, started_at),
            (None, Ok(())) => RunOutcome::failed(
                phase,
                format!("{} runner finished without a done signal", self.runner.name()),
                None,
                started_at,
            ),
        };

        let result = if outcome.success { "success" } else { "failure" };
        metrics::PHASES_TOTAL
            .with_label_values(&[phase.as_str(), result])
            .inc();
        metrics::PHASE_DURATION
            .with_label_values(&[phase.as_str()])
            .observe(start.elapsed().as_secs_f64());

        if outcome.success {
            info!(
                job_id,
                %phase,
                duration_ms = start.elapsed().as_millis() as u64,
                "{} collection run complete",
                phase
            );
        } else {
            error!(
                job_id,
                %phase,
                error = outcome.error_detail(),
                "{} collection run failed",
                phase
            );
        }

        outcome
    }

    /// Logs lifecycle events until `Done` arrives or the runner hangs up.
    async fn watch_events(
        job_id: &str,
        phase: PhaseKind,
        mut rx: mpsc::Receiver<RunEvent>,
    ) -> Option<Terminal> {
        while let Some(event) = rx.recv().await {
            match event {
                RunEvent::BeforeRequest { request, error } => match error {
                    Some(e) => error!(
                        job_id,
                        %phase,
                        url = %request.url,
                        error = %e,
                        "Error in beforeRequest"
                    ),
                    None => debug!(job_id, %phase, url = %request.url, "Sending request"),
                },
                RunEvent::Request {
                    request,
                    status,
                    error,
                } => match error {
                    Some(e) => {
                        metrics::REQUESTS_TOTAL
                            .with_label_values(&[phase.as_str(), "error"])
                            .inc();
                        error!(
                            job_id,
                            %phase,
                            url = %request.url,
                            status = ?status,
                            error = %e,
                            "Error in request"
                        );
                    }
                    None => {
                        metrics::REQUESTS_TOTAL
                            .with_label_values(&[phase.as_str(), "success"])
                            .inc();
                        info!(
                            job_id,
                            %phase,
                            url = %request.url,
                            status = ?status,
                            "Request successful"
                        );
                    }
                },
                RunEvent::Done { error, summary } => {
                    return Some(Terminal { error, summary });
                }
            }
        }
        None
    }
}
