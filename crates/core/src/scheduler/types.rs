//! Types for the scheduler.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::job::{JobError, RunOutcome};

/// Lifecycle of a job inside the queue.
///
/// `Queued -> Running -> {Succeeded, Failed}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn can_transition_to(&self, to: JobState) -> bool {
        matches!(
            (self, to),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

/// Point-in-time view of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Highest number of jobs that ran at the same time.
    pub peak_running: usize,
}

/// Terminal record of one job.
#[derive(Debug)]
pub struct JobReport {
    /// Submission order, starting at 0.
    pub index: usize,
    pub job_id: String,
    pub dataset: PathBuf,
    /// Data rows of the dataset, when the job got far enough to count them.
    pub iteration_count: Option<u64>,
    /// Time spent in the pipeline (inter-job delay excluded).
    pub duration: Duration,
    pub result: Result<RunOutcome, JobError>,
}

impl JobReport {
    pub fn state(&self) -> JobState {
        match self.result {
            Ok(_) => JobState::Succeeded,
            Err(_) => JobState::Failed,
        }
    }

    pub fn error(&self) -> Option<&JobError> {
        self.result.as_ref().err()
    }
}

/// Everything the scheduler knows once the queue has drained.
#[derive(Debug)]
pub struct SchedulerReport {
    /// One report per submitted job, in submission order.
    pub jobs: Vec<JobReport>,
    pub queue: QueueSnapshot,
}

impl SchedulerReport {
    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|j| j.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Failed jobs with their reasons.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &JobError)> {
        self.jobs
            .iter()
            .filter_map(|j| j.error().map(|e| (j.job_id.as_str(), e)))
    }

    pub fn job(&self, job_id: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }
}
