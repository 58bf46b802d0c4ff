//! Queue bookkeeping owned by the scheduler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::types::{JobState, QueueSnapshot};

/// Counters and per-job states of one scheduler.
///
/// `admit` and `complete` are the only transitions; they are called while the
/// job holds (respectively is about to release) its concurrency permit.
#[derive(Debug, Default)]
pub struct QueueState {
    pending: AtomicUsize,
    running: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    peak_running: AtomicUsize,
    jobs: Mutex<Vec<JobState>>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a queued job and returns its index.
    pub fn enqueue(&self) -> usize {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.push(JobState::Queued);
        self.pending.fetch_add(1, Ordering::SeqCst);
        jobs.len() - 1
    }

    /// Queued -> Running.
    pub fn admit(&self, index: usize) {
        self.transition(index, JobState::Running);
        self.pending.fetch_sub(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);
    }

    /// Running -> Succeeded | Failed.
    pub fn complete(&self, index: usize, success: bool) {
        let state = if success {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        self.transition(index, state);
        self.running.fetch_sub(1, Ordering::SeqCst);
        if success {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Queued -> Failed, for a job that could never be admitted.
    pub fn abandon(&self, index: usize) {
        self.transition(index, JobState::Failed);
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn state(&self, index: usize) -> Option<JobState> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(index).copied()
    }

    pub fn is_drained(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0 && self.running.load(Ordering::SeqCst) == 0
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.load(Ordering::SeqCst),
            running: self.running.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            peak_running: self.peak_running.load(Ordering::SeqCst),
        }
    }

    fn transition(&self, index: usize, to: JobState) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = jobs.get_mut(index) {
            debug_assert!(
                state.can_transition_to(to),
                "illegal job transition {:?} -> {:?}",
                state,
                to
            );
            *state = to;
        }
    }
}
