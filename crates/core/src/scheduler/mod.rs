//! Bounded-concurrency scheduler for jobs.
//!
//! The scheduler owns its queue state; nothing else mutates the counters.
//! Callers `submit` jobs and `drain` the queue, which resolves once every
//! job is either `Succeeded` or `Failed`.

mod pool;
mod state;
mod types;

pub use pool::Scheduler;
pub use state::QueueState;
pub use types::{JobReport, JobState, QueueSnapshot, SchedulerReport};
