//! Jobs: one dataset driven through the auth and update phases.
//!
//! - [`PhaseExecutor`] runs one phase through a collection runner and reduces
//!   its event stream to a single [`RunOutcome`]
//! - [`JobPipeline`] runs auth, waits, counts the dataset rows, runs update
//! - [`JobEnvironment`] gives each job its own copy of the environment file

mod environment;
mod phase;
mod pipeline;
mod types;

pub use environment::JobEnvironment;
pub use phase::PhaseExecutor;
pub use pipeline::JobPipeline;
pub use types::{JobError, JobSpec, PhaseKind, PhaseParams, RunOutcome};
