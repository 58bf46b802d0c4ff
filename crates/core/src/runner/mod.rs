//! Collection runner module.
//!
//! A collection runner executes one collection against one environment and
//! reports what happened as a stream of [`RunEvent`]s:
//!
//! - `BeforeRequest` for every request about to be sent
//! - `Request` for every request that completed (or failed in transport)
//! - `Done` exactly once, with the run error or summary
//!
//! [`NewmanRunner`] drives the `newman` CLI; tests use
//! [`MockCollectionRunner`](crate::testing::MockCollectionRunner).

mod error;
mod newman;
mod traits;
mod types;

pub use error::RunnerError;
pub use newman::NewmanRunner;
pub use traits::CollectionRunner;
pub use types::{RequestInfo, RunEvent, RunOptions, RunSummary};
