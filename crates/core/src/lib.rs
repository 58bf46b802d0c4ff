pub mod config;
pub mod dataset;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod runner;
pub mod scheduler;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, validate_files, Config, ConfigError,
};
pub use dataset::{count_iterations, DatasetError, InputDataset};
pub use job::{JobError, JobPipeline, JobSpec, PhaseExecutor, PhaseKind, RunOutcome};
pub use orchestrator::{BatchOrchestrator, OrchestratorError};
pub use runner::{CollectionRunner, NewmanRunner, RunEvent, RunOptions, RunnerError};
pub use scheduler::{JobReport, JobState, QueueSnapshot, Scheduler, SchedulerReport};
