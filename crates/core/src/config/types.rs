use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Environment file shared by both phases (copied per job when isolation is on)
    pub environment: PathBuf,
    /// Datasets to process, one job each, in submission order
    pub datasets: Vec<PathBuf>,
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub delays: DelayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub isolation: IsolationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Every file that must exist before scheduling starts, in validation order.
    pub fn required_files(&self) -> Vec<&Path> {
        let mut files = vec![
            self.collections.auth.as_path(),
            self.collections.update.as_path(),
            self.environment.as_path(),
        ];
        files.extend(self.datasets.iter().map(PathBuf::as_path));
        files
    }

    /// Resolve relative paths against `base` (the config file's directory).
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        resolve(&mut self.collections.auth);
        resolve(&mut self.collections.update);
        resolve(&mut self.environment);
        self.datasets.iter_mut().for_each(|p| resolve(p));
        if let Some(dir) = self.isolation.work_dir.as_mut() {
            resolve(dir);
        }
        if let Some(path) = self.logging.combined_log.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.logging.error_log.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.metrics.export_path.as_mut() {
            resolve(path);
        }
    }
}

/// The two collections every job runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectionsConfig {
    /// Authentication collection; writes the token into the environment
    pub auth: PathBuf,
    /// Data-driven update collection, iterated over each dataset
    pub update: PathBuf,
}

/// Pacing between phases and between jobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DelayConfig {
    /// Pause between the auth and update phase of one job (milliseconds).
    #[serde(default = "default_between_phases")]
    pub between_phases_ms: u64,

    /// Pause after a job completes before its slot admits the next job (milliseconds).
    #[serde(default = "default_between_jobs")]
    pub between_jobs_ms: u64,
}

impl DelayConfig {
    pub fn between_phases(&self) -> Duration {
        Duration::from_millis(self.between_phases_ms)
    }

    pub fn between_jobs(&self) -> Duration {
        Duration::from_millis(self.between_jobs_ms)
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            between_phases_ms: default_between_phases(),
            between_jobs_ms: default_between_jobs(),
        }
    }
}

fn default_between_phases() -> u64 {
    10_000 // 10 seconds
}

fn default_between_jobs() -> u64 {
    20_000 // 20 seconds
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_max_concurrency() -> usize {
    2
}

/// Newman runner configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Path or name of the newman executable
    #[serde(default = "default_newman_path")]
    pub newman_path: PathBuf,
    /// Reporters to enable in addition to the json reporter used for parsing
    #[serde(default = "default_reporters")]
    pub reporters: Vec<String>,
    /// Extra arguments appended to every `newman run`
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            newman_path: default_newman_path(),
            reporters: default_reporters(),
            extra_args: Vec::new(),
        }
    }
}

fn default_newman_path() -> PathBuf {
    PathBuf::from("newman")
}

fn default_reporters() -> Vec<String> {
    vec!["cli".to_string()]
}

/// Per-job environment isolation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IsolationConfig {
    /// Give every job its own copy of the environment file.
    /// When disabled, concurrent jobs read and write the same file.
    #[serde(default = "default_isolation_enabled")]
    pub enabled: bool,
    /// Directory for job-scoped copies (system temp dir when unset)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            enabled: default_isolation_enabled(),
            work_dir: None,
        }
    }
}

fn default_isolation_enabled() -> bool {
    true
}

/// Log file sinks (JSON lines). Console output is always on.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub combined_log: Option<PathBuf>,
    #[serde(default)]
    pub error_log: Option<PathBuf>,
}

/// Metrics export
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Write prometheus text exposition here once the queue drains
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}
