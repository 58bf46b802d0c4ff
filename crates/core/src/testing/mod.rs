//! Testing utilities: a scriptable collection runner and file fixtures.
//!
//! # Example
//!
//! ```rust,ignore
//! use batchman_core::testing::{fixtures, FailureMode, MockCollectionRunner};
//!
//! let runner = MockCollectionRunner::new();
//! runner
//!     .fail_when(|options| options.iteration_data.is_none(), FailureMode::RunError("401".into()))
//!     .await;
//!
//! let config = fixtures::config(dir.path(), &[("input1", 3), ("input2", 5)]);
//! let report = BatchOrchestrator::new(config, Arc::new(runner.clone())).run().await?;
//! ```

mod mock_runner;

pub use mock_runner::{FailureMode, MockCollectionRunner, RecordedRun};

/// File fixtures for tests that need real paths on disk.
pub mod fixtures {
    use std::fs;
    use std::path::{Path, PathBuf};

    use crate::config::{
        CollectionsConfig, Config, DelayConfig, IsolationConfig, LoggingConfig, MetricsConfig,
        RunnerConfig, SchedulerConfig,
    };

    const COLLECTION: &str = r#"{"info":{"name":"fixture","schema":"https://schema.getpostman.com/json/collection/v2.1.0/collection.json"},"item":[]}"#;
    const ENVIRONMENT: &str = r#"{"name":"fixture","values":[{"key":"token","value":"","enabled":true}]}"#;

    fn write(path: &Path, contents: &str) {
        fs::write(path, contents)
            .unwrap_or_else(|e| panic!("failed to write fixture {}: {}", path.display(), e));
    }

    /// Auth and update collection files inside `dir`.
    pub fn collections(dir: &Path) -> CollectionsConfig {
        let auth = dir.join("auth.postman_collection.json");
        let update = dir.join("update.postman_collection.json");
        write(&auth, COLLECTION);
        write(&update, COLLECTION);
        CollectionsConfig { auth, update }
    }

    /// A shared environment file inside `dir`.
    pub fn environment(dir: &Path) -> PathBuf {
        let path = dir.join("env.postman_environment.json");
        write(&path, ENVIRONMENT);
        path
    }

    /// `<name>.csv` with a header line and `rows` data rows.
    pub fn dataset(dir: &Path, name: &str, rows: usize) -> PathBuf {
        let path = dir.join(format!("{}.csv", name));
        let mut contents = String::from("id,email\n");
        for i in 1..=rows {
            contents.push_str(&format!("{},user{}@example.com\n", i, i));
        }
        write(&path, &contents);
        path
    }

    /// A complete configuration with every file created and no delays.
    pub fn config(dir: &Path, datasets: &[(&str, usize)]) -> Config {
        Config {
            environment: environment(dir),
            datasets: datasets
                .iter()
                .map(|(name, rows)| dataset(dir, name, *rows))
                .collect(),
            collections: collections(dir),
            delays: DelayConfig {
                between_phases_ms: 0,
                between_jobs_ms: 0,
            },
            scheduler: SchedulerConfig::default(),
            runner: RunnerConfig::default(),
            isolation: IsolationConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
