use std::path::Path;

use super::{types::Config, ConfigError};

/// Validate configuration values.
/// Currently validates:
/// - Collections section exists (enforced by serde)
/// - Collection and environment paths are not empty
/// - At least one dataset is configured
/// - Scheduler concurrency is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let named = [
        ("collections.auth", config.collections.auth.as_path()),
        ("collections.update", config.collections.update.as_path()),
        ("environment", config.environment.as_path()),
    ];
    for (key, path) in named {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(format!("{} cannot be empty", key)));
        }
    }

    if config.datasets.is_empty() {
        return Err(ConfigError::ValidationError(
            "datasets must list at least one file".to_string(),
        ));
    }

    if config.scheduler.max_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_concurrency cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// Check that every file the run depends on is accessible.
///
/// Fails on the first missing path, in the order given by [`Config::required_files`].
pub async fn validate_files(config: &Config) -> Result<(), ConfigError> {
    for path in config.required_files() {
        check_accessible(path).await?;
    }
    Ok(())
}

async fn check_accessible(path: &Path) -> Result<(), ConfigError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(ConfigError::ValidationError(format!(
            "Not a regular file: {}",
            path.display()
        ))),
        Err(_) => Err(ConfigError::FileNotFound(path.display().to_string())),
    }
}
