//! Tracing subscriber setup.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use batchman_core::config::LoggingConfig;

/// Console output always, plus JSON-lines files when configured.
///
/// `combined_log` receives every record that passes the env filter,
/// `error_log` only errors. When a log file cannot be opened, console output
/// is still installed before the error is returned, so it can be reported.
pub fn init(logging: Option<&LoggingConfig>) -> Result<()> {
    let (combined, errors) = match open_sinks(logging) {
        Ok(files) => files,
        Err(e) => {
            init_console()?;
            return Err(e);
        }
    };

    let combined = combined.map(|file| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(Mutex::new(file))
    });

    let errors = errors.map(|file| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(Mutex::new(file))
            .with_filter(LevelFilter::ERROR)
    });

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(combined)
        .with(errors)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

fn init_console() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to install tracing subscriber")
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Opens the configured `(combined_log, error_log)` files.
fn open_sinks(logging: Option<&LoggingConfig>) -> Result<(Option<File>, Option<File>)> {
    let combined = logging
        .and_then(|l| l.combined_log.as_deref())
        .map(open_log)
        .transpose()?;
    let errors = logging
        .and_then(|l| l.error_log.as_deref())
        .map(open_log)
        .transpose()?;
    Ok((combined, errors))
}

fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}
