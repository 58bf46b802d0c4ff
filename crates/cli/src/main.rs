mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use batchman_core::{load_config, metrics, BatchOrchestrator, Config, NewmanRunner};

/// Run the auth and update collections for every configured dataset.
#[derive(Debug, Parser)]
#[command(name = "batchman", version)]
struct Cli {
    /// Maximum number of datasets processed at once (0 keeps the configured value)
    #[arg(value_name = "MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Configuration file
    #[arg(long, env = "BATCHMAN_CONFIG", default_value = "batchman.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        if tracing::dispatcher::has_been_set() {
            error!("Fatal error: {:#}", e);
        } else {
            eprintln!("Fatal error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // File sinks come from the config, so load it before installing the subscriber
    let loaded = load_config(&cli.config);
    logging::init(loaded.as_ref().ok().map(|config| &config.logging))?;

    info!("Loading configuration from {:?}", cli.config);
    let mut config =
        loaded.with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    apply_overrides(&mut config, &cli);

    info!(
        datasets = config.datasets.len(),
        max_concurrency = config.scheduler.max_concurrency,
        between_phases_ms = config.delays.between_phases_ms,
        between_jobs_ms = config.delays.between_jobs_ms,
        "Configuration loaded successfully"
    );

    let runner = Arc::new(NewmanRunner::new(config.runner.clone()));
    let export_path = config.metrics.export_path.clone();
    let orchestrator = BatchOrchestrator::new(config, runner);

    let report = orchestrator
        .run()
        .await
        .context("Batch could not be started")?;

    if let Some(path) = export_path {
        export_metrics(&path).await;
    }

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Batch finished"
    );
    Ok(())
}

/// Writes the metrics exposition after the queue drained.
///
/// A drained batch exits 0, so a failed export is only logged.
async fn export_metrics(path: &Path) -> bool {
    match write_metrics(path).await {
        Ok(()) => {
            info!("Metrics written to {:?}", path);
            true
        }
        Err(e) => {
            error!("Metrics export failed: {:#}", e);
            false
        }
    }
}

async fn write_metrics(path: &Path) -> Result<()> {
    let text = metrics::encode_metrics().context("Failed to encode metrics")?;
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write metrics to {:?}", path))
}

/// The positional argument wins over the configured concurrency unless it is 0.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    match cli.max_concurrency {
        Some(0) => warn!(
            configured = config.scheduler.max_concurrency,
            "MAX_CONCURRENCY must be positive; keeping configured value"
        ),
        Some(n) => config.scheduler.max_concurrency = n,
        None => {}
    }
}
