//! Prometheus metrics for batch runs.
//!
//! This module provides metrics for:
//! - Jobs (results, durations, jobs in flight)
//! - Phases (auth/update results and durations)
//! - Requests reported by the collection runner

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Registry holding every batchman metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        // Only fails on duplicate names, which all_metrics() never yields
        let _ = registry.register(metric);
    }
    registry
});

// =============================================================================
// Job Metrics
// =============================================================================

/// Jobs finished, by result.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("batchman_jobs_total", "Total jobs that reached a terminal state"),
        &["result"], // "succeeded", "failed"
    )
    .unwrap()
});

/// Job duration in seconds (delays included).
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("batchman_job_duration_seconds", "Duration of a full job")
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["result"],
    )
    .unwrap()
});

/// Jobs currently holding a concurrency slot.
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("batchman_jobs_running", "Number of jobs currently running").unwrap()
});

// =============================================================================
// Phase Metrics
// =============================================================================

/// Phases executed, by phase and result.
pub static PHASES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("batchman_phases_total", "Total phase executions"),
        &["phase", "result"], // phase: "auth", "update"; result: "success", "failure"
    )
    .unwrap()
});

/// Phase duration in seconds.
pub static PHASE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("batchman_phase_duration_seconds", "Duration of one phase")
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]),
        &["phase"],
    )
    .unwrap()
});

/// Requests reported by the runner, by phase and result.
pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("batchman_requests_total", "Total requests sent by collection runs"),
        &["phase", "result"], // result: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(JOBS_RUNNING.clone()),
        Box::new(PHASES_TOTAL.clone()),
        Box::new(PHASE_DURATION.clone()),
        Box::new(REQUESTS_TOTAL.clone()),
    ]
}

/// Encode the registry in the prometheus text exposition format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_registered_metrics() {
        PHASES_TOTAL.with_label_values(&["auth", "success"]).inc();
        JOBS_TOTAL.with_label_values(&["succeeded"]).inc();

        let text = encode_metrics().unwrap();
        assert!(text.contains("batchman_phases_total"));
        assert!(text.contains("batchman_jobs_total"));
    }

    #[test]
    fn test_all_metrics_count() {
        assert_eq!(all_metrics().len(), 6);
    }
}
