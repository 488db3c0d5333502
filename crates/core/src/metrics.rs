//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Phases (per-record outcomes, records processed)
//! - Fetching (downloads, bytes, retries)
//! - Rotation (attempts by trigger and result)
//! - External services (lookup calls by service and status)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Phase Metrics
// =============================================================================

/// Per-record outcomes by phase.
pub static PHASE_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "paperchase_phase_outcomes_total",
            "Strategy outcomes by phase",
        ),
        &["phase", "outcome"], // outcome: "success", "not_found", "transient", "rate_limited", "permanent"
    )
    .unwrap()
});

/// Manifest status transitions.
pub static STATUS_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "paperchase_status_transitions_total",
            "Manifest entry status transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

/// Identifiers added by enrichment.
pub static IDENTIFIERS_ENRICHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "paperchase_identifiers_enriched_total",
            "External identifiers added to manifest entries",
        ),
        &["origin"], // origin: "disclaimer", "citation_graph"
    )
    .unwrap()
});

// =============================================================================
// Fetch Metrics
// =============================================================================

/// Download attempts by result.
pub static DOWNLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("paperchase_downloads_total", "Total download attempts"),
        &["result"], // result: "success", "fetch_error", "invalid", "write_error"
    )
    .unwrap()
});

/// Bytes stored as validated artifacts.
pub static DOWNLOAD_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "paperchase_download_bytes_total",
        "Total bytes of stored PDF artifacts",
    )
    .unwrap()
});

/// Duration of successful downloads.
pub static DOWNLOAD_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "paperchase_download_duration_seconds",
            "Duration of successful downloads",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .unwrap()
});

/// Retries issued by the backoff policy.
pub static RETRY_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "paperchase_retry_attempts_total",
        "Retries issued after transient failures",
    )
    .unwrap()
});

// =============================================================================
// Rotation Metrics
// =============================================================================

/// Rotation attempts by trigger and result.
pub static ROTATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("paperchase_rotations_total", "VPN rotation attempts"),
        &["trigger", "result"], // trigger: "proactive", "reactive", "bootstrap"; result: "success", "failure", "skipped_degraded"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External lookup requests.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "paperchase_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "status"], // status: "success", "not_found", "rate_limited", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Phases
        Box::new(PHASE_OUTCOMES.clone()),
        Box::new(STATUS_TRANSITIONS.clone()),
        Box::new(IDENTIFIERS_ENRICHED.clone()),
        // Fetch
        Box::new(DOWNLOADS_TOTAL.clone()),
        Box::new(DOWNLOAD_BYTES.clone()),
        Box::new(DOWNLOAD_DURATION.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        // Rotation
        Box::new(ROTATIONS.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn test_all_metrics_register_without_conflicts() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        ROTATIONS.with_label_values(&["proactive", "success"]).inc();
        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"paperchase_rotations_total".to_string()));
    }
}
