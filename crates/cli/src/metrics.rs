//! Prometheus metrics for the command-line runs.
//!
//! The registry holds every core metric (phases, fetching, rotation,
//! external services) plus gauges describing the manifest after a command.
//! Runs are short-lived, so the exposition is printed on request rather
//! than served.

use once_cell::sync::Lazy;
use prometheus::{self, Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use paperchase_core::{ManifestStats, Status};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// Manifest Metrics (collected after each command)
// =============================================================================

/// Manifest entries by status.
pub static MANIFEST_ENTRIES: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "paperchase_manifest_entries",
            "Current manifest entry count by status",
        ),
        &["status"],
    )
    .unwrap()
});

/// Entries carrying a DOI.
pub static MANIFEST_WITH_DOI: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "paperchase_manifest_entries_with_doi",
        "Manifest entries with a known DOI",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(MANIFEST_ENTRIES.clone()))
        .unwrap();
    registry
        .register(Box::new(MANIFEST_WITH_DOI.clone()))
        .unwrap();

    // Core metrics (phases, fetching, rotation, external services)
    for metric in paperchase_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Update the manifest gauges from aggregate statistics.
pub fn record_manifest_stats(stats: &ManifestStats) {
    for status in Status::ALL {
        MANIFEST_ENTRIES
            .with_label_values(&[status.as_str()])
            .set(stats.count(status) as i64);
    }
    MANIFEST_WITH_DOI.set(stats.with_doi as i64);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
