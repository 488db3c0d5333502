//! Shared setup for pipeline integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use paperchase_core::config::Config;
use paperchase_core::manifest::{JsonManifestStore, Manifest, ManifestStore};
use paperchase_core::Record;

/// Configuration with every delay at zero and artifacts under `dir`.
pub fn fast_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.manifest.path = dir.join("manifest.json");
    config.download.artifact_dir = dir.join("pdfs");
    config.download.max_retries = 3;
    config.download.base_backoff_ms = 1;
    config.download.max_backoff_ms = 2;
    config.download.delay_ms = 0;
    config.unpaywall.email = Some("test@example.org".to_string());
    config.unpaywall.delay_ms = 0;
    config.s2_api.delay_ms = 0;
    config.crossref.delay_ms = 0;
    config.scholar.delay_ms = 0;
    config.core.delay_ms = 0;
    config.europepmc.delay_ms = 0;
    config.arxiv.delay_ms = 0;
    config.scholar.delay_after_rotation_ms = 0;
    config.vpn.min_rotation_interval_secs = 0;
    config.vpn.post_connect_delay_secs = 0;
    config.vpn.verify_ip_change = false;
    config
}

pub fn json_store(dir: &Path) -> Arc<dyn ManifestStore> {
    Arc::new(JsonManifestStore::new(dir.join("manifest.json")))
}

pub fn load_manifest(dir: &Path, records: &[Record]) -> Manifest {
    Manifest::load(json_store(dir), records).unwrap()
}

/// Bare records `r00`, `r01`, ... with distinct titles.
pub fn bare_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::new(format!("r{:02}", i), format!("Untitled study {}", i)))
        .collect()
}
