//! Manifest store - durable per-record acquisition state.
//!
//! The manifest is the single source of truth for run progress. It is keyed
//! by record identifier, preserves insertion order, and is persisted after
//! every mutation so an interrupted run resumes where it stopped.

mod json_store;
mod sqlite_store;
mod state;
mod stats;
mod store;
mod types;

pub use json_store::JsonManifestStore;
pub use sqlite_store::SqliteManifestStore;
pub use state::Manifest;
pub use stats::{ManifestStats, TOP_FAILURE_DOMAINS};
pub use store::{ManifestError, ManifestStore};
pub use types::*;

use std::path::Path;
use std::sync::Arc;

use crate::config::ManifestBackend;

/// Open the configured manifest backend.
pub fn open_store(
    backend: ManifestBackend,
    path: &Path,
) -> Result<Arc<dyn ManifestStore>, ManifestError> {
    Ok(match backend {
        ManifestBackend::Json => Arc::new(JsonManifestStore::new(path)),
        ManifestBackend::Sqlite => Arc::new(SqliteManifestStore::new(path)?),
    })
}
