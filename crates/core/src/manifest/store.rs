//! Manifest persistence trait and error type.

use thiserror::Error;

use super::ManifestEntry;

/// Error type for manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The persisted manifest exists but cannot be parsed. Never repaired
    /// automatically; the caller decides what to do with the file.
    #[error("manifest at {location} is corrupt: {reason}")]
    Corrupt { location: String, reason: String },

    #[error("manifest I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest database error: {0}")]
    Database(String),

    #[error("failed to serialize manifest: {0}")]
    Serialize(String),
}

/// Durable storage backend for the manifest.
///
/// Every write must be durable before returning: a crash right after a write
/// may lose only that write, never earlier state.
pub trait ManifestStore: Send + Sync {
    /// Read every persisted entry in stored order. `Ok(None)` when nothing
    /// has been persisted yet.
    fn read_all(&self) -> Result<Option<Vec<ManifestEntry>>, ManifestError>;

    /// Atomically replace the whole persisted manifest.
    fn write_all(&self, entries: &[ManifestEntry]) -> Result<(), ManifestError>;

    /// Persist after a single-entry change. `entries` is the complete
    /// manifest including the changed entry.
    fn write_entry(
        &self,
        entries: &[ManifestEntry],
        _changed: &ManifestEntry,
    ) -> Result<(), ManifestError> {
        self.write_all(entries)
    }

    /// Human readable location, used in logs and errors.
    fn location(&self) -> String;
}
