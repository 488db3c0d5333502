//! In-memory manifest backed by a durable store.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{ManifestEntry, ManifestError, ManifestStats, ManifestStore, Status};
use crate::catalog::Record;

/// Ordered mapping from record identifier to entry.
///
/// Every mutation is flushed to the store before the call returns.
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    index: HashMap<String, usize>,
    store: Arc<dyn ManifestStore>,
}

impl Manifest {
    /// Load the persisted manifest and add a `pending` entry for every record
    /// not yet present. Existing entries are never overwritten.
    pub fn load(store: Arc<dyn ManifestStore>, records: &[Record]) -> Result<Self, ManifestError> {
        let persisted = store.read_all()?;
        let existed = persisted.is_some();
        let mut manifest = Self {
            entries: Vec::new(),
            index: HashMap::new(),
            store,
        };

        for entry in persisted.unwrap_or_default() {
            if !entry.is_consistent() {
                warn!(id = %entry.id, status = %entry.status, "Manifest entry violates artifact invariant");
            }
            if manifest.index.contains_key(&entry.id) {
                warn!(id = %entry.id, "Duplicate manifest entry ignored");
                continue;
            }
            manifest.push(entry);
        }

        let mut added = 0usize;
        for record in records {
            if !manifest.index.contains_key(&record.id) {
                manifest.push(ManifestEntry::pending_from(record));
                added += 1;
            }
        }

        if added > 0 || !existed {
            manifest.store.write_all(&manifest.entries)?;
        }

        info!(
            location = %manifest.store.location(),
            entries = manifest.entries.len(),
            added,
            "Manifest loaded"
        );
        Ok(manifest)
    }

    fn push(&mut self, entry: ManifestEntry) {
        self.index.insert(entry.id.clone(), self.entries.len());
        self.entries.push(entry);
    }

    pub fn get(&self, id: &str) -> Option<&ManifestEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace one entry and persist it.
    pub fn upsert(&mut self, entry: ManifestEntry) -> Result<(), ManifestError> {
        let position = match self.index.get(&entry.id) {
            Some(&i) => {
                self.entries[i] = entry;
                i
            }
            None => {
                self.push(entry);
                self.entries.len() - 1
            }
        };
        self.store
            .write_entry(&self.entries, &self.entries[position])?;
        debug!(
            id = %self.entries[position].id,
            status = %self.entries[position].status,
            "Manifest entry persisted"
        );
        Ok(())
    }

    /// Entries satisfying `predicate`, in manifest order.
    pub fn query<F>(&self, predicate: F) -> Vec<&ManifestEntry>
    where
        F: Fn(&ManifestEntry) -> bool,
    {
        self.entries.iter().filter(|e| predicate(e)).collect()
    }

    pub fn count(&self, status: Status) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// Move every entry with `status` back to `pending`. Returns how many
    /// entries changed.
    pub fn reopen(&mut self, status: Status) -> Result<usize, ManifestError> {
        let mut changed = 0usize;
        for entry in self.entries.iter_mut().filter(|e| e.status == status) {
            if entry.reopen() {
                changed += 1;
            }
        }
        if changed > 0 {
            self.store.write_all(&self.entries)?;
            info!(from = %status, count = changed, "Reopened manifest entries");
        }
        Ok(changed)
    }

    pub fn stats(&self) -> ManifestStats {
        ManifestStats::from_entries(&self.entries)
    }
}
