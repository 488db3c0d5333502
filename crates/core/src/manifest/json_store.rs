//! JSON file manifest backend.
//!
//! The file is a single JSON object keyed by record identifier. Writes go to
//! a temporary sibling file which is fsynced and then renamed over the
//! target, so a reader sees either the previous manifest or the new one.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;
use uuid::Uuid;

use super::{ManifestEntry, ManifestError, ManifestStore};

/// Manifest stored as one JSON document on disk.
pub struct JsonManifestStore {
    path: PathBuf,
}

impl JsonManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "manifest.json".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
    }
}

impl ManifestStore for JsonManifestStore {
    fn read_all(&self) -> Result<Option<Vec<ManifestEntry>>, ManifestError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let file: ManifestFile =
            serde_json::from_str(&raw).map_err(|e| ManifestError::Corrupt {
                location: self.location(),
                reason: e.to_string(),
            })?;
        Ok(Some(file.0))
    }

    fn write_all(&self, entries: &[ManifestEntry]) -> Result<(), ManifestError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let body = serde_json::to_vec_pretty(&ManifestFileRef(entries))
            .map_err(|e| ManifestError::Serialize(e.to_string()))?;

        let tmp = self.temp_path();
        let result = (|| -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            sync_parent(&self.path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), entries = entries.len(), "Wrote manifest");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Borrowed view used for serialization, preserving entry order.
struct ManifestFileRef<'a>(&'a [ManifestEntry]);

impl Serialize for ManifestFileRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(&entry.id, entry)?;
        }
        map.end()
    }
}

/// Owned form used for deserialization, keeping file order.
struct ManifestFile(Vec<ManifestEntry>);

impl<'de> Deserialize<'de> for ManifestFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = ManifestFile;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object keyed by record identifier")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, mut entry)) = access.next_entry::<String, ManifestEntry>()? {
                    // The key is authoritative for the identifier.
                    entry.id = key;
                    entries.push(entry);
                }
                Ok(ManifestFile(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Record;
    use crate::manifest::{Source, Status};
    use tempfile::TempDir;

    fn entries() -> Vec<ManifestEntry> {
        let mut b = ManifestEntry::pending_from(&Record::new("zzz", "Second"));
        b.mark_downloaded(
            Source::Unpaywall,
            "https://oa.example/b.pdf".to_string(),
            PathBuf::from("pdfs/zzz.pdf"),
        );
        vec![ManifestEntry::pending_from(&Record::new("aaa", "First")), b]
            .into_iter()
            .rev()
            .collect()
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonManifestStore::new(dir.path().join("manifest.json"));
        assert!(store.read_all().unwrap().is_none());
    }

    #[test]
    fn test_write_then_read_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = JsonManifestStore::new(dir.path().join("nested/manifest.json"));
        let written = entries();
        store.write_all(&written).unwrap();

        let read = store.read_all().unwrap().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].id, "zzz");
        assert_eq!(read[0].status, Status::Downloaded);
        assert_eq!(read[1].id, "aaa");
        assert_eq!(read, written);
    }

    #[test]
    fn test_file_is_object_keyed_by_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        let store = JsonManifestStore::new(&path);
        store.write_all(&entries()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["zzz"]["status"], "downloaded");
        assert_eq!(value["zzz"]["source"], "unpaywall");
        assert_eq!(value["aaa"]["status"], "pending");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = JsonManifestStore::new(dir.path().join("manifest.json"));
        store.write_all(&entries()).unwrap();
        store.write_all(&entries()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["manifest.json".to_string()]);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonManifestStore::new(&path);
        let err = store.read_all().unwrap_err();
        assert!(matches!(err, ManifestError::Corrupt { .. }));
        // Never repaired in place.
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }
}
