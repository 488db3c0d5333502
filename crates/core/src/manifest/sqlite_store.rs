//! SQLite-backed manifest store.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, ErrorCode};

use super::{ManifestEntry, ManifestError, ManifestStore};

/// SQLite-backed manifest store. Each entry is one row; single-entry writes
/// upsert only that row.
pub struct SqliteManifestStore {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteManifestStore {
    /// Open (or create) the manifest database at `path`.
    pub fn new(path: &Path) -> Result<Self, ManifestError> {
        let location = path.display().to_string();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| map_open_error(&location, e))?;
        Self::initialize_schema(&conn, &location)?;
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, ManifestError> {
        let conn =
            Connection::open_in_memory().map_err(|e| ManifestError::Database(e.to_string()))?;
        Self::initialize_schema(&conn, ":memory:")?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
        })
    }

    fn initialize_schema(conn: &Connection, location: &str) -> Result<(), ManifestError> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;

            CREATE TABLE IF NOT EXISTS manifest_entries (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                status TEXT NOT NULL,
                entry TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_manifest_position ON manifest_entries(position);
            CREATE INDEX IF NOT EXISTS idx_manifest_status ON manifest_entries(status);
            "#,
        )
        .map_err(|e| map_open_error(location, e))
    }

    fn upsert(
        conn: &Connection,
        position: usize,
        entry: &ManifestEntry,
    ) -> Result<(), ManifestError> {
        let json =
            serde_json::to_string(entry).map_err(|e| ManifestError::Serialize(e.to_string()))?;
        conn.execute(
            r#"
            INSERT INTO manifest_entries (id, position, status, entry, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                position = excluded.position,
                status = excluded.status,
                entry = excluded.entry,
                updated_at = excluded.updated_at
            "#,
            params![
                entry.id,
                position as i64,
                entry.status.as_str(),
                json,
                entry.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| ManifestError::Database(e.to_string()))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ManifestError> {
        self.conn
            .lock()
            .map_err(|_| ManifestError::Database("connection lock poisoned".to_string()))
    }
}

fn map_open_error(location: &str, e: rusqlite::Error) -> ManifestError {
    match e.sqlite_error_code() {
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
            ManifestError::Corrupt {
                location: location.to_string(),
                reason: e.to_string(),
            }
        }
        _ => ManifestError::Database(e.to_string()),
    }
}

impl ManifestStore for SqliteManifestStore {
    fn read_all(&self) -> Result<Option<Vec<ManifestEntry>>, ManifestError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, entry FROM manifest_entries ORDER BY position ASC")
            .map_err(|e| ManifestError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| ManifestError::Database(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, json) = row.map_err(|e| ManifestError::Database(e.to_string()))?;
            let entry: ManifestEntry =
                serde_json::from_str(&json).map_err(|e| ManifestError::Corrupt {
                    location: self.location.clone(),
                    reason: format!("entry {}: {}", id, e),
                })?;
            entries.push(entry);
        }

        if entries.is_empty() {
            Ok(None)
        } else {
            Ok(Some(entries))
        }
    }

    fn write_all(&self, entries: &[ManifestEntry]) -> Result<(), ManifestError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| ManifestError::Database(e.to_string()))?;
        tx.execute("DELETE FROM manifest_entries", [])
            .map_err(|e| ManifestError::Database(e.to_string()))?;
        for (position, entry) in entries.iter().enumerate() {
            Self::upsert(&tx, position, entry)?;
        }
        tx.commit()
            .map_err(|e| ManifestError::Database(e.to_string()))?;
        Ok(())
    }

    fn write_entry(
        &self,
        entries: &[ManifestEntry],
        changed: &ManifestEntry,
    ) -> Result<(), ManifestError> {
        let position = entries
            .iter()
            .position(|e| e.id == changed.id)
            .unwrap_or(entries.len());
        let conn = self.lock()?;
        Self::upsert(&conn, position, changed)
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}
