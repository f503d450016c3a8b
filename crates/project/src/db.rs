use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{AssetDurationLookup, AssetExistenceChecker, PersistenceError, PersistenceStore};

/// SQLite-backed store for timeline documents and known assets.
pub struct ProjectDb {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl ProjectDb {
    pub fn open_or_create(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let _ = conn.pragma_update(None, "cache_size", "-8000"); // ~8MB page cache
        apply_migrations(&conn)?;
        debug!(path = %path.display(), "opened project database");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get_timeline_json(&self, asset_key: &str) -> Result<Option<String>, PersistenceError> {
        let conn = self.conn.lock();
        let json = conn
            .query_row(
                "SELECT json FROM timelines WHERE asset_key = ?1 LIMIT 1",
                params![asset_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json)
    }

    pub fn upsert_timeline_json(&self, asset_key: &str, json: &str) -> Result<(), PersistenceError> {
        let now = chrono::Utc::now().timestamp();
        self.conn.lock().execute(
            "INSERT INTO timelines(asset_key, json, updated_at) VALUES(?1, ?2, ?3)
             ON CONFLICT(asset_key) DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at",
            params![asset_key, json, now],
        )?;
        Ok(())
    }

    pub fn delete_timeline(&self, asset_key: &str) -> Result<bool, PersistenceError> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM timelines WHERE asset_key = ?1", params![asset_key])?;
        Ok(n > 0)
    }

    /// Stored keys, most recently saved first.
    pub fn list_timeline_keys(&self) -> Result<Vec<String>, PersistenceError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT asset_key FROM timelines ORDER BY updated_at DESC, asset_key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn upsert_asset(&self, path: &str, duration_seconds: Option<f64>) -> Result<(), PersistenceError> {
        let now = chrono::Utc::now().timestamp();
        self.conn.lock().execute(
            "INSERT INTO assets(path, duration_seconds, updated_at) VALUES(?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET duration_seconds = excluded.duration_seconds, updated_at = excluded.updated_at",
            params![path, duration_seconds, now],
        )?;
        Ok(())
    }

    pub fn has_asset(&self, path: &str) -> Result<bool, PersistenceError> {
        let found: Option<i64> = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM assets WHERE path = ?1 LIMIT 1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_asset_duration(&self, path: &str) -> Result<Option<f64>, PersistenceError> {
        let duration: Option<Option<f64>> = self
            .conn
            .lock()
            .query_row(
                "SELECT duration_seconds FROM assets WHERE path = ?1 ORDER BY updated_at DESC LIMIT 1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(duration.flatten())
    }

    pub fn applied_migrations(&self) -> Result<Vec<String>, PersistenceError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM migrations ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

impl PersistenceStore for ProjectDb {
    fn load_raw(&self, asset_key: &str) -> Result<Option<Value>, PersistenceError> {
        let Some(json) = self.get_timeline_json(asset_key)? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&json).map_err(|source| PersistenceError::Corrupt {
            key: asset_key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn save_raw(&self, asset_key: &str, document: &Value) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(document)?;
        self.upsert_timeline_json(asset_key, &json)
    }
}

impl AssetExistenceChecker for ProjectDb {
    fn exists(&self, file_path: &str) -> bool {
        if file_path.is_empty() {
            return false;
        }
        match self.has_asset(file_path) {
            Ok(found) => found,
            Err(e) => {
                warn!(path = file_path, error = %e, "asset lookup failed");
                false
            }
        }
    }
}

impl AssetDurationLookup for ProjectDb {
    fn duration_seconds(&self, asset_key: &str) -> Option<f64> {
        match self.get_asset_duration(asset_key) {
            Ok(duration) => duration,
            Err(e) => {
                warn!(asset = asset_key, error = %e, "could not fetch asset duration");
                None
            }
        }
    }
}

fn apply_migrations(conn: &Connection) -> Result<(), PersistenceError> {
    // Simple migration tracking by name
    conn.execute_batch(include_str!("../migrations/V0001__init.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0001__init"],
    )?;
    conn.execute_batch(include_str!("../migrations/V0002__timelines_updated_index.sql"))?;
    conn.execute(
        "INSERT OR IGNORE INTO migrations(name, applied_at) VALUES(?1, strftime('%s','now'))",
        params!["V0002__timelines_updated_index"],
    )?;
    Ok(())
}
