//! SQLite-backed key-value store.
//!
//! Every persisted record lives in one `kv` row whose value is JSON:
//! - `alarms`: the ordered alarm list owned by the engine
//! - `settings`, `todos`, `events`, `notes`, `cities`, `theme`: owned by
//!   other front-end modules; carried through backups untouched

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection};

use super::data_dir;
use super::store::{decode_alarms, encode_alarms, AlarmStore, ALARMS_KEY};
use crate::alarm::Alarm;
use crate::error::StorageError;

/// SQLite database holding the persisted state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/reveille/reveille.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the
    /// database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        let path = data_dir()?.join("reveille.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_remove(&self, key: &str) -> Result<bool, StorageError> {
        let n = self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    fn kv_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut all = BTreeMap::new();
        for row in rows {
            let (k, v) = row?;
            all.insert(k, v);
        }
        Ok(all)
    }

    // ── Data manager ─────────────────────────────────────────────────

    /// Serialize every stored key to a JSON object of raw values.
    pub fn export_backup(&self) -> Result<String, StorageError> {
        let all = self.kv_all()?;
        serde_json::to_string_pretty(&all).map_err(|e| StorageError::Corrupt {
            key: "*".into(),
            message: e.to_string(),
        })
    }

    /// Overwrite stored keys from a backup produced by [`export_backup`].
    ///
    /// Keys absent from the backup are left alone. The whole import is one
    /// transaction: a malformed backup changes nothing.
    ///
    /// [`export_backup`]: Database::export_backup
    pub fn import_backup(&mut self, json: &str) -> Result<usize, StorageError> {
        let data: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|e| StorageError::Corrupt {
                key: "backup".into(),
                message: e.to_string(),
            })?;
        let tx = self.conn.transaction()?;
        for (k, v) in &data {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![k, v],
            )?;
        }
        tx.commit()?;
        Ok(data.len())
    }

    /// Delete everything.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM kv", [])?;
        Ok(())
    }

    /// Bytes used by stored keys and values.
    pub fn size_bytes(&self) -> Result<u64, StorageError> {
        let size = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv",
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(size.max(0) as u64)
    }
}

impl AlarmStore for Database {
    fn load_alarms(&self) -> Result<Vec<Alarm>, StorageError> {
        match self.kv_get(ALARMS_KEY)? {
            Some(json) => decode_alarms(&json),
            None => Ok(Vec::new()),
        }
    }

    fn save_alarms(&mut self, alarms: &[Alarm]) -> Result<(), StorageError> {
        self.kv_set(ALARMS_KEY, &encode_alarms(alarms)?)
    }

    /// SQLite `data_version`: bumped by commits from other connections
    /// (e.g. a second CLI process), never by our own.
    fn external_revision(&self) -> Result<Option<u64>, StorageError> {
        let version = self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get::<_, i64>(0))?;
        Ok(Some(version as u64))
    }
}
