//! Structured object database
//!
//! SQLite-backed object store, the counterpart of a browser's object
//! database. Opened by name and schema version; each record carries the time
//! of its last write. A database that failed to open stays around as an
//! unavailable handle whose calls all fail with `BackendError::Unavailable`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::backend::KeyValueBackend;
use super::error::{BackendError, BackendResult};
use super::schema::{init_schema, needs_init};

/// SQLite object store
pub struct ObjectDatabase {
    conn: Option<Mutex<Connection>>,
    name: String,
    version: i32,
}

impl std::fmt::Debug for ObjectDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDatabase")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("available", &self.is_available())
            .finish()
    }
}

impl ObjectDatabase {
    pub const NAME: &'static str = "object_db";

    /// Open or create the database at `path`
    pub fn open(path: &Path, name: &str, version: i32) -> BackendResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BackendError::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn, name, version)
    }

    /// Open the database, or return an unavailable handle when that fails
    pub fn open_or_unavailable(path: &Path, name: &str, version: i32) -> Self {
        match Self::open(path, name, version) {
            Ok(db) => db,
            Err(e) => {
                warn!("Object database {:?} unavailable: {}", path, e);
                Self::unavailable(name, version)
            }
        }
    }

    /// Handle for a database that could not be opened
    pub fn unavailable(name: &str, version: i32) -> Self {
        Self {
            conn: None,
            name: name.to_string(),
            version,
        }
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(name: &str, version: i32) -> BackendResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, name, version)
    }

    fn with_connection(conn: Connection, name: &str, version: i32) -> BackendResult<Self> {
        if needs_init(&conn, version) {
            init_schema(&conn, name, version)?;
        }

        Ok(Self {
            conn: Some(Mutex::new(conn)),
            name: name.to_string(),
            version,
        })
    }

    /// Whether the connection opened
    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    /// Logical database name
    pub fn db_name(&self) -> &str {
        &self.name
    }

    /// Schema version the database was opened with
    pub fn version(&self) -> i32 {
        self.version
    }

    fn conn(&self) -> BackendResult<MutexGuard<'_, Connection>> {
        self.conn
            .as_ref()
            .ok_or(BackendError::Unavailable(Self::NAME))?
            .lock()
            .map_err(|_| BackendError::Poisoned(Self::NAME))
    }

    /// Insert or replace a record
    pub fn put(&self, key: &str, value: &str) -> BackendResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO objects (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Fetch a record's value
    pub fn fetch(&self, key: &str) -> BackendResult<Option<String>> {
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM objects WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Delete a record
    pub fn delete(&self, key: &str) -> BackendResult<()> {
        self.conn()?
            .execute("DELETE FROM objects WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Number of stored records
    pub fn count(&self) -> BackendResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl KeyValueBackend for ObjectDatabase {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.fetch(key)
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        self.put(key, value)
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        self.delete(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::SCHEMA_VERSION;
    use tempfile::TempDir;

    #[test]
    fn test_put_fetch_delete() {
        let db = ObjectDatabase::open_in_memory("loadrun", SCHEMA_VERSION).unwrap();

        db.put("wallet", "{\"balance\":0}").unwrap();
        db.put("wallet", "{\"balance\":5}").unwrap();
        assert_eq!(db.count().unwrap(), 1);
        assert_eq!(
            db.fetch("wallet").unwrap().as_deref(),
            Some("{\"balance\":5}")
        );

        db.delete("wallet").unwrap();
        assert!(db.fetch("wallet").unwrap().is_none());
    }

    #[test]
    fn test_reopen_file_database() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("objects.db");

        {
            let db = ObjectDatabase::open(&path, "loadrun", SCHEMA_VERSION).unwrap();
            db.put("k", "v").unwrap();
        }

        let db = ObjectDatabase::open(&path, "loadrun", SCHEMA_VERSION).unwrap();
        assert_eq!(db.fetch("k").unwrap().as_deref(), Some("v"));
        assert_eq!(db.db_name(), "loadrun");
        assert_eq!(db.version(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_unopenable_database_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the database file should be
        let path = temp_dir.path().join("objects.db");
        std::fs::create_dir_all(&path).unwrap();

        let db = ObjectDatabase::open_or_unavailable(&path, "loadrun", SCHEMA_VERSION);
        assert!(!db.is_available());
        assert_eq!(db.db_name(), "loadrun");

        let err = db.set("k", "v").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable("object_db")));
        assert!(db.get("k").await.is_err());
        assert!(db.count().is_err());
    }

    #[test]
    fn test_opened_database_is_available() {
        let db = ObjectDatabase::open_in_memory("loadrun", SCHEMA_VERSION).unwrap();
        assert!(db.is_available());
    }

    #[tokio::test]
    async fn test_backend_trait() {
        let db = ObjectDatabase::open_in_memory("loadrun", SCHEMA_VERSION).unwrap();
        let backend: &dyn KeyValueBackend = &db;

        backend.set("k", "v").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
        backend.remove("k").await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
    }
}
