//! Persistent browser-style store
//!
//! A single JSON object on disk holding every key, the counterpart of a
//! browser's local storage. The whole map is rewritten atomically on each
//! mutation.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use super::backend::KeyValueBackend;
use super::error::{BackendError, BackendResult};
use super::file::atomic_write;

/// JSON-file-backed key-value store
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl LocalStore {
    pub const NAME: &'static str = "local";

    /// Open the store at `path`
    ///
    /// A missing file starts empty. A corrupt file is logged and also starts
    /// empty; it is replaced on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Local store {:?} unreadable, starting empty: {}", path, e);
                BTreeMap::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Path of the backing JSON file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> BackendResult<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        atomic_write(&self.path, &json).await
    }
}

fn read_entries(path: &Path) -> BackendResult<BTreeMap<String, String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(BackendError::ReadError {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&content).map_err(|e| BackendError::Corrupt {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

#[async_trait]
impl KeyValueBackend for LocalStore {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value.to_string());

        if let Err(e) = self.persist(&entries).await {
            // Keep memory consistent with disk
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        let mut entries = self.entries.lock().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&entries).await {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("local_storage.json");

        let store = LocalStore::open(&path);
        store.set("profile", "{\"role\":\"driver\"}").await.unwrap();
        store.set("draft", "{}").await.unwrap();
        store.remove("draft").await.unwrap();
        drop(store);

        let reopened = LocalStore::open(&path);
        assert_eq!(
            reopened.get("profile").await.unwrap().as_deref(),
            Some("{\"role\":\"driver\"}")
        );
        assert!(reopened.get("draft").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty_and_recovers() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("local_storage.json");
        std::fs::write(&path, "not json {").unwrap();

        let store = LocalStore::open(&path);
        assert!(store.get("anything").await.unwrap().is_none());

        store.set("k", "v").await.unwrap();
        let reopened = LocalStore::open(&path);
        assert_eq!(reopened.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_read_entries_reports_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let err = read_entries(&path).unwrap_err();
        assert!(matches!(err, BackendError::Corrupt { .. }));
    }
}
