//! Primary file-backed store
//!
//! The device's persistent key-value store. Each key is one file under the
//! store directory, named by the URL-safe base64 encoding of the key so any
//! string is a valid key.
//!
//! Writes are atomic (write to temp file, sync, then rename) so a value is
//! never observed partially written.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::backend::KeyValueBackend;
use super::error::{BackendError, BackendResult};

/// Extension of value files
const VALUE_EXTENSION: &str = "val";

/// File-per-key persistent store
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub const NAME: &'static str = "primary";

    /// Create a store rooted at `dir`; the directory is created lazily
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the value files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let encoded = URL_SAFE_NO_PAD.encode(key.as_bytes());
        self.dir.join(format!("{}.{}", encoded, VALUE_EXTENSION))
    }
}

#[async_trait]
impl KeyValueBackend for FileStore {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BackendError::ReadError { path, source }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        atomic_write(&self.path_for(key), value.as_bytes()).await
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::from_io(e, path)),
        }
    }
}

/// Write data to a file atomically
///
/// 1. Write to a uniquely named temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
pub(crate) async fn atomic_write(path: &Path, data: &[u8]) -> BackendResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| BackendError::from_io(e, parent.to_path_buf()))?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| BackendError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .await
        .map_err(|e| BackendError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .await
        .map_err(|e| BackendError::from_io(e, temp_path.clone()))?;
    drop(file);

    if let Err(source) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(BackendError::AtomicWriteFailed {
            from: temp_path,
            to: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("primary"));

        assert!(store.get("session").await.unwrap().is_none());

        store.set("session", "{\"uid\":\"u1\"}").await.unwrap();
        assert_eq!(
            store.get("session").await.unwrap().as_deref(),
            Some("{\"uid\":\"u1\"}")
        );

        store.remove("session").await.unwrap();
        assert!(store.get("session").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_missing_key_succeeds() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());
        store.remove("never-written").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_with_separators_are_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());

        store.set("a/b", "slash").await.unwrap();
        store.set("a:b", "colon").await.unwrap();

        assert_eq!(store.get("a/b").await.unwrap().as_deref(), Some("slash"));
        assert_eq!(store.get("a:b").await.unwrap().as_deref(), Some("colon"));
        assert_ne!(store.path_for("a/b"), store.path_for("a:b"));
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());

        for i in 0..5 {
            store.set("draft", &i.to_string()).await.unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.get("draft").await.unwrap().as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b").join("file.val");

        atomic_write(&nested, b"test data").await.unwrap();

        assert_eq!(std::fs::read_to_string(&nested).unwrap(), "test data");
    }
}
