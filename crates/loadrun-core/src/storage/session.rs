//! Session-scoped store
//!
//! In-memory map that lives as long as the process, the counterpart of a
//! browser's session storage. An optional byte quota makes writes fail the
//! way a full browser store does.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::backend::KeyValueBackend;
use super::error::{BackendError, BackendResult};

/// In-memory, process-lifetime key-value store
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl SessionStore {
    pub const NAME: &'static str = "session";

    /// Create an unbounded session store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session store refusing writes past `quota_bytes`
    ///
    /// Usage counts key and value bytes.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueBackend for SessionStore {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| BackendError::Poisoned(Self::NAME))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BackendError::Poisoned(Self::NAME))?;

        if let Some(limit) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = used + key.len() + value.len();
            if needed > limit {
                return Err(BackendError::QuotaExceeded {
                    backend: Self::NAME,
                    used: needed,
                    limit,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BackendError::Poisoned(Self::NAME))?;
        entries.remove(key);
        Ok(())
    }
}
