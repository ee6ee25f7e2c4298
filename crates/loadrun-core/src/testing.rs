//! Test doubles shared by the unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage::{BackendError, BackendResult, KeyValueBackend, SessionStore};

/// In-memory backend that can be told to fail and records the keys it saw
pub struct FlakyBackend {
    name: &'static str,
    inner: SessionStore,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    fail_remove: AtomicBool,
    set_keys: Mutex<Vec<String>>,
    removed_keys: Mutex<Vec<String>>,
}

impl FlakyBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: SessionStore::new(),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            set_keys: Mutex::new(Vec::new()),
            removed_keys: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call
    pub fn broken(name: &'static str) -> Self {
        let backend = Self::new(name);
        backend.fail_all(true);
        backend
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
        self.fail_set.store(fail, Ordering::SeqCst);
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Keys passed to `set`, in call order, including failed calls
    pub fn set_keys(&self) -> Vec<String> {
        self.set_keys.lock().unwrap().clone()
    }

    /// Keys passed to `remove`, in call order, including failed calls
    pub fn removed_keys(&self) -> Vec<String> {
        self.removed_keys.lock().unwrap().clone()
    }

    /// Read straight from the underlying map, bypassing failure injection
    pub async fn peek(&self, key: &str) -> Option<String> {
        self.inner.get(key).await.unwrap()
    }

    /// Write straight to the underlying map, bypassing failure injection
    pub async fn plant(&self, key: &str, value: &str) {
        self.inner.set(key, value).await.unwrap()
    }

    /// Delete straight from the underlying map, bypassing failure injection
    pub async fn erase(&self, key: &str) {
        self.inner.remove(key).await.unwrap()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl KeyValueBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(self.name));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        self.set_keys.lock().unwrap().push(key.to_string());
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(self.name));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        self.removed_keys.lock().unwrap().push(key.to_string());
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(self.name));
        }
        self.inner.remove(key).await
    }
}
