//! Fallback orchestrator
//!
//! `Persistence` writes one logical value redundantly across every enabled
//! backend and alias key, and reads it back from the first place that still
//! has it.
//!
//! ## Priority
//!
//! 1. Primary store, every key in `[key, ...aliases]`
//! 2. Each web fallback store (web platform only), every key
//! 3. Object database (web platform only), logical key only
//!
//! ## Failure model
//!
//! Backend failures never escape `save`, `load` or `clear`. Each attempt is
//! reported as a `StorageResult`; callers judge the outcome with
//! [`is_overall_success`].
//!
//! ## Usage
//!
//! ```ignore
//! let persistence = Persistence::from_config(&config)?;
//!
//! let results = persistence.save("profile", &profile, &aliases).await;
//! if !is_overall_success(&results) {
//!     // fewer than half the writes landed
//! }
//!
//! let loaded: Option<Loaded<Profile>> = persistence.load("profile", &aliases).await;
//! ```

use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::{Config, PersistenceOptions, Platform};
use crate::keys::{KeyDerivation, UserContext};
use crate::storage::{
    FileStore, KeyValueBackend, LocalStore, ObjectDatabase, SessionStore, SCHEMA_VERSION,
};

/// Fraction of attempts that must succeed for a logical write to count
pub const SUCCESS_THRESHOLD: f64 = 0.5;

/// Logical name of the object database
pub const OBJECT_DB_NAME: &str = "loadrun";

/// Outcome of one attempt against one backend under one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageResult {
    pub success: bool,
    pub backend: &'static str,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StorageResult {
    pub fn ok(backend: &'static str, key: &str) -> Self {
        Self {
            success: true,
            backend,
            key: key.to_string(),
            error: None,
        }
    }

    pub fn failed(backend: &'static str, key: &str, error: impl ToString) -> Self {
        Self {
            success: false,
            backend,
            key: key.to_string(),
            error: Some(error.to_string()),
        }
    }
}

/// Where a loaded value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageSource {
    pub backend: &'static str,
    pub key: String,
}

/// A successfully loaded value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loaded<T> {
    pub data: T,
    pub source: StorageSource,
}

/// Whether a fan-out counts as a success
///
/// True iff at least half of the attempts succeeded. An empty result list is
/// a failure.
pub fn is_overall_success(results: &[StorageResult]) -> bool {
    if results.is_empty() {
        return false;
    }
    let successes = results.iter().filter(|r| r.success).count();
    successes as f64 / results.len() as f64 >= SUCCESS_THRESHOLD
}

#[derive(Clone, Copy)]
enum Op {
    Set,
    Remove,
}

impl Op {
    fn verb(&self) -> &'static str {
        match self {
            Op::Set => "write",
            Op::Remove => "delete",
        }
    }
}

/// Multi-backend storage facade
///
/// Built once at startup and shared by reference. Holds configuration and
/// backend handles only; all data lives in the backends.
pub struct Persistence {
    platform: Platform,
    options: PersistenceOptions,
    primary: Arc<dyn KeyValueBackend>,
    web_fallbacks: Vec<Arc<dyn KeyValueBackend>>,
    object_db: Option<Arc<dyn KeyValueBackend>>,
    derivation: KeyDerivation,
    /// Serializes read-modify-write cycles of the alias index
    pub(crate) index_lock: Mutex<()>,
}

impl Persistence {
    /// Create an orchestrator over a primary backend only
    pub fn new(
        platform: Platform,
        options: PersistenceOptions,
        primary: Arc<dyn KeyValueBackend>,
    ) -> Self {
        let derivation = KeyDerivation::new(platform, options.max_aliases);
        Self {
            platform,
            options,
            primary,
            web_fallbacks: Vec::new(),
            object_db: None,
            derivation,
            index_lock: Mutex::new(()),
        }
    }

    /// Add a web fallback store; fallbacks are tried in insertion order
    pub fn with_web_fallback(mut self, backend: Arc<dyn KeyValueBackend>) -> Self {
        self.web_fallbacks.push(backend);
        self
    }

    /// Attach the structured object database
    pub fn with_object_database(mut self, backend: Arc<dyn KeyValueBackend>) -> Self {
        self.object_db = Some(backend);
        self
    }

    /// Replace the alias derivation (e.g. to pin its clock)
    pub fn with_key_derivation(mut self, derivation: KeyDerivation) -> Self {
        self.derivation = derivation;
        self
    }

    /// Build the standard backend stack for a configuration
    ///
    /// Native: primary file store only. Web: primary, session store, local
    /// store, and the object database when enabled and it opens.
    pub fn from_config(config: &Config) -> Result<Self> {
        let primary = Arc::new(FileStore::new(config.primary_dir()));
        let mut persistence = Self::new(config.platform, config.storage.clone(), primary);

        if !config.platform.is_web() {
            return Ok(persistence);
        }

        let session = match config.storage.session_quota_bytes {
            Some(quota) => SessionStore::with_quota(quota),
            None => SessionStore::new(),
        };
        persistence = persistence
            .with_web_fallback(Arc::new(session))
            .with_web_fallback(Arc::new(LocalStore::open(config.local_storage_path())));

        if config.storage.enable_object_database {
            let db = ObjectDatabase::open_or_unavailable(
                &config.object_db_path(),
                OBJECT_DB_NAME,
                SCHEMA_VERSION,
            );
            if db.is_available() {
                persistence = persistence.with_object_database(Arc::new(db));
            }
        }

        Ok(persistence)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn options(&self) -> &PersistenceOptions {
        &self.options
    }

    pub fn key_derivation(&self) -> &KeyDerivation {
        &self.derivation
    }

    /// Every attached backend in priority order, whether enabled or not
    pub fn backends(&self) -> Vec<Arc<dyn KeyValueBackend>> {
        let mut backends = vec![self.primary.clone()];
        backends.extend(self.web_fallbacks.iter().cloned());
        backends.extend(self.object_db.iter().cloned());
        backends
    }

    pub(crate) fn primary(&self) -> &Arc<dyn KeyValueBackend> {
        &self.primary
    }

    /// Web fallbacks taking part in fan-out
    pub(crate) fn active_web_fallbacks(&self) -> &[Arc<dyn KeyValueBackend>] {
        if self.platform.is_web() && self.options.enable_web_fallbacks {
            &self.web_fallbacks
        } else {
            &[]
        }
    }

    /// Object database, when it takes part in fan-out (web platform only)
    fn active_object_db(&self) -> Option<&Arc<dyn KeyValueBackend>> {
        if self.platform.is_web() && self.options.enable_object_database {
            self.object_db.as_ref()
        } else {
            None
        }
    }

    /// `[key, ...aliases]`, or just `[key]` with backups disabled
    fn key_set(&self, key: &str, alias_keys: &[String]) -> Vec<String> {
        let mut keys = vec![key.to_string()];
        if self.options.enable_multiple_backups {
            keys.extend(alias_keys.iter().cloned());
        }
        keys
    }

    /// Persist `data` under `key` and every alias, on every enabled backend
    ///
    /// Returns one result per attempt. Never fails.
    pub async fn save<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        alias_keys: &[String],
    ) -> Vec<StorageResult> {
        let keys = self.key_set(key, alias_keys);

        let payload = match codec::encode(data, self.options.compression_enabled) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode value for '{}': {}", key, e);
                return keys
                    .iter()
                    .map(|k| StorageResult::failed(self.primary.name(), k, &e))
                    .collect();
            }
        };

        let results = self.fan_out(Op::Set, key, &keys, Some(&payload)).await;

        if self.options.alias_retention_days.is_some() {
            self.record_aliases(key, &results).await;
        }

        let successes = results.iter().filter(|r| r.success).count();
        info!(
            "Saved '{}': {}/{} writes succeeded",
            key,
            successes,
            results.len()
        );
        results
    }

    /// Retrieve the value stored under `key` or one of its aliases
    ///
    /// `None` means no backend holds a readable value, which is the normal
    /// "no data yet" outcome.
    pub async fn load<T: DeserializeOwned>(
        &self,
        key: &str,
        alias_keys: &[String],
    ) -> Option<Loaded<T>> {
        let keys = self.key_set(key, alias_keys);

        for k in &keys {
            if let Some(loaded) = self.try_load(&self.primary, k).await {
                return Some(loaded);
            }
        }

        for backend in self.active_web_fallbacks() {
            for k in &keys {
                if let Some(loaded) = self.try_load(backend, k).await {
                    return Some(loaded);
                }
            }
        }

        if let Some(db) = self.active_object_db() {
            if let Some(loaded) = self.try_load(db, key).await {
                return Some(loaded);
            }
        }

        debug!("No stored value for '{}' ({} keys searched)", key, keys.len());
        None
    }

    /// Delete `key` and every alias from every enabled backend
    ///
    /// A failed deletion does not stop the remaining ones.
    pub async fn clear(&self, key: &str, alias_keys: &[String]) -> Vec<StorageResult> {
        let keys = self.key_set(key, alias_keys);
        let results = self.fan_out(Op::Remove, key, &keys, None).await;

        if self.options.alias_retention_days.is_some() {
            // Aliases still stored somewhere stay indexed for the next GC pass
            let deleted: Vec<String> = keys[1..]
                .iter()
                .filter(|alias| {
                    results
                        .iter()
                        .filter(|r| &r.key == *alias)
                        .all(|r| r.success)
                })
                .cloned()
                .collect();
            self.forget_aliases(key, &deleted).await;
        }

        let successes = results.iter().filter(|r| r.success).count();
        info!(
            "Cleared '{}': {}/{} deletions succeeded",
            key,
            successes,
            results.len()
        );
        results
    }

    /// Save and judge the outcome with the success threshold
    pub async fn permanent_save<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        alias_keys: &[String],
    ) -> bool {
        let results = self.save(key, data, alias_keys).await;
        let ok = is_overall_success(&results);
        if !ok {
            warn!(
                "Permanent save of '{}' below threshold: {}/{}",
                key,
                results.iter().filter(|r| r.success).count(),
                results.len()
            );
        }
        ok
    }

    /// `permanent_save` with aliases derived for `user`
    pub async fn permanent_save_for<T: Serialize + ?Sized>(
        &self,
        user: &UserContext,
        key: &str,
        data: &T,
    ) -> bool {
        let aliases = self.derivation.derive(key, user);
        self.permanent_save(key, data, &aliases).await
    }

    /// `load` with aliases derived for `user`
    pub async fn permanent_load<T: DeserializeOwned>(
        &self,
        user: &UserContext,
        key: &str,
    ) -> Option<Loaded<T>> {
        let aliases = self.derivation.derive(key, user);
        self.load(key, &aliases).await
    }

    /// `clear` with aliases derived for `user`
    pub async fn permanent_clear(&self, user: &UserContext, key: &str) -> Vec<StorageResult> {
        let aliases = self.derivation.derive(key, user);
        self.clear(key, &aliases).await
    }

    /// Run one operation over every enabled backend/key pair, sequentially
    async fn fan_out(
        &self,
        op: Op,
        key: &str,
        keys: &[String],
        payload: Option<&str>,
    ) -> Vec<StorageResult> {
        let mut results = Vec::new();

        for k in keys {
            results.push(attempt(&self.primary, op, k, payload).await);
        }

        for backend in self.active_web_fallbacks() {
            for k in keys {
                results.push(attempt(backend, op, k, payload).await);
            }
        }

        // One record per logical key
        if let Some(db) = self.active_object_db() {
            results.push(attempt(db, op, key, payload).await);
        }

        results
    }

    async fn try_load<T: DeserializeOwned>(
        &self,
        backend: &Arc<dyn KeyValueBackend>,
        key: &str,
    ) -> Option<Loaded<T>> {
        let raw = match backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Read of '{}' from {} failed: {}", key, backend.name(), e);
                return None;
            }
        };

        match codec::decode(&raw) {
            Ok(data) => {
                debug!("Loaded '{}' from {}", key, backend.name());
                Some(Loaded {
                    data,
                    source: StorageSource {
                        backend: backend.name(),
                        key: key.to_string(),
                    },
                })
            }
            Err(e) => {
                warn!("Skipping undecodable '{}' in {}: {}", key, backend.name(), e);
                None
            }
        }
    }
}

async fn attempt(
    backend: &Arc<dyn KeyValueBackend>,
    op: Op,
    key: &str,
    payload: Option<&str>,
) -> StorageResult {
    let outcome = match op {
        Op::Set => backend.set(key, payload.unwrap_or_default()).await,
        Op::Remove => backend.remove(key).await,
    };

    match outcome {
        Ok(()) => {
            debug!("{} of '{}' to {} ok", op.verb(), key, backend.name());
            StorageResult::ok(backend.name(), key)
        }
        Err(e) if e.is_transient() => {
            info!(
                "{} of '{}' to {} refused, may succeed later: {}",
                op.verb(),
                key,
                backend.name(),
                e
            );
            StorageResult::failed(backend.name(), key, e)
        }
        Err(e) => {
            warn!("{} of '{}' to {} failed: {}", op.verb(), key, backend.name(), e);
            StorageResult::failed(backend.name(), key, e)
        }
    }
}
