//! Alias garbage collection
//!
//! Derived aliases are never deleted by `save`, so without bookkeeping they
//! pile up forever (a new `:day:` alias appears every day). When a retention
//! window is configured, every save records the aliases it wrote in an index
//! kept in the primary store, and `collect_garbage` deletes aliases that have
//! not been rewritten within the window.
//!
//! Logical keys are never collected.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec;
use crate::persistence::{Persistence, StorageResult};
use crate::storage::{BackendError, BackendResult};

/// Reserved primary-store key holding the alias index
pub const ALIAS_INDEX_KEY: &str = "__loadrun_alias_index__";

/// Logical key -> alias -> last successful write (unix millis)
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasIndex {
    pub entries: BTreeMap<String, BTreeMap<String, i64>>,
}

impl AliasIndex {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total aliases tracked across all logical keys
    pub fn alias_count(&self) -> usize {
        self.entries.values().map(|aliases| aliases.len()).sum()
    }

    fn touch(&mut self, key: &str, alias: &str, at: DateTime<Utc>) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .insert(alias.to_string(), at.timestamp_millis());
    }

    fn forget(&mut self, key: &str, alias: &str) {
        if let Some(aliases) = self.entries.get_mut(key) {
            aliases.remove(alias);
            if aliases.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Latest write of each alias across every logical key sharing it
    fn latest_writes(&self) -> BTreeMap<String, i64> {
        let mut latest: BTreeMap<String, i64> = BTreeMap::new();
        for aliases in self.entries.values() {
            for (alias, &written) in aliases {
                let entry = latest.entry(alias.clone()).or_insert(written);
                *entry = (*entry).max(written);
            }
        }
        latest
    }

    /// `(logical key, alias)` pairs last written before `cutoff`
    fn stale(&self, cutoff: DateTime<Utc>) -> Vec<(String, String)> {
        let cutoff = cutoff.timestamp_millis();
        self.entries
            .iter()
            .flat_map(|(key, aliases)| {
                aliases
                    .iter()
                    .filter(move |&(_, &written)| written < cutoff)
                    .map(move |(alias, _)| (key.clone(), alias.clone()))
            })
            .collect()
    }
}

/// Outcome of a garbage collection pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct GcReport {
    /// Aliases tracked when the pass started
    pub examined: usize,
    /// Aliases deleted from every backend
    pub removed: usize,
    /// Stale aliases at least one backend refused to delete (kept for retry)
    pub failed: usize,
    /// Stale entries dropped without deleting, as the alias is still written
    /// under another logical key
    pub released: usize,
}

impl Persistence {
    /// Read the alias index; missing means empty
    ///
    /// A read failure or an undecodable index is an error, so callers never
    /// replace an index they could not see.
    pub async fn alias_index(&self) -> BackendResult<AliasIndex> {
        match self.primary().get(ALIAS_INDEX_KEY).await? {
            Some(raw) => codec::decode(&raw).map_err(|e| BackendError::Corrupt {
                path: ALIAS_INDEX_KEY.into(),
                details: e.to_string(),
            }),
            None => Ok(AliasIndex::default()),
        }
    }

    /// `alias_index`, logging and giving up on failure
    async fn readable_alias_index(&self, purpose: &str) -> Option<AliasIndex> {
        match self.alias_index().await {
            Ok(index) => Some(index),
            Err(e) => {
                warn!("Alias index unavailable, skipping {}: {}", purpose, e);
                None
            }
        }
    }

    async fn write_alias_index(&self, index: &AliasIndex) {
        let outcome = if index.is_empty() {
            self.primary().remove(ALIAS_INDEX_KEY).await
        } else {
            match codec::encode(index, false) {
                Ok(raw) => self.primary().set(ALIAS_INDEX_KEY, &raw).await,
                Err(e) => {
                    warn!("Failed to encode alias index: {}", e);
                    return;
                }
            }
        };

        if let Err(e) = outcome {
            warn!("Failed to write alias index: {}", e);
        }
    }

    /// Record aliases that received at least one successful write
    pub(crate) async fn record_aliases(&self, key: &str, results: &[StorageResult]) {
        let mut written: Vec<&str> = results
            .iter()
            .filter(|r| r.success && r.key != key)
            .map(|r| r.key.as_str())
            .collect();
        written.sort_unstable();
        written.dedup();
        if written.is_empty() {
            return;
        }

        let now = self.key_derivation().now();
        let _guard = self.index_lock.lock().await;
        let Some(mut index) = self.readable_alias_index("alias tracking").await else {
            return;
        };
        for alias in written {
            index.touch(key, alias, now);
        }
        self.write_alias_index(&index).await;
    }

    /// Drop cleared aliases from the index
    pub(crate) async fn forget_aliases(&self, key: &str, aliases: &[String]) {
        if aliases.is_empty() {
            return;
        }

        let _guard = self.index_lock.lock().await;
        let Some(mut index) = self.readable_alias_index("alias cleanup").await else {
            return;
        };
        for alias in aliases {
            index.forget(key, alias);
        }
        self.write_alias_index(&index).await;
    }

    /// Delete aliases not rewritten within the retention window
    ///
    /// Does nothing when no retention window is configured. An alias is only
    /// dropped from the index once every key-value backend deleted it, and is
    /// never deleted while another logical key wrote it within the window.
    pub async fn collect_garbage(&self, now: DateTime<Utc>) -> GcReport {
        let Some(days) = self.options().alias_retention_days else {
            debug!("Alias retention not configured, skipping garbage collection");
            return GcReport::default();
        };
        let cutoff = now - Duration::days(i64::from(days));

        let _guard = self.index_lock.lock().await;
        let Some(mut index) = self.readable_alias_index("garbage collection").await else {
            return GcReport::default();
        };
        let mut report = GcReport {
            examined: index.alias_count(),
            ..GcReport::default()
        };

        let mut backends = vec![self.primary().clone()];
        backends.extend(self.active_web_fallbacks().iter().cloned());

        let latest = index.latest_writes();
        // Alias -> whether every backend deleted it, one attempt per alias
        let mut deleted: BTreeMap<String, bool> = BTreeMap::new();

        for (key, alias) in index.stale(cutoff) {
            let shared_and_fresh = latest
                .get(&alias)
                .is_some_and(|&written| written >= cutoff.timestamp_millis());
            if shared_and_fresh || index.entries.contains_key(&alias) {
                debug!("Keeping '{}', still live outside '{}'", alias, key);
                index.forget(&key, &alias);
                report.released += 1;
                continue;
            }

            let all_removed = match deleted.get(&alias) {
                Some(&all_removed) => all_removed,
                None => {
                    let mut all_removed = true;
                    for backend in &backends {
                        if let Err(e) = backend.remove(&alias).await {
                            warn!("GC of '{}' in {} failed: {}", alias, backend.name(), e);
                            all_removed = false;
                        }
                    }
                    deleted.insert(alias.clone(), all_removed);
                    all_removed
                }
            };

            if all_removed {
                index.forget(&key, &alias);
                report.removed += 1;
            } else {
                report.failed += 1;
            }
        }

        self.write_alias_index(&index).await;
        info!(
            "Alias GC: examined {}, removed {}, released {}, failed {}",
            report.examined, report.removed, report.released, report.failed
        );
        report
    }
}
