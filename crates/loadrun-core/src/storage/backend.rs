//! Key-value backend capability

use async_trait::async_trait;

use super::error::BackendResult;

/// One concrete key-value store the orchestrator can fan out to
///
/// Values are opaque strings; encoding is the caller's concern.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Stable name used in results and health reports
    fn name(&self) -> &'static str;

    /// Read a value, `None` when the key is absent
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> BackendResult<()>;

    /// Delete a value; deleting a missing key succeeds
    async fn remove(&self, key: &str) -> BackendResult<()>;
}
