//! Storage health probing
//!
//! Reports which backends accept writes right now. Purely diagnostic: the
//! orchestrator never consults it.

use serde::Serialize;
use tracing::debug;

use crate::config::Platform;
use crate::persistence::Persistence;
use crate::storage::KeyValueBackend;

/// Key used for throwaway probe writes, never an application key
pub const PROBE_KEY: &str = "__loadrun_storage_probe__";

/// Value written by the probe
pub const PROBE_VALUE: &str = "probe";

/// Availability of one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    pub backend: &'static str,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time availability snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub platform: Platform,
    pub backends: Vec<BackendHealth>,
    /// Number of available backends
    pub total_capabilities: usize,
}

impl HealthReport {
    /// Availability of a backend by name, `None` if it is not attached
    pub fn is_available(&self, backend: &str) -> Option<bool> {
        self.backends
            .iter()
            .find(|b| b.backend == backend)
            .map(|b| b.available)
    }
}

/// Write-then-delete the probe key; available only if both succeed
pub async fn probe_backend(backend: &dyn KeyValueBackend) -> BackendHealth {
    let outcome = match backend.set(PROBE_KEY, PROBE_VALUE).await {
        Ok(()) => backend.remove(PROBE_KEY).await,
        Err(e) => Err(e),
    };

    let health = match outcome {
        Ok(()) => BackendHealth {
            backend: backend.name(),
            available: true,
            error: None,
        },
        Err(e) => BackendHealth {
            backend: backend.name(),
            available: false,
            error: Some(e.to_string()),
        },
    };
    debug!(
        "Probe {}: {}",
        health.backend,
        if health.available { "ok" } else { "unavailable" }
    );
    health
}

impl Persistence {
    /// Probe every attached backend
    ///
    /// Recomputed on every call, never cached.
    pub async fn probe(&self) -> HealthReport {
        let mut backends = Vec::new();
        for backend in self.backends() {
            backends.push(probe_backend(backend.as_ref()).await);
        }

        let total_capabilities = backends.iter().filter(|b| b.available).count();
        HealthReport {
            platform: self.platform(),
            backends,
            total_capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistenceOptions;
    use crate::persistence::Loaded;
    use crate::testing::FlakyBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_probe_reports_each_backend() {
        let primary = Arc::new(FlakyBackend::new("primary"));
        let session = Arc::new(FlakyBackend::broken("session"));
        let local = Arc::new(FlakyBackend::new("local"));
        let persistence = Persistence::new(Platform::Web, PersistenceOptions::default(), primary)
            .with_web_fallback(session)
            .with_web_fallback(local);

        let report = persistence.probe().await;

        assert_eq!(report.platform, Platform::Web);
        assert_eq!(report.backends.len(), 3);
        assert_eq!(report.total_capabilities, 2);
        assert_eq!(report.is_available("primary"), Some(true));
        assert_eq!(report.is_available("session"), Some(false));
        assert!(report.backends[1].error.is_some());
        assert_eq!(report.is_available("object_db"), None);
    }

    #[tokio::test]
    async fn test_remove_failure_means_unavailable() {
        let backend = FlakyBackend::new("primary");
        backend.fail_remove(true);

        let health = probe_backend(&backend).await;
        assert!(!health.available);
    }

    #[tokio::test]
    async fn test_probe_leaves_no_residue() {
        let primary = Arc::new(FlakyBackend::new("primary"));
        let persistence = Persistence::new(
            Platform::Native,
            PersistenceOptions::default(),
            primary.clone(),
        );
        persistence.save("profile", "driver", &[]).await;

        for _ in 0..3 {
            persistence.probe().await;
        }

        assert!(primary.peek(PROBE_KEY).await.is_none());
        assert_eq!(primary.len(), 1);
        let loaded: Loaded<String> = persistence.load("profile", &[]).await.unwrap();
        assert_eq!(loaded.data, "driver");
    }
}
