//! Backend error handling
//!
//! Typed errors for a single backend call. The orchestrator never lets these
//! escape its public methods; they end up as the `error` field of a failed
//! `StorageResult`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during a single backend get/set/remove
#[derive(Error, Debug)]
pub enum BackendError {
    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error("Disk full or quota exceeded while writing to '{path}'")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Atomic write failed during rename
    #[error("Atomic write failed: could not rename '{from}' to '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// In-memory store refused the write
    #[error("Quota exceeded in {backend}: {used} of {limit} bytes in use")]
    QuotaExceeded {
        backend: &'static str,
        used: usize,
        limit: usize,
    },

    /// Backend cannot be used in this runtime
    #[error("Backend {0} is unavailable")]
    Unavailable(&'static str),

    /// Stored data is unreadable
    #[error("Corrupt data in '{path}': {details}")]
    Corrupt { path: PathBuf, details: String },

    /// SQLite database error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Lock poisoned by a panicking writer
    #[error("Backend {0} lock poisoned")]
    Poisoned(&'static str),
}

impl BackendError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => BackendError::PermissionDenied {
                path,
                source: error,
            },
            _ if is_disk_full_error(&error) => BackendError::DiskFull {
                path,
                source: error,
            },
            _ => BackendError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::DiskFull { .. } | BackendError::QuotaExceeded { .. }
        )
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
