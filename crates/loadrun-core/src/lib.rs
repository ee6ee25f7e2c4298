//! LoadRun Core Library
//!
//! Durable key-value storage for the LoadRun load board. A single logical
//! value is written redundantly across several failure-prone stores and alias
//! keys, and read back from whichever still has it.
//!
//! # Architecture
//!
//! - **Primary store**: one file per key in the data directory (all platforms)
//! - **Web fallbacks**: session (in-memory) and local (JSON file) stores
//! - **Object database**: SQLite object store
//!
//! Nothing in the public API fails because a backend failed: every attempt is
//! reported as a `StorageResult`, and `load` returning `None` means "no data
//! yet".
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let persistence = Persistence::from_config(&config)?;
//!
//! let user = UserContext::new("u42", "driver");
//! if !persistence.permanent_save_for(&user, "profile", &profile).await {
//!     // fewer than half of the writes landed
//! }
//!
//! let profile: Option<Loaded<Profile>> = persistence.permanent_load(&user, "profile").await;
//! ```
//!
//! # Modules
//!
//! - `persistence`: Fallback orchestrator (main entry point)
//! - `storage`: Backend trait and implementations
//! - `keys`: Alias key derivation
//! - `health`: Backend health probing
//! - `gc`: Alias index and garbage collection
//! - `codec`: Payload encoding and compression
//! - `config`: Application configuration

pub mod codec;
pub mod config;
pub mod gc;
pub mod health;
pub mod keys;
pub mod persistence;
pub mod storage;

#[cfg(test)]
mod testing;

pub use config::{Config, PersistenceOptions, Platform};
pub use gc::{AliasIndex, GcReport, ALIAS_INDEX_KEY};
pub use health::{BackendHealth, HealthReport, PROBE_KEY};
pub use keys::{KeyDerivation, UserContext};
pub use persistence::{
    is_overall_success, Loaded, Persistence, StorageResult, StorageSource, SUCCESS_THRESHOLD,
};
pub use storage::{BackendError, KeyValueBackend};
