//! Storage backends
//!
//! Every backend implements [`KeyValueBackend`]; the orchestrator treats them
//! uniformly and only cares about their priority.
//!
//! ## Backends
//!
//! - `FileStore`: primary persistent store, one file per key (all platforms)
//! - `SessionStore`: in-memory, process lifetime (web only)
//! - `LocalStore`: single JSON map on disk (web only)
//! - `ObjectDatabase`: SQLite object store (web only, when it opens)

pub mod backend;
pub mod error;
pub mod file;
pub mod local;
pub mod object_db;
pub mod schema;
pub mod session;

pub use backend::KeyValueBackend;
pub use error::{BackendError, BackendResult};
pub use file::FileStore;
pub use local::LocalStore;
pub use object_db::ObjectDatabase;
pub use schema::SCHEMA_VERSION;
pub use session::SessionStore;
