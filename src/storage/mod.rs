//! Rule persistence.
//!
//! # Data Flow
//! ```text
//! control API (set/remove)
//!     → Storage (persist, keep in-memory cache)
//!     → Engine::reload() reads Storage::all()
//! ```
//!
//! # Design Decisions
//! - Storage knows nothing about templates; it stores source text only
//! - `all()` returns a snapshot; no ordering guarantee
//! - Service names are normalized before they are stored

pub mod json;
pub mod memory;

use thiserror::Error;

use crate::rules::Rule;

pub use json::JsonStorage;
pub use memory::MemoryStorage;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid service name {0:?}")]
    InvalidService(String),
}

/// Persistent map of service name → location template source.
pub trait Storage: Send + Sync {
    /// Add or replace one rule.
    fn set(&self, service: &str, location_template: &str) -> Result<(), StorageError>;

    /// Template source for `service`, if present.
    fn get(&self, service: &str) -> Option<String>;

    /// Remove one rule. Removing an unknown service is not an error.
    fn remove(&self, service: &str) -> Result<(), StorageError>;

    /// Snapshot of every stored rule.
    fn all(&self) -> Result<Vec<Rule>, StorageError>;

    /// Re-read the backing store into the cache.
    fn reload(&self) -> Result<(), StorageError>;
}
