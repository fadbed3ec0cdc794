//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RedirectorConfig (validated, immutable)
//!     → CLI flags override selected fields
//!
//! Rules file (separate from config):
//!     watcher.rs detects change
//!     → Engine::refresh() re-reads storage and recompiles
//!     → atomic swap of the rule table
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the rules file is hot-reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ControlConfig, ListenerConfig, LogFormat, ObservabilityConfig, RedirectorConfig, StorageConfig,
    TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::RulesWatcher;
