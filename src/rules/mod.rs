//! Rule engine subsystem.
//!
//! # Data Flow
//! ```text
//! Reload (control API, file watch, SIGHUP):
//!     Storage::all()
//!     → table.rs (compile every template; abort on first failure)
//!     → engine.rs (atomic swap of Arc<RuleTable>)
//!
//! Incoming Request (path, method, headers, query, form)
//!     → engine.rs (load current table, no locks)
//!     → table.rs (exact match, then longest segment prefix)
//!     → StatWriter::touch(service)
//!     → Template::render → RedirectOutcome
//! ```
//!
//! # Design Decisions
//! - Serving never touches Storage
//! - A failed reload leaves the published table in effect
//! - Concurrent reloads publish in start order; a stale one never wins

pub mod engine;
pub mod rule;
pub mod table;

use thiserror::Error;

use crate::storage::StorageError;
use crate::template::TemplateSyntaxError;

pub use engine::{Engine, RedirectOutcome};
pub use rule::{normalize_service, Rule};
pub use table::{Resolved, RuleTable};

/// A stored rule whose template does not compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse rule for service {service:?}: {source}")]
pub struct RuleCompilationError {
    pub service: String,
    #[source]
    pub source: TemplateSyntaxError,
}

/// Why [`Engine::reload`] did not publish a new table.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("read rules from storage: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Compilation(#[from] RuleCompilationError),
}
