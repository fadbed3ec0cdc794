//! Redirect engine.
//!
//! # Responsibilities
//! - Own the published rule table
//! - Rebuild and publish the table on `reload`
//! - Serve one redirect request against the current table
//!
//! # Design Decisions
//! - Table held in `ArcSwap`: lookups are lock-free, reload is one pointer swap
//! - No lock is held while reading Storage or compiling
//! - Each reload takes a generation number up front; publishing is a
//!   compare-and-swap that only replaces an older generation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::Method;

use super::{ReloadError, RuleTable};
use crate::observability::metrics;
use crate::stats::StatWriter;
use crate::storage::Storage;
use crate::template::{Binding, RenderError, RequestContext};

/// What to answer for one redirect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// No rule for the requested path.
    NotFound,
    /// Template failed for this request.
    RenderFailed(RenderError),
    /// `HEAD` request: report the target without redirecting.
    Location(String),
    /// Redirect to the target.
    Found(String),
}

/// Maps request paths to rendered redirect targets.
pub struct Engine {
    storage: Arc<dyn Storage>,
    stats: Arc<dyn StatWriter>,
    table: ArcSwap<RuleTable>,
    generation: AtomicU64,
}

impl Engine {
    /// Create an engine with an empty table. Call [`Engine::reload`] to load rules.
    pub fn new(storage: Arc<dyn Storage>, stats: Arc<dyn StatWriter>) -> Self {
        Self {
            storage,
            stats,
            table: ArcSwap::from_pointee(RuleTable::empty()),
            generation: AtomicU64::new(0),
        }
    }

    /// Snapshot of the currently published table.
    pub fn table(&self) -> Arc<RuleTable> {
        self.table.load_full()
    }

    /// Rebuild the table from storage and publish it.
    ///
    /// On error the previously published table stays in effect.
    pub fn reload(&self) -> Result<(), ReloadError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let result = self
            .storage
            .all()
            .map_err(ReloadError::from)
            .and_then(|rules| RuleTable::compile(generation, &rules).map_err(ReloadError::from));

        let table = match result {
            Ok(table) => Arc::new(table),
            Err(e) => {
                tracing::error!(generation, error = %e, "Rule reload failed, keeping current rules");
                metrics::record_reload(false);
                return Err(e);
            }
        };

        let previous = self.table.rcu(|current| {
            if current.generation() < generation {
                Arc::clone(&table)
            } else {
                Arc::clone(current)
            }
        });

        if previous.generation() < generation {
            tracing::info!(generation, rules = table.len(), "Rules reloaded");
            metrics::record_rules(table.len());
        } else {
            tracing::debug!(
                generation,
                published = previous.generation(),
                "Reload superseded by a newer one"
            );
        }
        metrics::record_reload(true);
        Ok(())
    }

    /// Re-read the backing store from its source, then rebuild the table.
    ///
    /// Used when the rules changed outside the control API (file edit, SIGHUP).
    pub fn refresh(&self) -> Result<(), ReloadError> {
        if let Err(e) = self.storage.reload() {
            tracing::error!(error = %e, "Failed to re-read rules, keeping current rules");
            metrics::record_reload(false);
            return Err(e.into());
        }
        self.reload()
    }

    /// Serve one redirect request against the current table.
    pub fn serve(&self, request: &RequestContext) -> RedirectOutcome {
        let table = self.table.load();
        let Some(resolved) = table.resolve(request.path()) else {
            tracing::debug!(path = %request.path(), "Unknown service");
            return RedirectOutcome::NotFound;
        };

        self.stats.touch(resolved.service);

        let binding = Binding {
            request,
            service: resolved.service,
            path: resolved.rest,
        };
        let target = match resolved.template.render(binding) {
            Ok(rendered) => rendered.trim().to_string(),
            Err(e) => {
                tracing::warn!(service = %resolved.service, error = %e, "Failed to execute template");
                return RedirectOutcome::RenderFailed(e);
            }
        };

        if *request.method() == Method::HEAD {
            RedirectOutcome::Location(target)
        } else {
            RedirectOutcome::Found(target)
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.load();
        f.debug_struct("Engine")
            .field("generation", &table.generation())
            .field("rules", &table.len())
            .finish()
    }
}
