//! Visit counters.
//!
//! # Design Decisions
//! - `touch` is on the redirect hot path: one map lookup plus an atomic add
//! - Counters are created lazily on first touch
//! - Readers (control API) never block writers

pub mod memory;

pub use memory::InMemoryStats;

/// Records a visit to a service.
pub trait StatWriter: Send + Sync {
    /// Increment the counter for `service`.
    fn touch(&self, service: &str);
}

/// Reads visit counts.
pub trait StatReader: Send + Sync {
    /// Visits recorded for `service`, 0 when never touched.
    fn visits(&self, service: &str) -> u64;
}
