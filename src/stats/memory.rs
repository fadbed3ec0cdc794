//! In-memory visit counters.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::{StatReader, StatWriter};

/// Counters held in a concurrent map, lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStats {
    counters: DashMap<String, AtomicU64>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of services with a counter.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl StatWriter for InMemoryStats {
    fn touch(&self, service: &str) {
        if let Some(counter) = self.counters.get(service) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        // Entry API holds the shard lock, so racing first touches share one counter.
        self.counters
            .entry(service.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl StatReader for InMemoryStats {
    fn visits(&self, service: &str) -> u64 {
        self.counters
            .get(service)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
