//! Single-slot snapshot cache.
//!
//! Holds the latest [`StatsSnapshot`] for the HTTP layer. One writer (the
//! refresh scheduler) replaces the value wholesale; any number of readers
//! clone the current value out. Readers never trigger a refresh and never
//! observe a partially updated snapshot: the writer builds the new snapshot
//! off to the side and swaps it in a single store.

use std::sync::{Arc, RwLock};

use crate::stats::StatsSnapshot;

/// Shared handle to the cached stats snapshot.
#[derive(Clone)]
pub struct StatsCache {
    inner: Arc<RwLock<StatsSnapshot>>,
}

impl StatsCache {
    /// Create a cache holding the zero-valued placeholder snapshot.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StatsSnapshot::zero())),
        }
    }

    /// Read the current snapshot. Always returns the last successfully
    /// stored value, or the zero snapshot if no cycle has succeeded yet.
    pub fn read(&self) -> StatsSnapshot {
        crate::metrics::record_cache_read();
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            // Poisoned only if a writer panicked mid-store; the value
            // itself is still a complete snapshot.
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the cached snapshot atomically.
    pub fn store(&self, snapshot: StatsSnapshot) {
        match self.inner.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_zero_snapshot() {
        let cache = StatsCache::new();
        assert_eq!(cache.read(), StatsSnapshot::zero());
    }

    #[test]
    fn store_replaces_wholesale() {
        let cache = StatsCache::new();
        let snapshot = StatsSnapshot {
            total_tx: 300,
            last_24h_tx: 17,
            last_updated: 1_700_000_000_000,
        };
        cache.store(snapshot.clone());
        assert_eq!(cache.read(), snapshot);
    }

    #[test]
    fn clones_share_the_same_slot() {
        let cache = StatsCache::new();
        let handle = cache.clone();
        cache.store(StatsSnapshot {
            total_tx: 5,
            last_24h_tx: 2,
            last_updated: 1,
        });
        assert_eq!(handle.read().total_tx, 5);
    }
}
