//! Statistics reported by memoized wrappers and sweeps

use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics for one memoized wrapper
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Calls served from the cache
    pub hits: u64,

    /// Calls that invoked the underlying callable
    pub misses: u64,

    /// Live entries across all contexts (expired but unread entries included)
    pub entries: usize,

    /// Contexts holding a store
    pub contexts: usize,

    /// Entries dropped because their TTL elapsed
    pub evictions_ttl: u64,

    /// Entries removed by explicit clears
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Total calls observed
    pub fn calls(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, contexts: {}, expired: {}, cleared: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.contexts,
            self.evictions_ttl,
            self.invalidations
        )
    }
}

/// What one [`Memoizer::sweep`](crate::Memoizer::sweep) removed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired entries purged from context stores
    pub expired_entries: usize,

    /// Context stores whose receiver was dropped
    pub dead_contexts: usize,

    /// Registry entries whose underlying callable is no longer referenced
    pub dead_wrappers: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_entries == 0 && self.dead_contexts == 0 && self.dead_wrappers == 0
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expired entries: {}, dead contexts: {}, dead wrappers: {}",
            self.expired_entries, self.dead_contexts, self.dead_wrappers
        )
    }
}
