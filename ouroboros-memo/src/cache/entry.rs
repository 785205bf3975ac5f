//! Cache entry management with TTL support

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// A stored result with its expiration metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,

    /// Entry metadata
    pub metadata: CacheMetadata,
}

impl<V> CacheEntry<V> {
    /// Create a new entry; `None` never expires
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        let now = Instant::now();

        Self {
            value,
            metadata: CacheMetadata {
                created_at: Utc::now(),
                // A deadline past the clock's range is the same as none.
                expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
                hit_count: 0,
            },
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Check expiration against a given instant.
    ///
    /// An entry is expired once `now` reaches its deadline.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.metadata.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// Get time until expiration; `None` if expired or never expiring
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let deadline = self.metadata.expires_at?;
        deadline
            .checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
    }

    /// Record a cache hit on this entry
    pub fn mark_hit(&mut self) {
        self.metadata.hit_count += 1;
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.metadata.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }
}

/// Metadata associated with a cache entry
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// Deadline after which the entry reads as absent
    pub expires_at: Option<Instant>,

    /// Number of times this entry has been served
    pub hit_count: u64,
}
