//! TTL store: a keyed map whose entries expire lazily on read

use crate::cache::entry::CacheEntry;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a store lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    /// Live entry found
    Hit(V),

    /// No entry for the key
    Miss,

    /// The entry had expired and was removed by this read
    Expired,
}

impl<V> Lookup<V> {
    pub fn into_hit(self) -> Option<V> {
        match self {
            Lookup::Hit(v) => Some(v),
            Lookup::Miss | Lookup::Expired => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}

/// Key-value store with optional per-entry time-to-live.
///
/// There is no background expiry: a read past an entry's deadline removes it
/// and reports it absent. [`TtlStore::purge_expired`] sweeps eagerly.
pub struct TtlStore<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> Default for TtlStore<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> TtlStore<K, V>
where
    K: Hash + Eq + fmt::Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key`, removing it if it has expired
    pub fn lookup(&mut self, key: &K) -> Lookup<V> {
        match self.entries.get_mut(key) {
            None => return Lookup::Miss,
            Some(entry) if !entry.is_expired() => {
                entry.mark_hit();
                debug!(
                    "Store hit: {:?} (age {:?}, hits {})",
                    key,
                    entry.age(),
                    entry.metadata.hit_count
                );
                return Lookup::Hit(entry.value.clone());
            }
            Some(_) => {}
        }

        self.entries.remove(key);
        debug!("Store entry expired: {:?}", key);
        Lookup::Expired
    }

    /// Get a live value
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.lookup(key).into_hit()
    }

    /// Check for a live entry; an expired entry is removed
    pub fn has(&mut self, key: &K) -> bool {
        match self.entries.get(key) {
            None => false,
            Some(entry) if entry.is_expired() => {
                self.entries.remove(key);
                debug!("Store entry expired: {:?}", key);
                false
            }
            Some(_) => true,
        }
    }

    /// Insert or replace; `ttl` of `None` never expires
    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>) {
        debug!("Store insert: {:?} (ttl {:?})", key, ttl);
        self.entries.insert(key, CacheEntry::new(value, ttl));
    }

    /// Remove one entry; returns whether a live entry was removed
    pub fn delete(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    /// Remove every entry; returns the number removed
    pub fn clear_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Remove every entry whose key matches `pred`; returns the number removed
    pub fn remove_where(&mut self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pred(key));
        before - self.entries.len()
    }

    /// Remove all expired entries; returns the number removed
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before - self.entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> fmt::Debug for TtlStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}
