//! Per-receiver stores for one memoized wrapper
//!
//! Each receiver gets a private [`TtlStore`]. Only a weak reference to the
//! receiver is held: once it is dropped its slot is dead and gets pruned, so
//! one-shot receivers cannot grow the registry without bound.
//!
//! Cached values and strict keys are strong. A result or argument that refers
//! back to its receiver keeps the receiver alive until the slot is removed
//! explicitly with [`ContextRegistry::remove`] or
//! [`Memoizer::forget`](crate::Memoizer::forget).

use crate::cache::key::CacheKey;
use crate::cache::store::TtlStore;
use crate::object::{Context, WeakObject};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Store type used for memoized results
pub type ResultStore = TtlStore<CacheKey, Value>;

/// Slot count below which dead slots are not pruned on insert
const MIN_PRUNE_THRESHOLD: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ContextKey {
    Detached,
    Object(usize),
}

impl ContextKey {
    fn of(context: &Context) -> Self {
        match context {
            Context::Detached => ContextKey::Detached,
            Context::Object(o) => ContextKey::Object(o.addr()),
        }
    }
}

struct ContextSlot {
    /// `None` for the detached store
    owner: Option<WeakObject>,
    store: ResultStore,
}

impl ContextSlot {
    fn new(context: &Context) -> Self {
        Self {
            owner: context.object().map(|o| o.downgrade()),
            store: ResultStore::new(),
        }
    }

    fn is_alive(&self) -> bool {
        self.owner.as_ref().map_or(true, WeakObject::is_alive)
    }
}

struct Slots {
    slots: HashMap<ContextKey, ContextSlot>,
    next_prune_at: usize,
}

impl Slots {
    fn prune_dead(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.is_alive());
        self.next_prune_at = (self.slots.len() * 2).max(MIN_PRUNE_THRESHOLD);
        before - self.slots.len()
    }
}

/// Maps each receiver to its private result store
pub struct ContextRegistry {
    inner: Mutex<Slots>,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Slots {
                slots: HashMap::new(),
                next_prune_at: MIN_PRUNE_THRESHOLD,
            }),
        }
    }
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the store of `context`, creating it on first use.
    ///
    /// The registry lock is held while `f` runs; `f` must not call back into
    /// the same wrapper.
    pub fn with_store<R>(&self, context: &Context, f: impl FnOnce(&mut ResultStore) -> R) -> R {
        let key = ContextKey::of(context);
        let mut inner = self.inner.lock();

        // A dead slot at this address belonged to a dropped receiver whose
        // memory now hosts `context`.
        let stale = inner.slots.get(&key).map_or(false, |slot| !slot.is_alive());
        if stale {
            inner.slots.remove(&key);
        }

        if !inner.slots.contains_key(&key) && inner.slots.len() >= inner.next_prune_at {
            let pruned = inner.prune_dead();
            if pruned > 0 {
                debug!("Pruned {} context stores of dropped receivers", pruned);
            }
        }

        let slot = inner.slots.entry(key).or_insert_with(|| {
            debug!("Creating context store for {:?}", key);
            ContextSlot::new(context)
        });
        f(&mut slot.store)
    }

    /// Run `f` against the store of `context` only if one exists
    pub fn with_existing_store<R>(
        &self,
        context: &Context,
        f: impl FnOnce(&mut ResultStore) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock();
        inner
            .slots
            .get_mut(&ContextKey::of(context))
            .filter(|slot| slot.is_alive())
            .map(|slot| f(&mut slot.store))
    }

    /// Drop the store of `context`; returns the number of entries it held
    pub fn remove(&self, context: &Context) -> usize {
        let removed = self.inner.lock().slots.remove(&ContextKey::of(context));
        removed.map_or(0, |slot| slot.store.len())
    }

    /// Remove entries whose key matches `pred` from every store
    pub fn remove_keys_where(&self, mut pred: impl FnMut(&CacheKey) -> bool) -> usize {
        self.inner
            .lock()
            .slots
            .values_mut()
            .map(|slot| slot.store.remove_where(&mut pred))
            .sum()
    }

    /// Drop stores whose receiver no longer exists
    pub fn prune_dead(&self) -> usize {
        self.inner.lock().prune_dead()
    }

    /// Purge expired entries in every store
    pub fn purge_expired(&self) -> usize {
        self.inner
            .lock()
            .slots
            .values_mut()
            .map(|slot| slot.store.purge_expired())
            .sum()
    }

    /// Number of stores, dead ones included until pruned
    pub fn context_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Number of entries across all stores
    pub fn entry_count(&self) -> usize {
        self.inner
            .lock()
            .slots
            .values()
            .map(|slot| slot.store.len())
            .sum()
    }
}
