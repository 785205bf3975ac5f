//! Wrapper identity registry
//!
//! Guarantees one wrapper per (underlying callable, canonical options) pair.
//! The registry holds the wrappers, and each wrapper holds its underlying
//! callable. An entry is dropped by [`WrapperRegistry::sweep`] once nothing
//! outside the registry references either the wrapper or the underlying
//! callable. Every new registration sweeps first, so an unreferenced callable
//! is held at most until the next registration or explicit sweep.

use crate::cache::config::MemoOptions;
use crate::cache::serialize::ArgSerializer;
use crate::callable::Callable;
use crate::error::Result;
use crate::memoizer::CachedFunction;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WrapperKey {
    underlying: usize,
    options: String,
}

#[derive(Default)]
struct Entries {
    wrappers: HashMap<WrapperKey, Callable>,
}

impl Entries {
    fn sweep(&mut self) -> usize {
        let before = self.wrappers.len();

        // Removing an outer wrapper can release the wrapper it wraps.
        loop {
            // References the registry itself holds to each callable: one per
            // wrapper over it, plus the entry when it is a registered wrapper.
            let mut held: HashMap<usize, usize> = HashMap::new();
            for (key, wrapper) in &self.wrappers {
                *held.entry(key.underlying).or_default() += 1;
                *held.entry(wrapper.addr()).or_default() += 1;
            }

            let dead: Vec<WrapperKey> = self
                .wrappers
                .iter()
                .filter(|(key, wrapper)| {
                    let held_by_registry = held.get(&key.underlying).copied().unwrap_or(0);
                    is_unreferenced(wrapper, held_by_registry)
                })
                .map(|(key, _)| key.clone())
                .collect();

            if dead.is_empty() {
                break;
            }
            for key in dead {
                self.wrappers.remove(&key);
            }
        }

        before - self.wrappers.len()
    }
}

/// True when only the registry can reach `wrapper` and its underlying callable.
///
/// `held_by_registry` counts the references to the underlying callable that
/// live inside the registry.
fn is_unreferenced(wrapper: &Callable, held_by_registry: usize) -> bool {
    let Some(core) = wrapper.cache_core() else {
        return false;
    };
    wrapper.strong_count() == 1
        && Arc::strong_count(core) == 1
        && core.underlying().strong_count() <= held_by_registry
}

/// Maps (underlying identity, canonical options) to the unique wrapper
pub(crate) struct WrapperRegistry {
    entries: Mutex<Entries>,
    serializer: Arc<dyn ArgSerializer>,
    metrics: bool,
}

impl WrapperRegistry {
    pub(crate) fn new(serializer: Arc<dyn ArgSerializer>, metrics: bool) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            serializer,
            metrics,
        }
    }

    /// Return the registered wrapper for the pair, creating it if needed
    pub(crate) fn get_or_create(
        &self,
        underlying: &Callable,
        options: Option<&MemoOptions>,
    ) -> Result<CachedFunction> {
        let resolved = options.cloned().unwrap_or_default();
        resolved.validate()?;

        let key = WrapperKey {
            underlying: underlying.addr(),
            options: MemoOptions::canonical(options)?,
        };

        let mut entries = self.entries.lock();
        if let Some(existing) = entries.wrappers.get(&key) {
            if let Some(wrapper) = CachedFunction::from_callable(existing) {
                debug!("Reusing cached wrapper for `{}` ({})", underlying.name(), key.options);
                return Ok(wrapper);
            }
        }

        let removed = entries.sweep();
        if removed > 0 {
            debug!("Dropped {} unreferenced wrappers", removed);
        }

        let wrapper = CachedFunction::create(
            underlying,
            resolved,
            Arc::clone(&self.serializer),
            self.metrics,
        );
        info!(
            "Created cached wrapper for `{}` ({})",
            underlying.name(),
            key.options
        );
        entries.wrappers.insert(key, wrapper.callable().clone());

        Ok(wrapper)
    }

    /// Drop entries nothing outside the registry references
    pub(crate) fn sweep(&self) -> usize {
        self.entries.lock().sweep()
    }

    /// Snapshot of the registered wrappers
    pub(crate) fn wrappers(&self) -> Vec<CachedFunction> {
        self.entries
            .lock()
            .wrappers
            .values()
            .filter_map(CachedFunction::from_callable)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().wrappers.len()
    }
}
