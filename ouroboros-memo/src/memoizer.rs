//! Memoized wrappers and the service that owns them
//!
//! A [`Memoizer`] hands out [`CachedFunction`]s. Each wrapper keeps one
//! [`ResultStore`](crate::cache::ResultStore) per receiver, keyed by the
//! argument list, and consults it before running the wrapped callable.

use crate::cache::config::{MemoOptions, MemoizerConfig};
use crate::cache::context::ContextRegistry;
use crate::cache::key::{KeyBuilder, MatchMode};
use crate::cache::serialize::{ArgSerializer, JsonSerializer};
use crate::cache::store::Lookup;
use crate::cache::types::{CacheStats, SweepReport};
use crate::callable::{Callable, Invoke};
use crate::error::{MemoError, Result};
use crate::object::{Accessor, Class, Context, Member, Object};
use crate::registry::WrapperRegistry;
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, info, warn};

/// Shared state of one memoized wrapper
pub(crate) struct CacheCore {
    name: String,
    underlying: Callable,
    options: MemoOptions,
    keys: KeyBuilder,
    contexts: ContextRegistry,
    stats: Mutex<CacheStats>,
    metrics: bool,
}

impl CacheCore {
    fn new(
        underlying: &Callable,
        options: MemoOptions,
        serializer: Arc<dyn ArgSerializer>,
        metrics: bool,
    ) -> Self {
        let name = match underlying.name() {
            "" => "<anonymous>".to_string(),
            name => name.to_string(),
        };
        let keys = KeyBuilder::new(MatchMode::from_strict(options.strict_arg_match), serializer);

        Self {
            name,
            underlying: underlying.clone(),
            options,
            keys,
            contexts: ContextRegistry::new(),
            stats: Mutex::new(CacheStats::default()),
            metrics,
        }
    }

    pub(crate) fn underlying(&self) -> &Callable {
        &self.underlying
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if self.metrics {
            update(&mut self.stats.lock());
        }
    }

    /// Serve from the receiver's store, or run the underlying callable and
    /// store its result.
    ///
    /// No lock is held while the underlying callable runs.
    pub(crate) fn invoke(&self, receiver: &Context, args: &[Value]) -> Result<Value> {
        let key = self.keys.build(args);

        match self.contexts.with_store(receiver, |store| store.lookup(&key)) {
            Lookup::Hit(value) => {
                self.record(|s| s.hits += 1);
                debug!("Cache hit: {}{}", self.name, key);
                return Ok(value);
            }
            Lookup::Expired => {
                self.record(|s| {
                    s.misses += 1;
                    s.evictions_ttl += 1;
                });
                debug!("Cache entry expired: {}{}", self.name, key);
            }
            Lookup::Miss => {
                self.record(|s| s.misses += 1);
                debug!("Cache miss: {}{}", self.name, key);
            }
        }

        let value = self
            .underlying
            .call(receiver, args)
            .map_err(|e| self.invocation_error(e))?;

        let ttl = self.options.ttl;
        self.contexts
            .with_store(receiver, |store| store.set(key, value.clone(), ttl));

        Ok(value)
    }

    pub(crate) fn construct(&self, _args: &[Value]) -> Result<Value> {
        Err(MemoError::UsageError(format!(
            "cached wrapper `{}` cannot be used as a constructor",
            self.name
        )))
    }

    fn invocation_error(&self, error: MemoError) -> MemoError {
        match error {
            MemoError::Other(message) => MemoError::Invocation {
                name: self.name.clone(),
                message,
            },
            other => other,
        }
    }

    /// Remove one entry (`Some(args)`) or every entry of the receiver's store
    fn clear(&self, receiver: &Context, args: Option<&[Value]>) -> usize {
        let removed = match args {
            Some(args) => {
                let key = self.keys.build(args);
                self.contexts
                    .with_existing_store(receiver, |store| usize::from(store.delete(&key)))
            }
            None => self
                .contexts
                .with_existing_store(receiver, |store| store.clear_all()),
        }
        .unwrap_or(0);

        self.record(|s| s.invalidations += removed as u64);
        info!(
            "Cleared {} cached entries of `{}` ({})",
            removed,
            self.name,
            if receiver.is_detached() { "detached" } else { "receiver" }
        );
        removed
    }

    /// Drop the store of `object` and strict entries keyed by it
    fn forget(&self, object: &Object) -> usize {
        let own = self.contexts.remove(&Context::from(object));
        let target = Value::Object(object.clone());
        let keyed = self.contexts.remove_keys_where(|key| key.references(&target));

        let removed = own + keyed;
        self.record(|s| s.invalidations += removed as u64);
        removed
    }

    /// Purge expired entries and stores of dropped receivers
    fn sweep(&self) -> (usize, usize) {
        let expired = self.contexts.purge_expired();
        let dead = self.contexts.prune_dead();
        self.record(|s| s.evictions_ttl += expired as u64);
        (expired, dead)
    }
}

/// Handle to a memoized wrapper.
///
/// Cloning is cheap; clones share the wrapper's stores. The invocable form is
/// [`CachedFunction::callable`], which can be installed as a method, passed
/// around as a [`Value::Function`], or wrapped again.
#[derive(Clone)]
pub struct CachedFunction {
    callable: Callable,
    core: Arc<CacheCore>,
}

impl CachedFunction {
    pub(crate) fn create(
        underlying: &Callable,
        options: MemoOptions,
        serializer: Arc<dyn ArgSerializer>,
        metrics: bool,
    ) -> Self {
        let core = Arc::new(CacheCore::new(underlying, options, serializer, metrics));
        let callable = Callable::from_cache(underlying.name(), Arc::clone(&core));
        Self { callable, core }
    }

    /// Recover the wrapper behind a callable, if it is one
    pub fn from_callable(callable: &Callable) -> Option<Self> {
        callable.cache_core().map(|core| Self {
            callable: callable.clone(),
            core: Arc::clone(core),
        })
    }

    /// Find the cached wrapper behind `name` on `context`.
    ///
    /// Plain members win (own function field, then class method); otherwise
    /// a cached accessor of that name is used.
    pub fn of_member(context: &Object, name: &str) -> Result<Self> {
        let member = context
            .field(name)
            .and_then(|field| field.as_function().cloned())
            .or_else(|| match context.class().member(name) {
                Some(Member::Method(method)) => Some(method),
                _ => None,
            });

        if let Some(wrapper) = member.as_ref().and_then(Self::from_callable) {
            return Ok(wrapper);
        }

        context
            .class()
            .find_accessor(name)
            .and_then(|accessor| accessor.read)
            .and_then(|read| Self::from_callable(&read))
            .ok_or_else(|| {
                MemoError::NotCached(format!(
                    "member `{}` of `{}` is not a cached callable or accessor",
                    name,
                    context.class().name()
                ))
            })
    }

    /// Invoke with `receiver` bound as the context
    pub fn call(&self, receiver: &Context, args: &[Value]) -> Result<Value> {
        self.core.invoke(receiver, args)
    }

    /// Invoke without a receiver
    pub fn call_detached(&self, args: &[Value]) -> Result<Value> {
        self.core.invoke(&Context::Detached, args)
    }

    /// The wrapper as a first-class callable
    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    /// The wrapped callable
    pub fn underlying(&self) -> &Callable {
        &self.core.underlying
    }

    pub fn options(&self) -> &MemoOptions {
        &self.core.options
    }

    /// Display name, taken from the wrapped callable
    pub fn name(&self) -> &str {
        self.callable.name()
    }

    /// Remove the entry for `args`, or all entries, from the receiver's store.
    ///
    /// Returns the number of entries removed; clearing an absent key is a
    /// no-op.
    pub fn clear(&self, receiver: &Context, args: Option<&[Value]>) -> usize {
        self.core.clear(receiver, args)
    }

    /// Counters plus current entry and context counts
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.core.stats.lock().clone();
        stats.entries = self.core.contexts.entry_count();
        stats.contexts = self.core.contexts.context_count();
        stats
    }

    pub fn ptr_eq(&self, other: &CachedFunction) -> bool {
        self.callable.ptr_eq(&other.callable)
    }
}

impl fmt::Debug for CachedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFunction")
            .field("name", &self.core.name)
            .field("options", &self.core.options)
            .field("contexts", &self.core.contexts.context_count())
            .finish()
    }
}

/// What to clear
#[derive(Debug, Clone, Copy)]
pub enum ClearTarget<'a> {
    /// A cached method or accessor on a receiver
    Member { context: &'a Object, name: &'a str },

    /// A wrapper's detached store
    Wrapper(&'a Callable),
}

impl<'a> From<&'a Callable> for ClearTarget<'a> {
    fn from(callable: &'a Callable) -> Self {
        ClearTarget::Wrapper(callable)
    }
}

/// The wrapper factory as a callable: `factory(f, options?)` wraps `f`
struct WrapFactory {
    memoizer: Weak<Memoizer>,
}

impl Invoke for WrapFactory {
    fn invoke(&self, _receiver: &Context, args: &[Value]) -> Result<Value> {
        let memoizer = self.memoizer.upgrade().ok_or_else(|| {
            MemoError::UsageError("the memoizer behind this factory was dropped".to_string())
        })?;
        let underlying = args.first().cloned().unwrap_or_default();
        let options = args.get(1).cloned().unwrap_or_default();

        let wrapper = memoizer.cached_value(&underlying, &options)?;
        Ok(Value::Function(wrapper.callable().clone()))
    }

    fn construct(&self, _args: &[Value]) -> Result<Value> {
        Err(MemoError::UsageError(
            "CachedFunction is a factory and cannot be constructed; call it instead".to_string(),
        ))
    }
}

static GLOBAL: OnceLock<Arc<Memoizer>> = OnceLock::new();

/// Owns the wrapper identity registry and creates wrappers
pub struct Memoizer {
    config: MemoizerConfig,
    registry: WrapperRegistry,
}

impl Default for Memoizer {
    fn default() -> Self {
        Self::new(MemoizerConfig::default())
    }
}

impl Memoizer {
    /// Create a memoizer using JSON for loose argument matching
    pub fn new(config: MemoizerConfig) -> Self {
        Self::with_serializer(config, Arc::new(JsonSerializer))
    }

    /// Create a memoizer with a custom loose-mode serializer
    pub fn with_serializer(config: MemoizerConfig, serializer: Arc<dyn ArgSerializer>) -> Self {
        let registry = WrapperRegistry::new(serializer, config.enable_metrics);
        Self { config, registry }
    }

    /// Process-wide instance, configured from the environment on first use
    pub fn global() -> &'static Arc<Memoizer> {
        GLOBAL.get_or_init(|| {
            let config = MemoizerConfig::from_env().unwrap_or_else(|e| {
                warn!("Invalid memoizer environment, using defaults: {}", e);
                MemoizerConfig::default()
            });
            Arc::new(Memoizer::new(config))
        })
    }

    pub fn config(&self) -> &MemoizerConfig {
        &self.config
    }

    /// Wrapper for `underlying` under `options`.
    ///
    /// The same pair always yields the same wrapper. `None` and
    /// `Some(MemoOptions::default())` are distinct configurations.
    ///
    /// The registry keeps a wrapper, and with it `underlying`, until a sweep
    /// finds neither referenced elsewhere. Every new registration sweeps, as
    /// does [`Memoizer::sweep`].
    pub fn cached(
        &self,
        underlying: &Callable,
        options: Option<MemoOptions>,
    ) -> Result<CachedFunction> {
        self.registry.get_or_create(underlying, options.as_ref())
    }

    /// Dynamic entry point: `underlying` must be a function, `options` an
    /// options object or undefined/null.
    pub fn cached_value(&self, underlying: &Value, options: &Value) -> Result<CachedFunction> {
        let callable = underlying.as_function().ok_or_else(|| {
            MemoError::InvalidArgument(format!(
                "expected a callable to cache, got {}",
                underlying.type_name()
            ))
        })?;

        let options = match options {
            Value::Undefined | Value::Null => None,
            other => Some(MemoOptions::from_value(other)?),
        };
        self.cached(callable, options)
    }

    /// The wrapper factory as a first-class callable.
    ///
    /// Calling it with `(function, options?)` returns the wrapper;
    /// constructing with it fails with [`MemoError::UsageError`].
    pub fn factory(self: &Arc<Self>) -> Callable {
        Callable::new(
            "CachedFunction",
            WrapFactory {
                memoizer: Arc::downgrade(self),
            },
        )
    }

    /// Replace the read half of accessor `property` with a cached wrapper.
    ///
    /// The write half is preserved. If the read half is already cached, the
    /// existing wrapper is returned unchanged.
    pub fn cache_accessor(
        &self,
        class: &Class,
        property: &str,
        options: Option<MemoOptions>,
    ) -> Result<CachedFunction> {
        let not_found = || MemoError::NotFound {
            type_name: class.name().to_string(),
            property: property.to_string(),
        };

        let accessor = class
            .find_accessor(property)
            .filter(Accessor::is_readable)
            .ok_or_else(not_found)?;
        let read = accessor.read.clone().ok_or_else(not_found)?;

        if let Some(existing) = CachedFunction::from_callable(&read) {
            debug!("Accessor `{}.{}` is already cached", class.name(), property);
            return Ok(existing);
        }

        let wrapper = self.cached(&read, options)?;
        class.define_accessor(
            property,
            Accessor {
                read: Some(wrapper.callable().clone()),
                write: accessor.write,
            },
        );
        info!("Cached accessor `{}.{}`", class.name(), property);

        Ok(wrapper)
    }

    /// Clear cached entries.
    ///
    /// `args` selects one entry and must be a list; `None` or undefined
    /// clears the whole store of the target context.
    pub fn clear(&self, target: ClearTarget<'_>, args: Option<&Value>) -> Result<usize> {
        let args = match args {
            None | Some(Value::Undefined) => None,
            Some(Value::List(list)) => Some(list.to_vec()),
            Some(other) => {
                return Err(MemoError::InvalidArgument(format!(
                    "argument list must be a list, got {}",
                    other.type_name()
                )))
            }
        };

        match target {
            ClearTarget::Member { context, name } => {
                self.clear_member(context, name, args.as_deref())
            }
            ClearTarget::Wrapper(wrapper) => self.clear_wrapper(wrapper, args.as_deref()),
        }
    }

    /// Clear a cached method or accessor's store for `context`
    pub fn clear_member(
        &self,
        context: &Object,
        name: &str,
        args: Option<&[Value]>,
    ) -> Result<usize> {
        let wrapper = CachedFunction::of_member(context, name)?;
        Ok(wrapper.clear(&Context::from(context), args))
    }

    /// Clear a wrapper's detached store
    pub fn clear_wrapper(&self, wrapper: &Callable, args: Option<&[Value]>) -> Result<usize> {
        let wrapper = CachedFunction::from_callable(wrapper).ok_or_else(|| {
            MemoError::NotCached(format!("`{:?}` is not a cached wrapper", wrapper))
        })?;
        Ok(wrapper.clear(&Context::Detached, args))
    }

    /// Drop everything cached for `object` in every wrapper.
    ///
    /// Removes the object's own stores and strict-mode entries whose
    /// arguments include it. Sweeps only reclaim receivers that are already
    /// gone; a receiver reachable from its own cached results or keys is
    /// released only by this call. Returns the number of entries removed.
    pub fn forget(&self, object: &Object) -> usize {
        let removed = self
            .registry
            .wrappers()
            .iter()
            .map(|wrapper| wrapper.core.forget(object))
            .sum();
        info!(
            "Forgot {} cached entries for `{}` instance",
            removed,
            object.class().name()
        );
        removed
    }

    /// Purge expired entries, drop stores of dropped receivers, and drop
    /// registry entries nothing references anymore
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for wrapper in self.registry.wrappers() {
            let (expired, dead) = wrapper.core.sweep();
            report.expired_entries += expired;
            report.dead_contexts += dead;
        }
        report.dead_wrappers = self.registry.sweep();

        if !report.is_empty() {
            debug!("Sweep: {}", report);
        }
        report
    }

    /// Number of registered wrappers, including unreferenced ones not yet swept
    pub fn wrapper_count(&self) -> usize {
        self.registry.len()
    }
}

impl fmt::Debug for Memoizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("config", &self.config)
            .field("wrappers", &self.registry.len())
            .finish()
    }
}
