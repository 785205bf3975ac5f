//! # Ouroboros Memo (ouroboros-memo)
//!
//! A memoizing cache layer for callables, methods and accessors.
//!
//! ## Features
//!
//! - Transparent wrappers: a cached callable is called exactly like the original
//! - One wrapper per (callable, options) pair
//! - Per-receiver result stores, so instances never see each other's results
//! - Strict (identity) or loose (serialized) argument matching
//! - Optional per-entry TTL with lazy expiry
//! - Explicit clearing of one entry or a whole store
//! - Optional tokio sweeper for expired entries and dropped receivers
//!
//! Stores hold receivers weakly, but cached results and strict-mode keys are
//! strong. A receiver that its own results or keys refer to stays alive until
//! [`Memoizer::forget`] drops its entries.
//!
//! ## Caching a Function
//!
//! ```rust
//! use ouroboros_memo::{Callable, Memoizer, MemoOptions, Value};
//!
//! # fn main() -> ouroboros_memo::Result<()> {
//! let memoizer = Memoizer::default();
//! let add = Callable::from_fn("add", |_, args| {
//!     Ok(Value::Int(args.iter().filter_map(Value::as_int).sum()))
//! });
//!
//! let cached = memoizer.cached(&add, Some(MemoOptions::with_ttl_ms(5_000)))?;
//! assert_eq!(cached.call_detached(&[Value::Int(2), Value::Int(2)])?, Value::Int(4));
//! assert_eq!(cached.call_detached(&[Value::Int(2), Value::Int(2)])?, Value::Int(4));
//! assert_eq!(cached.stats().hits, 1);
//!
//! // Same callable and options: same wrapper
//! let again = memoizer.cached(&add, Some(MemoOptions::with_ttl_ms(5_000)))?;
//! assert!(again.ptr_eq(&cached));
//! # Ok(())
//! # }
//! ```
//!
//! ## Caching an Accessor
//!
//! ```rust
//! use ouroboros_memo::{Callable, Class, ClearTarget, Memoizer, Value};
//!
//! # fn main() -> ouroboros_memo::Result<()> {
//! let memoizer = Memoizer::default();
//! let point = Class::new("Point");
//! point.define_getter(
//!     "norm",
//!     Callable::from_fn("norm", |ctx, _| {
//!         let this = ctx.object().ok_or("norm needs a receiver")?;
//!         let x = this.field("x").and_then(|v| v.as_float()).unwrap_or(0.0);
//!         let y = this.field("y").and_then(|v| v.as_float()).unwrap_or(0.0);
//!         Ok(Value::Float((x * x + y * y).sqrt()))
//!     }),
//! );
//! memoizer.cache_accessor(&point, "norm", None)?;
//!
//! let p = point.instantiate();
//! p.set_field("x", Value::Float(3.0));
//! p.set_field("y", Value::Float(4.0));
//! assert_eq!(p.get("norm")?, Value::Float(5.0));
//!
//! memoizer.clear(ClearTarget::Member { context: &p, name: "norm" }, None)?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod callable;
pub mod cleanup;
pub mod error;
pub mod memoizer;
pub mod object;
pub mod value;

mod registry;

// Re-export main types for convenience
pub use cache::{
    ArgSerializer, CacheKey, CacheStats, JsonSerializer, MatchMode, MemoOptions,
    MemoOptionsBuilder, MemoizerConfig, MemoizerConfigBuilder, SweepReport, TtlStore,
};
pub use callable::{Callable, Invoke};
pub use cleanup::{spawn_auto_cleanup, start_auto_cleanup};
pub use error::{MemoError, Result};
pub use memoizer::{CachedFunction, ClearTarget, Memoizer};
pub use object::{Accessor, Class, Context, Member, Object, WeakObject};
pub use value::{List, Value};

/// Wrap `underlying` using the global [`Memoizer`]
pub fn cached(underlying: &Callable, options: Option<MemoOptions>) -> Result<CachedFunction> {
    Memoizer::global().cached(underlying, options)
}

/// Cache an accessor using the global [`Memoizer`]
pub fn cache_accessor(
    class: &Class,
    property: &str,
    options: Option<MemoOptions>,
) -> Result<CachedFunction> {
    Memoizer::global().cache_accessor(class, property, options)
}

/// Clear entries using the global [`Memoizer`]
pub fn clear(target: ClearTarget<'_>, args: Option<&Value>) -> Result<usize> {
    Memoizer::global().clear(target, args)
}
