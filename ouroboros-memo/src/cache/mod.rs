//! # Result Caching Layer
//!
//! Storage and keying used by memoized wrappers.
//!
//! ## Features
//!
//! - **TTL-Based Expiration**: Per-entry time-to-live, checked lazily on read
//! - **Composite Keys**: Argument lists as keys, compared by identity (strict)
//!   or by serialized form (loose)
//! - **Per-Context Stores**: Each receiver gets its own store, held weakly
//! - **Statistics**: Hit, miss, expiry and invalidation counters
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_memo::cache::TtlStore;
//! use std::time::Duration;
//!
//! let mut store = TtlStore::new();
//! store.set("answer", 42, Some(Duration::from_secs(60)));
//! store.set("forever", 7, None);
//!
//! assert_eq!(store.get(&"answer"), Some(42));
//! assert!(store.delete(&"forever"));
//! assert!(!store.has(&"forever"));
//! ```

pub mod config;
pub mod context;
pub mod entry;
pub mod key;
pub mod serialize;
pub mod store;
pub mod types;

pub use config::{MemoOptions, MemoOptionsBuilder, MemoizerConfig, MemoizerConfigBuilder};
pub use context::{ContextRegistry, ResultStore};
pub use entry::{CacheEntry, CacheMetadata};
pub use key::{build_key, CacheKey, KeyBuilder, KeyPart, MatchMode, RefIdentity};
pub use serialize::{ArgSerializer, JsonSerializer, UNSERIALIZABLE};
pub use store::{Lookup, TtlStore};
pub use types::{CacheStats, SweepReport};
