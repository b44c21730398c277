//! # Lazycache
//!
//! A single-flight, self-populating in-memory cache.
//!
//! Given a key and a value-producing factory, the cache guarantees the
//! factory executes **at most once per key** even under heavy concurrency:
//! every simultaneous caller for the same key blocks on (or awaits) the same
//! deferred computation and receives the same shared result. Long-running
//! initialization work (database loads, remote API calls, expensive
//! derivations) therefore never runs more than once per cache epoch, no
//! matter how many threads or tasks request it at the same time.
//!
//! ## Features
//!
//! - **Single-flight loading**: per-key deduplication of concurrent factory
//!   executions, for both sync and async factories
//! - **TTL expiration**: absolute per-entry time-to-live computed on a
//!   monotonic clock, with optional eviction callbacks
//! - **No negative caching**: failed factories are evicted before the error
//!   propagates, so failures are always retried by the next caller
//! - **Pluggable storage**: a plain concurrent-map store with insert-time
//!   expiry, or a managed store with background reclamation and O(1)
//!   swap-based clear
//! - **Self-expiring results**: factories may return the value *and* the
//!   policy it should be cached under, for validity windows only known after
//!   the fetch (e.g. externally issued tokens)
//! - **Process-wide facade**: a lazily-initialized default cache instance
//!   ([`default_cache`]) for drop-in use at any layer of an application
//! - **Static memoization**: a no-expiration per-key memo cache
//!   ([`LazyStaticInMemoryCache`]) for compute-once-never-changes values
//! - **Config-driven TTLs**: an injected configuration reader resolving TTL
//!   strings (`"300"`, `"1:30:00"`, `"off"`) into policies ([`config`])
//!
//! ## Quick Start
//!
//! ```
//! use std::time::Duration;
//! use lazycache::{ExpirationPolicy, LazyCacheHandler, MapCacheStore};
//!
//! let cache = LazyCacheHandler::new(MapCacheStore::new());
//!
//! let report = cache
//!     .get_or_add(
//!         "daily-report",
//!         || Ok(String::from("...expensive aggregation...")),
//!         ExpirationPolicy::absolute(Duration::from_secs(300)),
//!     )
//!     .unwrap();
//!
//! // Served from cache; the factory is not run again.
//! let cached = cache
//!     .get_or_add(
//!         "daily-report",
//!         || Ok(String::new()),
//!         ExpirationPolicy::absolute(Duration::from_secs(300)),
//!     )
//!     .unwrap();
//! assert!(std::sync::Arc::ptr_eq(&report, &cached));
//! ```

mod deferred;
mod error;
mod handler;
mod keys;
mod managed_store;
mod policy;
mod static_memo;
mod store;

pub mod config;
pub mod default_cache;

pub use deferred::{AsyncDeferred, Deferred};
pub use error::{CacheError, SharedFailure};
pub use handler::LazyCacheHandler;
pub use keys::{CacheKey, DefaultCacheKey};
pub use managed_store::{ManagedTtlStore, DEFAULT_SWEEP_INTERVAL};
pub use policy::{
    randomize_ttl_distribution, CacheParams, EvictionCallback, Expiration, ExpirationPolicy,
    PolicyCell, PolicySource, SelfExpiringResult,
};
pub use static_memo::LazyStaticInMemoryCache;
pub use store::{CachePayload, LazyCacheStore, MapCacheStore};
