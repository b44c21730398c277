//! Process-wide default cache facade.
//!
//! A single [`LazyCacheHandler`] bound to a [`ManagedTtlStore`], lazily
//! constructed on first use and retained for the process lifetime. There is no
//! teardown beyond process exit; [`clear_entire_cache`] resets the contents
//! without destroying the singleton.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use lazycache::{default_cache, ExpirationPolicy};
//!
//! let policy = ExpirationPolicy::absolute(Duration::from_secs(60));
//! let value = default_cache::get_or_add(
//!     "docs::default_cache::answer",
//!     || Ok(String::from("cached once")),
//!     policy,
//! )
//! .unwrap();
//! assert_eq!(*value, "cached once");
//! ```

use std::future::Future;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::CacheError;
use crate::handler::LazyCacheHandler;
use crate::keys::CacheKey;
use crate::managed_store::ManagedTtlStore;
use crate::policy::{ExpirationPolicy, PolicySource, SelfExpiringResult};

static DEFAULT_CACHE: Lazy<LazyCacheHandler<ManagedTtlStore>> =
    Lazy::new(|| LazyCacheHandler::new(ManagedTtlStore::new()));

/// The singleton handler itself, for callers that want the full API surface.
pub fn handler() -> &'static LazyCacheHandler<ManagedTtlStore> {
    &DEFAULT_CACHE
}

/// Single-flight get-or-add against the process-wide cache.
pub fn get_or_add<K, T, F>(key: &K, factory: F, policy: ExpirationPolicy) -> Result<Arc<T>, CacheError>
where
    K: CacheKey + ?Sized,
    T: Send + Sync + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    DEFAULT_CACHE.get_or_add(key, factory, policy)
}

/// [`get_or_add`] with the policy resolved from a [`PolicySource`].
pub fn get_or_add_with_policy_source<K, T, F, P>(
    key: &K,
    factory: F,
    policy_source: &P,
) -> Result<Arc<T>, CacheError>
where
    K: CacheKey + ?Sized,
    T: Send + Sync + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    P: PolicySource + ?Sized,
{
    DEFAULT_CACHE.get_or_add_with_policy_source(key, factory, policy_source)
}

/// Async single-flight get-or-add against the process-wide cache.
pub async fn get_or_add_async<K, T, F, Fut>(
    key: &K,
    factory: F,
    policy: ExpirationPolicy,
) -> Result<Arc<T>, CacheError>
where
    K: CacheKey + ?Sized,
    T: Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    DEFAULT_CACHE.get_or_add_async(key, factory, policy).await
}

/// [`get_or_add_async`] with the policy resolved from a [`PolicySource`].
pub async fn get_or_add_async_with_policy_source<K, T, F, Fut, P>(
    key: &K,
    factory: F,
    policy_source: &P,
) -> Result<Arc<T>, CacheError>
where
    K: CacheKey + ?Sized,
    T: Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    P: PolicySource + ?Sized,
{
    DEFAULT_CACHE
        .get_or_add_async_with_policy_source(key, factory, policy_source)
        .await
}

/// Get-or-add where the factory returns a [`SelfExpiringResult`].
pub fn get_or_add_self_expiring<K, T, F>(key: &K, factory: F) -> Result<Arc<T>, CacheError>
where
    K: CacheKey + ?Sized,
    T: Send + Sync + 'static,
    F: FnOnce() -> anyhow::Result<SelfExpiringResult<T>> + Send + 'static,
{
    DEFAULT_CACHE.get_or_add_self_expiring(key, factory)
}

/// Async variant of [`get_or_add_self_expiring`].
pub async fn get_or_add_self_expiring_async<K, T, F, Fut>(
    key: &K,
    factory: F,
) -> Result<Arc<T>, CacheError>
where
    K: CacheKey + ?Sized,
    T: Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<SelfExpiringResult<T>>> + Send + 'static,
{
    DEFAULT_CACHE.get_or_add_self_expiring_async(key, factory).await
}

/// Evict the entry for `key` from the process-wide cache.
pub fn remove_from_cache<K>(key: &K) -> Result<(), CacheError>
where
    K: CacheKey + ?Sized,
{
    DEFAULT_CACHE.remove(key)
}

/// Reset the process-wide cache contents without destroying the singleton.
pub fn clear_entire_cache() {
    DEFAULT_CACHE.clear_all();
}

/// Number of live entries in the process-wide cache.
pub fn cache_entry_count() -> usize {
    DEFAULT_CACHE.cache_entry_count()
}
