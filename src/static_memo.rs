use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::deferred::{AsyncDeferred, Deferred};
use crate::error::CacheError;

/// Per-key, exactly-once memoization cache with no expiration.
///
/// Entries live until explicitly removed or the cache is cleared, which makes
/// this the right tool for values that are computed once and never change
/// (derived metadata, reflection-style lookups, parsed static resources).
/// Sync and async factories are memoized in two separate concurrent maps over
/// the same key type, each following the same single-flight-with-eviction-on-
/// failure protocol as the TTL cache: the factory runs at most once per key,
/// failures are never cached, and all callers share one `Arc`.
///
/// # Examples
///
/// ```
/// use lazycache::LazyStaticInMemoryCache;
///
/// let cache: LazyStaticInMemoryCache<String, usize> = LazyStaticInMemoryCache::new();
///
/// let first = cache
///     .get_or_add("alpha".to_owned(), |key| Ok(key.len()))
///     .unwrap();
/// let second = cache
///     .get_or_add("alpha".to_owned(), |_| Ok(999))
///     .unwrap();
///
/// assert_eq!(*first, 5);
/// // Second factory never ran.
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// assert_eq!(cache.get_cache_count(), 1);
/// ```
pub struct LazyStaticInMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    sync_cache: DashMap<K, Arc<Deferred<V>>>,
    async_cache: DashMap<K, Arc<AsyncDeferred<V>>>,
    clear_lock: Mutex<()>,
}

impl<K, V> Default for LazyStaticInMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> LazyStaticInMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            sync_cache: DashMap::new(),
            async_cache: DashMap::new(),
            clear_lock: Mutex::new(()),
        }
    }

    /// Get the memoized value for `key`, or run `factory` exactly once to
    /// produce it. The factory receives the key it is computing for.
    pub fn get_or_add<F>(&self, key: K, factory: F) -> Result<Arc<V>, CacheError>
    where
        F: FnOnce(&K) -> anyhow::Result<V> + Send + 'static,
    {
        let deferred = {
            let factory_key = key.clone();
            let entry = self
                .sync_cache
                .entry(key.clone())
                .or_insert_with(move || Arc::new(Deferred::new(move || factory(&factory_key))));
            entry.value().clone()
        };

        match deferred.force() {
            Ok(value) => Ok(value),
            Err(error) => {
                // No negative caching: drop the failed unit so the next
                // caller re-attempts the factory.
                self.sync_cache.remove(&key);
                Err(error)
            }
        }
    }

    /// Async counterpart of [`LazyStaticInMemoryCache::get_or_add`], memoizing
    /// the factory's future so concurrent awaiting callers share one
    /// execution.
    pub async fn get_or_add_async<F, Fut>(&self, key: K, factory: F) -> Result<Arc<V>, CacheError>
    where
        F: FnOnce(&K) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let deferred = {
            let factory_key = key.clone();
            let entry = self.async_cache.entry(key.clone()).or_insert_with(move || {
                Arc::new(AsyncDeferred::new(move || async move {
                    factory(&factory_key).await
                }))
            });
            entry.value().clone()
        };

        match deferred.force().await {
            Ok(value) => Ok(value),
            Err(error) => {
                self.async_cache.remove(&key);
                Err(error)
            }
        }
    }

    /// Evict the sync-memoized entry for `key`; returns whether one existed.
    pub fn try_remove(&self, key: &K) -> bool {
        self.sync_cache.remove(key).is_some()
    }

    /// Evict the async-memoized entry for `key`; returns whether one existed.
    pub fn try_remove_async_value(&self, key: &K) -> bool {
        self.async_cache.remove(key).is_some()
    }

    /// Clear both maps, returning the total number of entries removed.
    ///
    /// The empty-cache fast path takes no lock; when entries exist the count
    /// is double-checked under the clear lock so concurrent clears cannot
    /// report the same entries twice.
    pub fn clear_cache(&self) -> usize {
        if self.sync_cache.is_empty() && self.async_cache.is_empty() {
            return 0;
        }

        let _guard = self.clear_lock.lock();
        let total = self.sync_cache.len() + self.async_cache.len();
        if total > 0 {
            self.sync_cache.clear();
            self.async_cache.clear();
            debug!(cleared = total, "cleared static memo cache");
        }
        total
    }

    /// Total entries across the sync and async maps.
    pub fn get_cache_count(&self) -> usize {
        self.sync_cache.len() + self.async_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_sync_memoizes_exactly_once() {
        let cache: LazyStaticInMemoryCache<&'static str, u32> = LazyStaticInMemoryCache::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_ref = runs.clone();
        let first = cache
            .get_or_add("k", move |_| {
                runs_ref.fetch_add(1, Ordering::SeqCst);
                Ok(11)
            })
            .unwrap();
        let second = cache.get_or_add("k", |_| Ok(22)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, 11);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sync_failure_not_cached() {
        let cache: LazyStaticInMemoryCache<&'static str, u32> = LazyStaticInMemoryCache::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let runs_ref = runs.clone();
            let result = cache.get_or_add("failing", move |_| -> anyhow::Result<u32> {
                runs_ref.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("nope"))
            });
            assert!(result.is_err());
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(cache.get_cache_count(), 0);
    }

    #[test]
    fn test_try_remove_targets_only_its_map() {
        let cache: LazyStaticInMemoryCache<&'static str, u32> = LazyStaticInMemoryCache::new();
        cache.get_or_add("sync", |_| Ok(1)).unwrap();
        assert!(cache.try_remove(&"sync"));
        assert!(!cache.try_remove(&"sync"));
        assert!(!cache.try_remove_async_value(&"sync"));
    }

    #[test]
    fn test_clear_cache_counts_both_maps() {
        let cache: LazyStaticInMemoryCache<String, u32> = LazyStaticInMemoryCache::new();
        assert_eq!(cache.clear_cache(), 0);

        cache.get_or_add("a".to_owned(), |_| Ok(1)).unwrap();
        cache.get_or_add("b".to_owned(), |_| Ok(2)).unwrap();
        assert_eq!(cache.get_cache_count(), 2);
        assert_eq!(cache.clear_cache(), 2);
        assert_eq!(cache.get_cache_count(), 0);
    }

    #[tokio::test]
    async fn test_async_memoizes_exactly_once() {
        let cache: LazyStaticInMemoryCache<String, String> = LazyStaticInMemoryCache::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_ref = runs.clone();
        let first = cache
            .get_or_add_async("meta".to_owned(), move |key| {
                let key = key.clone();
                async move {
                    runs_ref.fetch_add(1, Ordering::SeqCst);
                    Ok(format!("derived-{key}"))
                }
            })
            .await
            .unwrap();
        let second = cache
            .get_or_add_async("meta".to_owned(), |_| async { Ok(String::from("other")) })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, "derived-meta");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_failure_not_cached() {
        let cache: LazyStaticInMemoryCache<&'static str, u32> = LazyStaticInMemoryCache::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let runs_ref = runs.clone();
            let result = cache
                .get_or_add_async("failing", move |_| async move {
                    runs_ref.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(anyhow!("still nope"))
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get_cache_count(), 0);
    }
}
