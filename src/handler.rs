use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tracing::trace;

use crate::deferred::{AsyncDeferred, Deferred};
use crate::error::CacheError;
use crate::keys::{generate_valid_key, CacheKey};
use crate::managed_store::ManagedTtlStore;
use crate::policy::{CacheParams, ExpirationPolicy, PolicyCell, PolicySource, SelfExpiringResult};
use crate::store::{CachePayload, LazyCacheStore, MapCacheStore};

/// The single-flight lazy cache engine.
///
/// Wraps a value factory in a deferred, memoized computation unit, inserts the
/// unit into the configured [`LazyCacheStore`] keyed by the derived string
/// key, and resolves it, guaranteeing the factory executes at most once per
/// key per entry lifetime, with every concurrent caller blocking on and
/// receiving the same result. Failed computations are evicted before the
/// failure propagates, so errors are never cached.
///
/// The handler is agnostic to storage strategy: pair it with
/// [`MapCacheStore`] for manual-expiry semantics or [`ManagedTtlStore`] for
/// proactive TTL reclamation (the default).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use lazycache::{ExpirationPolicy, LazyCacheHandler, MapCacheStore};
///
/// let cache = LazyCacheHandler::new(MapCacheStore::new());
/// let policy = ExpirationPolicy::absolute(Duration::from_secs(60));
///
/// let first = cache
///     .get_or_add("answer", || Ok(21 * 2), policy.clone())
///     .unwrap();
/// let second = cache
///     .get_or_add("answer", || Ok(0), policy)
///     .unwrap();
///
/// // The second factory never ran; both callers share one value.
/// assert_eq!(*second, 42);
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
pub struct LazyCacheHandler<S: LazyCacheStore> {
    store: S,
}

/// Memoized outcome of a self-expiring factory: the shared value plus the
/// policy it discovered.
struct SelfExpiringInner<T> {
    value: Arc<T>,
    policy: ExpirationPolicy,
}

fn downcast_payload<D>(payload: CachePayload, key: &str) -> Result<Arc<D>, CacheError>
where
    D: Any + Send + Sync,
{
    payload.downcast::<D>().map_err(|_| CacheError::TypeMismatch {
        key: key.to_owned(),
    })
}

impl Default for LazyCacheHandler<ManagedTtlStore> {
    fn default() -> Self {
        Self::new(ManagedTtlStore::new())
    }
}

impl LazyCacheHandler<MapCacheStore> {
    /// Handler over a plain concurrent-map store with insert-time expiry only.
    pub fn with_map_store() -> Self {
        Self::new(MapCacheStore::new())
    }
}

impl<S: LazyCacheStore> LazyCacheHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Get the cached value for `key`, or run `factory` exactly once to
    /// produce it.
    ///
    /// If `policy` is disabled the store is bypassed entirely: the factory
    /// runs fresh on every call and nothing is inserted. Otherwise the caller
    /// that wins the insert race executes the factory while every concurrent
    /// caller for the same key blocks until it completes; all of them receive
    /// the same `Arc`. A failing factory is evicted before the error returns,
    /// so the next call re-attempts from scratch.
    pub fn get_or_add<K, T, F>(
        &self,
        key: &K,
        factory: F,
        policy: ExpirationPolicy,
    ) -> Result<Arc<T>, CacheError>
    where
        K: CacheKey + ?Sized,
        T: Send + Sync + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let cache_key = generate_valid_key(key)?;

        if !policy.is_enabled() {
            trace!(key = %cache_key, "caching disabled for key; invoking factory uncached");
            return factory().map(Arc::new).map_err(CacheError::factory);
        }

        let deferred = Arc::new(Deferred::new(factory));
        let payload: CachePayload = deferred;
        let existing =
            self.store
                .add_or_get_existing(&cache_key, payload, PolicyCell::fixed(policy));
        let resolved = downcast_payload::<Deferred<T>>(existing, &cache_key)?;

        match resolved.force() {
            Ok(value) => Ok(value),
            Err(error) => {
                // Never cache failures: evict before propagating.
                self.store.remove(&cache_key);
                Err(error)
            }
        }
    }

    /// [`LazyCacheHandler::get_or_add`] with the policy resolved from a
    /// [`PolicySource`].
    pub fn get_or_add_with_policy_source<K, T, F, P>(
        &self,
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
        self.get_or_add(key, factory, policy_source.generate_policy())
    }

    /// [`LazyCacheHandler::get_or_add`] driven by a single parameter object
    /// carrying both the key and the policy.
    pub fn get_or_add_with_params<P, T, F>(&self, params: &P, factory: F) -> Result<Arc<T>, CacheError>
    where
        P: CacheParams + ?Sized,
        T: Send + Sync + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.get_or_add(params, factory, params.generate_policy())
    }

    /// Async get-or-add: the factory's future is memoized and shared, so all
    /// awaiting callers poll one future instance on their own execution
    /// context (no background-thread dispatch). A faulted shared future is
    /// evicted on every awaiting caller's path before the failure is
    /// re-raised.
    pub async fn get_or_add_async<K, T, F, Fut>(
        &self,
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
        let cache_key = generate_valid_key(key)?;

        if !policy.is_enabled() {
            trace!(key = %cache_key, "caching disabled for key; invoking async factory uncached");
            return factory().await.map(Arc::new).map_err(CacheError::factory);
        }

        let deferred = Arc::new(AsyncDeferred::new(factory));
        let payload: CachePayload = deferred;
        let existing =
            self.store
                .add_or_get_existing(&cache_key, payload, PolicyCell::fixed(policy));
        let resolved = downcast_payload::<AsyncDeferred<T>>(existing, &cache_key)?;

        match resolved.force().await {
            Ok(value) => Ok(value),
            Err(error) => {
                self.store.remove(&cache_key);
                Err(error)
            }
        }
    }

    /// [`LazyCacheHandler::get_or_add_async`] with the policy resolved from a
    /// [`PolicySource`].
    pub async fn get_or_add_async_with_policy_source<K, T, F, Fut, P>(
        &self,
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
        self.get_or_add_async(key, factory, policy_source.generate_policy())
            .await
    }

    /// Get-or-add where the factory returns both the value and the policy it
    /// should be cached under ([`SelfExpiringResult`]), for validity windows
    /// discovered only at fetch time.
    ///
    /// The entry is inserted with a pending policy slot that the winning
    /// factory seals once the result is known; racing callers share the
    /// in-flight computation exactly as in the plain path. A discovered
    /// *disabled* policy evicts the entry immediately after the value is
    /// produced, so it is never served from cache.
    pub fn get_or_add_self_expiring<K, T, F>(&self, key: &K, factory: F) -> Result<Arc<T>, CacheError>
    where
        K: CacheKey + ?Sized,
        T: Send + Sync + 'static,
        F: FnOnce() -> anyhow::Result<SelfExpiringResult<T>> + Send + 'static,
    {
        let cache_key = generate_valid_key(key)?;

        let cell = PolicyCell::pending();
        let seal = cell.clone();
        let deferred = Arc::new(Deferred::new(move || {
            let (value, policy) = factory()?.into_parts();
            seal.seal(policy.clone());
            Ok(SelfExpiringInner {
                value: Arc::new(value),
                policy,
            })
        }));
        let payload: CachePayload = deferred;
        let existing = self.store.add_or_get_existing(&cache_key, payload, cell);
        let resolved = downcast_payload::<Deferred<SelfExpiringInner<T>>>(existing, &cache_key)?;

        match resolved.force() {
            Ok(inner) => {
                if !inner.policy.is_enabled() {
                    self.store.remove(&cache_key);
                }
                Ok(inner.value.clone())
            }
            Err(error) => {
                self.store.remove(&cache_key);
                Err(error)
            }
        }
    }

    /// Async variant of [`LazyCacheHandler::get_or_add_self_expiring`].
    pub async fn get_or_add_self_expiring_async<K, T, F, Fut>(
        &self,
        key: &K,
        factory: F,
    ) -> Result<Arc<T>, CacheError>
    where
        K: CacheKey + ?Sized,
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<SelfExpiringResult<T>>> + Send + 'static,
    {
        let cache_key = generate_valid_key(key)?;

        let cell = PolicyCell::pending();
        let seal = cell.clone();
        let deferred = Arc::new(AsyncDeferred::new(move || async move {
            let (value, policy) = factory().await?.into_parts();
            seal.seal(policy.clone());
            Ok(SelfExpiringInner {
                value: Arc::new(value),
                policy,
            })
        }));
        let payload: CachePayload = deferred;
        let existing = self.store.add_or_get_existing(&cache_key, payload, cell);
        let resolved =
            downcast_payload::<AsyncDeferred<SelfExpiringInner<T>>>(existing, &cache_key)?;

        match resolved.force().await {
            Ok(inner) => {
                if !inner.policy.is_enabled() {
                    self.store.remove(&cache_key);
                }
                Ok(inner.value.clone())
            }
            Err(error) => {
                self.store.remove(&cache_key);
                Err(error)
            }
        }
    }

    /// Evict the entry for `key`, if present.
    pub fn remove<K>(&self, key: &K) -> Result<(), CacheError>
    where
        K: CacheKey + ?Sized,
    {
        let cache_key = generate_valid_key(key)?;
        self.store.remove(&cache_key);
        Ok(())
    }

    /// Evict every entry.
    pub fn clear_all(&self) {
        self.store.clear_all();
    }

    /// Number of live entries in the underlying store.
    pub fn cache_entry_count(&self) -> usize {
        self.store.cache_entry_count()
    }

    /// Whether an entry exists for `key`.
    pub fn exists<K>(&self, key: &K) -> Result<bool, CacheError>
    where
        K: CacheKey + ?Sized,
    {
        let cache_key = generate_valid_key(key)?;
        Ok(self.store.exists(&cache_key))
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}
