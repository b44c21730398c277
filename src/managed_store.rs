use std::mem;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::policy::PolicyCell;
use crate::store::{add_or_get_existing_in, remove_in, CachePayload, LazyCacheStore, StoredEntry};

/// How often the background sweeper reclaims expired entries by default.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// TTL-enforcing store with proactive reclamation and O(1) bulk clear.
///
/// Entries are reclaimed independently of whether their key is ever revisited:
/// a background sweeper thread walks the backing map on a fixed interval and
/// evicts everything whose policy has expired, firing eviction callbacks as it
/// goes. The sweeper holds only a [`Weak`] reference, so dropping the store
/// stops it.
///
/// [`LazyCacheStore::clear_all`] swaps the entire backing map for a fresh
/// empty one under a short write lock and disposes the old instance out of
/// band. Concurrent readers see either the fully-populated old map or the
/// fully-empty new one, never a partially-cleared view.
pub struct ManagedTtlStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    backing: RwLock<Arc<DashMap<String, StoredEntry>>>,
}

impl ManagedTtlStore {
    /// Store with the default sweep interval.
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// Store whose sweeper runs every `interval`.
    pub fn with_sweep_interval(interval: Duration) -> Self {
        let inner = Arc::new(StoreInner {
            backing: RwLock::new(Arc::new(DashMap::new())),
        });

        let weak: Weak<StoreInner> = Arc::downgrade(&inner);
        let spawned = thread::Builder::new()
            .name("lazycache-sweeper".into())
            .spawn(move || loop {
                thread::sleep(interval);
                match weak.upgrade() {
                    Some(inner) => {
                        inner.sweep();
                    }
                    None => break,
                }
            });
        if let Err(error) = spawned {
            warn!(%error, "failed to spawn cache sweeper thread; expired entries will only be reclaimed on access");
        }

        Self { inner }
    }

    /// Reclaims every currently-expired entry immediately, returning how many
    /// were evicted. The background sweeper calls this on its interval; tests
    /// and latency-sensitive callers may invoke it directly.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }
}

impl Default for ManagedTtlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreInner {
    fn snapshot(&self) -> Arc<DashMap<String, StoredEntry>> {
        self.backing.read().clone()
    }

    fn sweep(&self) -> usize {
        let map = self.snapshot();
        let expired: Vec<String> = map
            .iter()
            .filter(|entry| entry.value().policy.is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let mut reclaimed = 0;
        for key in expired {
            // Re-check under the shard lock so a freshly replaced live entry
            // is not evicted by a stale observation.
            if let Some((removed_key, entry)) = map.remove_if(&key, |_, e| e.policy.is_expired()) {
                entry.policy.fire_evicted(&removed_key);
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            debug!(reclaimed, "sweeper reclaimed expired cache entries");
        }
        reclaimed
    }
}

impl LazyCacheStore for ManagedTtlStore {
    fn add_or_get_existing(
        &self,
        key: &str,
        value: CachePayload,
        policy: Arc<PolicyCell>,
    ) -> CachePayload {
        add_or_get_existing_in(&self.inner.snapshot(), key, value, policy)
    }

    fn remove(&self, key: &str) {
        remove_in(&self.inner.snapshot(), key);
    }

    fn clear_all(&self) {
        let old = {
            let mut backing = self.inner.backing.write();
            mem::replace(&mut *backing, Arc::new(DashMap::new()))
        };
        debug!(disposed_entries = old.len(), "cleared managed cache via backing swap");

        // Dispose the old instance outside any lock, firing callbacks for
        // every entry it still held.
        for entry in old.iter() {
            entry.value().policy.fire_evicted(entry.key());
        }
    }

    fn cache_entry_count(&self) -> usize {
        self.inner.snapshot().len()
    }

    fn exists(&self, key: &str) -> bool {
        self.inner.snapshot().contains_key(key)
    }
}
