use std::any::Any;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::policy::PolicyCell;

/// Type-erased cache payload.
///
/// One store instance serves values of every type; the handler downcasts back
/// to the concrete deferred-computation type it inserted.
pub type CachePayload = Arc<dyn Any + Send + Sync>;

/// Capability contract any storage backend must satisfy for the single-flight
/// handler to work on top of it.
///
/// The linchpin is [`LazyCacheStore::add_or_get_existing`]: whichever caller
/// wins the insert race becomes the canonical initializer for the key, and
/// every loser receives the winner's payload unchanged. An entry whose stored
/// policy is already expired is treated as absent and replaced by the new
/// payload.
pub trait LazyCacheStore: Send + Sync {
    /// Atomically insert `value` under `key` if no live entry exists, else
    /// return the existing live payload (discarding `value` and `policy`).
    fn add_or_get_existing(
        &self,
        key: &str,
        value: CachePayload,
        policy: Arc<PolicyCell>,
    ) -> CachePayload;

    /// Unconditionally evict `key` if present. Idempotent.
    fn remove(&self, key: &str);

    /// Evict every entry.
    fn clear_all(&self);

    /// Number of live entries. Entries pending lazy expiration may still be
    /// reported until actually swept.
    fn cache_entry_count(&self) -> usize;

    fn exists(&self, key: &str) -> bool;
}

/// One stored `(payload, policy)` pair. Immutable once inserted; replacement
/// only happens when the existing entry has already expired.
pub(crate) struct StoredEntry {
    pub(crate) payload: CachePayload,
    pub(crate) policy: Arc<PolicyCell>,
}

/// Shared insert-if-absent-else-return-existing over a dashmap backing.
///
/// The shard lock is held only for the entry bookkeeping; eviction callbacks
/// for a replaced expired entry fire after the lock is released so user code
/// never runs inside the map.
pub(crate) fn add_or_get_existing_in(
    map: &DashMap<String, StoredEntry>,
    key: &str,
    value: CachePayload,
    policy: Arc<PolicyCell>,
) -> CachePayload {
    let mut replaced: Option<Arc<PolicyCell>> = None;
    let payload = match map.entry(key.to_owned()) {
        Entry::Occupied(mut occupied) => {
            if occupied.get().policy.is_expired() {
                let old = occupied.insert(StoredEntry {
                    payload: value.clone(),
                    policy,
                });
                replaced = Some(old.policy);
                value
            } else {
                occupied.get().payload.clone()
            }
        }
        Entry::Vacant(vacant) => {
            trace!(key, "inserted new cache entry");
            vacant.insert(StoredEntry {
                payload: value.clone(),
                policy,
            });
            value
        }
    };

    if let Some(old_policy) = replaced {
        debug!(key, "replaced expired cache entry on insert");
        old_policy.fire_evicted(key);
    }
    payload
}

pub(crate) fn remove_in(map: &DashMap<String, StoredEntry>, key: &str) {
    if let Some((removed_key, entry)) = map.remove(key) {
        debug!(key = %removed_key, "removed cache entry");
        entry.policy.fire_evicted(&removed_key);
    }
}

/// Plain concurrent-map store.
///
/// Expiration is enforced only at [`LazyCacheStore::add_or_get_existing`]
/// time: an expired entry is overwritten on the next insert attempt for its
/// key, but there is no proactive sweep, so an expired-but-never-revisited key
/// keeps counting toward [`LazyCacheStore::cache_entry_count`] until touched
/// again or cleared. For automatic reclamation use
/// [`crate::ManagedTtlStore`].
#[derive(Default)]
pub struct MapCacheStore {
    map: DashMap<String, StoredEntry>,
}

impl MapCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LazyCacheStore for MapCacheStore {
    fn add_or_get_existing(
        &self,
        key: &str,
        value: CachePayload,
        policy: Arc<PolicyCell>,
    ) -> CachePayload {
        add_or_get_existing_in(&self.map, key, value, policy)
    }

    fn remove(&self, key: &str) {
        remove_in(&self.map, key);
    }

    fn clear_all(&self) {
        debug!("clearing plain map cache store");
        self.map.clear();
    }

    fn cache_entry_count(&self) -> usize {
        self.map.len()
    }

    fn exists(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}
