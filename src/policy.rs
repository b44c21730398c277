use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;

use crate::config;
use crate::keys::CacheKey;

/// Callback invoked when the store reclaims an entry; receives the cache key.
///
/// Firing is store-dependent: immediate on explicit removal, or deferred to
/// the next access / background sweep for TTL-managed storage.
pub type EvictionCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// When an entry becomes invalid.
///
/// Modeled as an explicit tagged variant rather than sentinel timestamp
/// values, so "do not cache" and "cache forever" cannot be confused with a
/// real expiration instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiration {
    /// The entry must not be cached at all; the factory always runs fresh.
    Disabled,
    /// The entry never expires (explicit removal or clear only).
    Never,
    /// The entry is stale once this instant has passed.
    Timed(Instant),
}

/// Immutable description of when a cache entry expires, plus an optional
/// eviction callback.
///
/// Expiration instants are computed as `now + ttl` on a monotonic clock at
/// construction time, so wall-clock or timezone shifts can never stretch or
/// shrink an entry's lifetime.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use lazycache::ExpirationPolicy;
///
/// let timed = ExpirationPolicy::absolute(Duration::from_secs(300));
/// assert!(timed.is_enabled());
/// assert!(!timed.is_expired());
///
/// let off = ExpirationPolicy::disabled();
/// assert!(!off.is_enabled());
///
/// let forever = ExpirationPolicy::never();
/// assert!(forever.is_enabled());
/// assert!(!forever.is_expired());
/// ```
#[derive(Clone)]
pub struct ExpirationPolicy {
    expiration: Expiration,
    on_evicted: Option<EvictionCallback>,
}

impl ExpirationPolicy {
    /// Timed policy expiring `ttl` from now.
    ///
    /// A TTL large enough to overflow the clock saturates to [`Expiration::Never`].
    pub fn absolute(ttl: Duration) -> Self {
        Self::build(ttl, None)
    }

    /// Timed policy with an eviction callback fired when the store reclaims
    /// the entry.
    pub fn absolute_with_eviction(ttl: Duration, on_evicted: EvictionCallback) -> Self {
        Self::build(ttl, Some(on_evicted))
    }

    fn build(ttl: Duration, on_evicted: Option<EvictionCallback>) -> Self {
        let expiration = match Instant::now().checked_add(ttl) {
            Some(instant) => Expiration::Timed(instant),
            None => Expiration::Never,
        };
        Self {
            expiration,
            on_evicted,
        }
    }

    /// Policy whose entries live until explicitly removed or cleared.
    pub fn never() -> Self {
        Self {
            expiration: Expiration::Never,
            on_evicted: None,
        }
    }

    /// The canonical "do not cache" policy: the handler bypasses the store
    /// entirely and the factory runs on every call.
    pub fn disabled() -> Self {
        Self {
            expiration: Expiration::Disabled,
            on_evicted: None,
        }
    }

    /// Builds a timed policy from the first configuration key that resolves
    /// to a positive TTL, or `None` when every key is missing or resolves to
    /// never-cache. Requires a bootstrapped config reader (see
    /// [`config::bootstrap_config_value_reader`]).
    pub fn from_config_keys(ttl_config_keys: &[&str]) -> Option<Self> {
        Self::from_config_keys_with_eviction(ttl_config_keys, None)
    }

    /// Same as [`ExpirationPolicy::from_config_keys`] with an eviction
    /// callback attached to the resulting policy.
    pub fn from_config_keys_with_eviction(
        ttl_config_keys: &[&str],
        on_evicted: Option<EvictionCallback>,
    ) -> Option<Self> {
        let ttl = config::get_cache_ttl_from_config_keys(ttl_config_keys, config::NEVER_CACHE_TTL);
        if ttl > config::NEVER_CACHE_TTL {
            Some(Self::build(ttl, on_evicted))
        } else {
            None
        }
    }

    /// A policy is enabled iff it may store anything at all.
    pub fn is_enabled(&self) -> bool {
        self.expiration != Expiration::Disabled
    }

    /// Whether an entry carrying this policy is stale right now.
    ///
    /// A disabled policy is always stale so stores treat such entries as
    /// absent should one ever be observed.
    pub fn is_expired(&self) -> bool {
        match self.expiration {
            Expiration::Disabled => true,
            Expiration::Never => false,
            Expiration::Timed(at) => Instant::now() >= at,
        }
    }

    pub fn expiration(&self) -> Expiration {
        self.expiration
    }

    pub(crate) fn fire_evicted(&self, key: &str) {
        if let Some(callback) = &self.on_evicted {
            callback(key);
        }
    }
}

impl fmt::Debug for ExpirationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirationPolicy")
            .field("expiration", &self.expiration)
            .field("on_evicted", &self.on_evicted.is_some())
            .finish()
    }
}

/// Per-entry policy slot that is sealed exactly once.
///
/// The normal get-or-add path seals the slot up front ([`PolicyCell::fixed`]).
/// The self-expiring path inserts a pending slot ([`PolicyCell::pending`]) and
/// the winning factory seals it with the policy discovered alongside the
/// value; until then the entry is treated as live so racing callers share the
/// in-flight computation instead of replacing it.
pub struct PolicyCell(OnceCell<ExpirationPolicy>);

impl PolicyCell {
    /// Slot pre-sealed with a known policy.
    pub fn fixed(policy: ExpirationPolicy) -> Arc<Self> {
        let cell = OnceCell::new();
        // A fresh cell cannot already be set.
        let _ = cell.set(policy);
        Arc::new(Self(cell))
    }

    /// Unsealed slot for a policy discovered only after the factory runs.
    pub fn pending() -> Arc<Self> {
        Arc::new(Self(OnceCell::new()))
    }

    /// Seal the slot; the first seal wins and later seals are ignored.
    pub fn seal(&self, policy: ExpirationPolicy) {
        let _ = self.0.set(policy);
    }

    /// The sealed policy, if any.
    pub fn get(&self) -> Option<&ExpirationPolicy> {
        self.0.get()
    }

    /// A pending slot is never expired: its computation is still in flight.
    pub fn is_expired(&self) -> bool {
        self.0.get().map(ExpirationPolicy::is_expired).unwrap_or(false)
    }

    pub(crate) fn fire_evicted(&self, key: &str) {
        if let Some(policy) = self.0.get() {
            policy.fire_evicted(key);
        }
    }
}

impl fmt::Debug for PolicyCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PolicyCell").field(&self.0.get()).finish()
    }
}

/// Capability for objects that know how to build their own expiration policy,
/// letting callers pass a policy factory instead of a pre-built policy.
pub trait PolicySource {
    fn generate_policy(&self) -> ExpirationPolicy;
}

impl PolicySource for ExpirationPolicy {
    fn generate_policy(&self) -> ExpirationPolicy {
        self.clone()
    }
}

/// Grouping trait for parameter objects that carry both the cache key and the
/// expiration policy, so facades can take a single argument.
pub trait CacheParams: CacheKey + PolicySource {}

impl<T: CacheKey + PolicySource> CacheParams for T {}

/// A factory result that carries its own expiration policy, for values whose
/// validity window is only known after they are produced (e.g. an externally
/// issued token that reports its own expiry).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use lazycache::SelfExpiringResult;
///
/// let result = SelfExpiringResult::from_ttl("token-abc", Duration::from_secs(900));
/// assert!(result.policy().is_enabled());
/// assert_eq!(*result.value(), "token-abc");
/// ```
#[derive(Debug)]
pub struct SelfExpiringResult<T> {
    value: T,
    policy: ExpirationPolicy,
}

impl<T> SelfExpiringResult<T> {
    pub fn new(value: T, policy: ExpirationPolicy) -> Self {
        Self { value, policy }
    }

    /// Convenience constructor for an absolute TTL measured from now.
    pub fn from_ttl(value: T, ttl: Duration) -> Self {
        Self::new(value, ExpirationPolicy::absolute(ttl))
    }

    /// Convenience constructor resolving the policy from a [`PolicySource`].
    pub fn from_source(value: T, source: &dyn PolicySource) -> Self {
        Self::new(value, source.generate_policy())
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn policy(&self) -> &ExpirationPolicy {
        &self.policy
    }

    pub fn into_parts(self) -> (T, ExpirationPolicy) {
        (self.value, self.policy)
    }
}

/// Salts a TTL with a small random offset so that entries created together do
/// not all expire at the same instant, leveling out recomputation spikes in
/// high-load environments.
///
/// The salt is between 1 second and `max_seconds_distribution_range` (values
/// below 31 are raised to 31, keeping the historical minimum spread).
pub fn randomize_ttl_distribution(ttl: Duration, max_seconds_distribution_range: u64) -> Duration {
    let range = max_seconds_distribution_range.max(31);
    let salt_seconds = fastrand::u64(1..range);
    ttl + Duration::from_secs(salt_seconds)
}
