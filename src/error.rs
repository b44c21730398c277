use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A clonable wrapper around a value-factory failure.
///
/// When a factory raises an error, every caller sharing that computation epoch
/// must observe the *same* failure (the factory is never re-run on their
/// behalf). The original `anyhow::Error` is therefore held behind an `Arc` so
/// the failure can be handed to any number of concurrent or late-arriving
/// callers without cloning the error itself.
#[derive(Clone)]
pub struct SharedFailure(Arc<anyhow::Error>);

impl SharedFailure {
    pub(crate) fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// Borrow the original factory error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Returns true if both handles refer to the same underlying failure,
    /// i.e. they came from the same factory execution.
    pub fn same_failure(&self, other: &SharedFailure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for SharedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for SharedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for SharedFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + Send + Sync + 'static) = (*self.0).as_ref();
        Some(source)
    }
}

/// Errors produced by cache operations.
///
/// Factory failures are never cached (no negative caching): the failing entry
/// is evicted before [`CacheError::Factory`] reaches the caller, so the next
/// caller re-attempts the factory from scratch.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key object generated an empty cache key string.
    #[error("cache key generated an empty string; a non-empty cache key is required")]
    InvalidKey,

    /// The payload cached under this key holds a different value type than the
    /// one requested. Reusing one cache key for two value types is a caller
    /// bug; the entry is left untouched.
    #[error("cached payload for key `{key}` does not match the requested value type")]
    TypeMismatch { key: String },

    /// The user-supplied value factory failed. All callers sharing the failing
    /// computation observe the same underlying failure.
    #[error("value factory failed: {0}")]
    Factory(#[source] SharedFailure),
}

impl CacheError {
    pub(crate) fn factory(error: anyhow::Error) -> Self {
        CacheError::Factory(SharedFailure::new(error))
    }

    /// Borrow the original factory error, if this is a factory failure.
    pub fn factory_error(&self) -> Option<&anyhow::Error> {
        match self {
            CacheError::Factory(shared) => Some(shared.inner()),
            _ => None,
        }
    }
}
