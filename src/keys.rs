use crate::CacheError;

/// Trait for deriving the string cache key from an arbitrary key object.
///
/// The generated string is the *sole* identity used by the cache store: two
/// logically-equal keys must generate identical strings. Implement this trait
/// directly for strongly-typed key structs (recommended for traceability), or
/// opt into the [`DefaultCacheKey`] fallback for types whose `Display` output
/// is already a valid unique key.
///
/// # Examples
///
/// ```
/// use lazycache::CacheKey;
///
/// struct UserKey {
///     tenant: &'static str,
///     user_id: u64,
/// }
///
/// impl CacheKey for UserKey {
///     fn generate_key(&self) -> String {
///         format!("user::{}::{}", self.tenant, self.user_id)
///     }
/// }
///
/// let key = UserKey { tenant: "acme", user_id: 42 };
/// assert_eq!(key.generate_key(), "user::acme::42");
/// ```
pub trait CacheKey {
    /// Render this key as its canonical cache key string.
    fn generate_key(&self) -> String;
}

/// Opt-in marker that derives the cache key from a type's `Display` output.
///
/// This is the fallback for key types that already render a valid unique key,
/// mirroring plain string formatting without a hand-written [`CacheKey`] impl:
///
/// ```
/// use std::fmt;
/// use lazycache::{CacheKey, DefaultCacheKey};
///
/// struct ReportId(u32);
///
/// impl fmt::Display for ReportId {
///     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
///         write!(f, "report-{}", self.0)
///     }
/// }
///
/// impl DefaultCacheKey for ReportId {}
///
/// assert_eq!(ReportId(7).generate_key(), "report-7");
/// ```
pub trait DefaultCacheKey: std::fmt::Display {}

impl<T: DefaultCacheKey + ?Sized> CacheKey for T {
    fn generate_key(&self) -> String {
        self.to_string()
    }
}

impl DefaultCacheKey for str {}
impl DefaultCacheKey for String {}
impl DefaultCacheKey for &str {}

macro_rules! impl_default_cache_key {
    ($($ty:ty),* $(,)?) => {
        $(impl DefaultCacheKey for $ty {})*
    };
}

impl_default_cache_key!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, char);

/// Derives and validates the string cache key for a key object.
///
/// An empty generated key carries no identity and is rejected before the store
/// is ever touched.
pub(crate) fn generate_valid_key<K>(key: &K) -> Result<String, CacheError>
where
    K: CacheKey + ?Sized,
{
    let cache_key = key.generate_key();
    if cache_key.is_empty() {
        return Err(CacheError::InvalidKey);
    }
    Ok(cache_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_keys_pass_through() {
        assert_eq!("abc".generate_key(), "abc");
        assert_eq!(String::from("abc").generate_key(), "abc");
        assert_eq!(42u64.generate_key(), "42");
        assert_eq!((-7i32).generate_key(), "-7");
    }

    #[test]
    fn test_custom_key_impl() {
        struct Composite(&'static str, u32);
        impl CacheKey for Composite {
            fn generate_key(&self) -> String {
                format!("{}::{}", self.0, self.1)
            }
        }
        assert_eq!(Composite("orders", 9).generate_key(), "orders::9");
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = generate_valid_key("");
        assert!(matches!(result, Err(CacheError::InvalidKey)));
    }

    #[test]
    fn test_non_empty_key_accepted() {
        let result = generate_valid_key("live");
        assert_eq!(result.unwrap(), "live");
    }
}
