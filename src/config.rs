//! TTL configuration resolution.
//!
//! The cache core never reads configuration sources directly. Instead a
//! string-to-string reader is registered once at process start via
//! [`bootstrap_config_value_reader`] (backed by environment variables, an app
//! settings map, a remote config service, anything), and TTL values are
//! resolved and memoized from it on demand. Parsed TTLs are cached for the
//! process lifetime; configuration values are assumed static once read.
//!
//! Accepted value forms, mirroring the historical behavior:
//!
//! - `"off"` (case-insensitive) or a negative number → never cache
//! - `"300"` → 300 seconds
//! - `"1:30"` / `"0:05:30"` → clock form, `hours:minutes[:seconds]`
//! - missing / blank → not configured (caller fallback applies)
//! - anything else → never cache

use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::static_memo::LazyStaticInMemoryCache;

/// Fallback minimum TTL callers commonly pass when a key must resolve to
/// *some* caching window.
pub const DEFAULT_MINIMUM_CACHE_TTL: Duration = Duration::from_secs(60);

/// The "never cache" TTL: zero duration.
pub const NEVER_CACHE_TTL: Duration = Duration::ZERO;

type ConfigReader = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

static CONFIG_READER: RwLock<Option<ConfigReader>> = RwLock::new(None);

// Memoizes parsed TTLs per config key; None marks "not configured".
static TTL_CACHE: Lazy<LazyStaticInMemoryCache<String, Option<Duration>>> =
    Lazy::new(LazyStaticInMemoryCache::new);

/// Register the process-wide configuration value reader.
///
/// Re-registering replaces the reader and drops all memoized TTLs so values
/// are re-resolved through the new reader.
pub fn bootstrap_config_value_reader<F>(reader: F)
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    *CONFIG_READER.write() = Some(Box::new(reader));
    let dropped = TTL_CACHE.clear_cache();
    debug!(dropped, "bootstrapped cache config value reader");
}

/// Resolve the TTL for a single configuration key, clamped below by
/// `default_minimum_ttl`. A missing key resolves to the minimum.
pub fn get_cache_ttl_from_config(config_key: &str, default_minimum_ttl: Duration) -> Duration {
    match resolve_ttl(config_key) {
        Some(ttl) => ttl.max(default_minimum_ttl),
        None => default_minimum_ttl,
    }
}

/// Resolve a TTL by searching `config_keys` in order and returning the first
/// one that resolves to a positive TTL. Keys that are missing or resolve to
/// never-cache (`"off"`, zero, negative, garbage) are skipped so later keys
/// can still apply; `default_minimum_ttl` is the fallback when no key yields
/// a positive TTL.
pub fn get_cache_ttl_from_config_keys(config_keys: &[&str], default_minimum_ttl: Duration) -> Duration {
    for config_key in config_keys {
        if let Some(ttl) = resolve_ttl(config_key) {
            if ttl > NEVER_CACHE_TTL {
                return ttl;
            }
        }
    }
    default_minimum_ttl
}

fn resolve_ttl(config_key: &str) -> Option<Duration> {
    let resolved = TTL_CACHE.get_or_add(config_key.to_owned(), |key| {
        let reader = CONFIG_READER.read();
        let raw = reader.as_ref().and_then(|read| read(key));
        Ok(raw.as_deref().and_then(parse_ttl_value))
    });
    match resolved {
        Ok(ttl) => *ttl,
        // The parse factory is infallible; treat the impossible as missing.
        Err(_) => None,
    }
}

fn parse_ttl_value(raw: &str) -> Option<Duration> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if value.eq_ignore_ascii_case("off") {
        return Some(NEVER_CACHE_TTL);
    }
    if value.contains(':') {
        return Some(parse_clock_value(value));
    }
    match value.parse::<i64>() {
        Ok(seconds) if seconds > 0 => Some(Duration::from_secs(seconds as u64)),
        // Negative, zero, or unparseable all mean "never cache".
        _ => Some(NEVER_CACHE_TTL),
    }
}

// `hours:minutes` or `hours:minutes:seconds`; malformed or overflowing parts
// collapse to zero.
fn parse_clock_value(value: &str) -> Duration {
    let parts: Vec<&str> = value.split(':').collect();
    let parse = |part: &str| part.trim().parse::<u64>().ok();
    let components = match parts.as_slice() {
        [hours, minutes] => parse(hours).zip(parse(minutes)).map(|(h, m)| (h, m, 0)),
        [hours, minutes, seconds] => parse(hours)
            .zip(parse(minutes))
            .zip(parse(seconds))
            .map(|((h, m), s)| (h, m, s)),
        _ => None,
    };
    let total_seconds = components.and_then(|(hours, minutes, seconds)| {
        hours
            .checked_mul(3600)
            .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
            .and_then(|hm| hm.checked_add(seconds))
    });
    match total_seconds {
        Some(total) => Duration::from_secs(total),
        None => NEVER_CACHE_TTL,
    }
}
