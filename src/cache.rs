//! Resolved-link cache.
//!
//! Maps an embed identifier to the last manifest URL observed for it.
//! Staleness is checked lazily on lookup; stale entries stay in the map
//! until the next successful resolution overwrites them.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default TTL for resolved links. Upstream manifest URLs are signed and
/// stop working a few hours after they are issued.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Source of "now" for the cache.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|p| p.into_inner());
        self.origin + offset
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    resolved_url: String,
    observed_at: Instant,
}

/// Thread-safe identifier → manifest URL cache with TTL-based invalidation.
#[derive(Clone, Debug)]
pub struct ResolutionCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResolutionCache {
    /// Create a cache with the given TTL on the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            clock,
        }
    }

    /// Return the cached URL for `identifier` if it is younger than the TTL.
    pub fn lookup(&self, identifier: &str) -> Option<String> {
        let entry = self.entries.get(identifier)?;
        let age = self.clock.now().saturating_duration_since(entry.observed_at);
        if age < self.ttl {
            return Some(entry.resolved_url.clone());
        }
        debug!(
            "Cached link for {} is stale ({}s old)",
            identifier,
            age.as_secs()
        );
        None
    }

    /// Record `url` as the latest resolution for `identifier`, replacing any
    /// previous entry.
    pub fn store(&self, identifier: &str, url: String) {
        self.entries.insert(
            identifier.to_string(),
            CacheEntry {
                resolved_url: url,
                observed_at: self.clock.now(),
            },
        );
    }

    /// Number of stored entries, fresh or stale.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://cdn.example/abc123/master.m3u8";

    fn manual_cache(ttl: Duration) -> (ResolutionCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (ResolutionCache::with_clock(ttl, clock.clone()), clock)
    }

    #[test]
    fn hit_within_ttl() {
        let (cache, clock) = manual_cache(DEFAULT_TTL);
        cache.store("abc123", URL.to_string());
        clock.advance(Duration::from_secs(60 * 60));

        assert_eq!(cache.lookup("abc123"), Some(URL.to_string()));
    }

    #[test]
    fn miss_for_unknown_identifier() {
        let cache = ResolutionCache::default();
        assert_eq!(cache.lookup("never-seen"), None);
    }

    #[test]
    fn miss_once_ttl_reached() {
        let (cache, clock) = manual_cache(DEFAULT_TTL);
        cache.store("abc123", URL.to_string());

        clock.advance(DEFAULT_TTL - Duration::from_millis(1));
        assert!(cache.lookup("abc123").is_some());

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.lookup("abc123"), None, "age == TTL is stale");
    }

    #[test]
    fn stale_entry_is_kept_until_overwritten() {
        let (cache, clock) = manual_cache(Duration::from_secs(10));
        cache.store("abc123", URL.to_string());
        clock.advance(Duration::from_secs(11));

        assert_eq!(cache.lookup("abc123"), None);
        assert_eq!(cache.len(), 1);

        cache.store("abc123", "https://cdn.example/abc123/v2.m3u8".to_string());
        assert_eq!(
            cache.lookup("abc123").as_deref(),
            Some("https://cdn.example/abc123/v2.m3u8")
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn overwrite_replaces_and_refreshes_entry() {
        let (cache, clock) = manual_cache(Duration::from_secs(10));
        cache.store("abc123", "https://cdn.example/old.m3u8".to_string());
        clock.advance(Duration::from_secs(8));
        cache.store("abc123", "https://cdn.example/new.m3u8".to_string());
        clock.advance(Duration::from_secs(8));

        assert_eq!(
            cache.lookup("abc123").as_deref(),
            Some("https://cdn.example/new.m3u8")
        );
    }

    #[test]
    fn keys_are_independent() {
        let cache = ResolutionCache::default();
        cache.store("a", "https://cdn.example/a.m3u8".to_string());
        cache.store("b", "https://cdn.example/b.m3u8".to_string());

        assert_eq!(cache.lookup("a").as_deref(), Some("https://cdn.example/a.m3u8"));
        assert_eq!(cache.lookup("b").as_deref(), Some("https://cdn.example/b.m3u8"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn clones_share_entries() {
        let cache = ResolutionCache::default();
        let other = cache.clone();
        cache.store("abc123", URL.to_string());
        assert_eq!(other.lookup("abc123"), Some(URL.to_string()));
    }
}
