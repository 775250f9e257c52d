//! Thread-safe TTL key/value cache with hit/miss accounting
//!
//! A single mutex guards both the entry map and the stats counters so every
//! hit/miss decision and the counter recording it happen under the same
//! critical section. No I/O happens under the lock; operations are O(1)
//! amortized and the cache stays small, so coarse locking is sufficient.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A single cache entry. Invariant: `expires_at > created_at`.
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Running counters, reset only by `clear`
#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
    total_requests: u64,
}

/// Snapshot of cache statistics. `hit_rate` is computed on read, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub cache_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub total_requests: u64,
    /// Hit rate as a percentage (0.0 when no requests yet)
    pub hit_rate: f64,
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    counters: Counters,
}

/// Generic thread-safe TTL cache.
///
/// None of the operations fail: a `get` on a missing or expired key returns
/// `None`, never an error.
pub struct TtlCache<V> {
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Get a value by key. An expired entry is evicted and counted as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock().expect("cache lock poisoned");
        let inner = &mut *guard;
        inner.counters.total_requests += 1;

        let now = Instant::now();
        match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let value = entry.value.clone();
                inner.counters.hits += 1;
                Some(value)
            }
            Some(_) => {
                inner.entries.remove(key);
                inner.counters.misses += 1;
                None
            }
            None => {
                inner.counters.misses += 1;
                None
            }
        }
    }

    /// Store a value with the given TTL. Always overwrites.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.counters.sets += 1;

        let now = Instant::now();
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Remove a key if present
    pub fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.remove(key);
    }

    /// Remove all entries and reset counters
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.clear();
        inner.counters = Counters::default();
    }

    /// Remove all expired entries. Returns how many were evicted.
    ///
    /// Uses the same expiry predicate as `get`, so the sweep and the lazy
    /// path always agree.
    pub fn evict_expired(&self) -> usize {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - inner.entries.len();
        if evicted > 0 {
            debug!(evicted = evicted, remaining = inner.entries.len(), "Cache sweep");
        }
        evicted
    }

    /// Snapshot current statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        let c = &inner.counters;
        let hit_rate = if c.total_requests > 0 {
            (c.hits as f64 / c.total_requests as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            cache_size: inner.entries.len(),
            hits: c.hits,
            misses: c.misses,
            sets: c.sets,
            total_requests: c.total_requests,
            hit_rate,
        }
    }

    /// Age of a live entry, if present (ignores expired entries)
    pub fn entry_age(&self, key: &str) -> Option<Duration> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        let now = Instant::now();
        inner
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| now.duration_since(e.created_at))
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that periodically evicts expired entries
pub fn spawn_cache_sweeper<V>(cache: Arc<TtlCache<V>>, interval: Duration)
where
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            cache.evict_expired();
        }
    });

    info!(interval_secs = interval.as_secs(), "Cache sweeper started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_set_get() {
        let cache: TtlCache<String> = TtlCache::new();

        assert!(cache.get("k").is_none());

        cache.set("k", "v".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_set_overwrites() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.set("k", 1, Duration::from_secs(60));
        cache.set("k", 2, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.stats().cache_size, 1);
    }

    #[test]
    fn test_expired_get_counts_miss() {
        let cache: TtlCache<String> = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_millis(20));

        sleep(Duration::from_millis(40));

        assert!(cache.get("k").is_none());
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
        // Expired entry is evicted on the lazy path
        assert_eq!(stats.cache_size, 0);
    }

    #[test]
    fn test_value_live_until_expiry() {
        let cache: TtlCache<String> = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_millis(100));

        // Repeated gets before expiry all hit
        for _ in 0..5 {
            assert_eq!(cache.get("k"), Some("v".to_string()));
        }

        sleep(Duration::from_millis(120));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_stats_invariant() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        cache.set("b", 2, Duration::from_secs(60));

        cache.get("a");
        cache.get("a");
        cache.get("missing");
        cache.get("b");

        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, stats.total_requests);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 2);
    }

    #[test]
    fn test_hit_rate_zero_without_requests() {
        let cache: TtlCache<i32> = TtlCache::new();
        assert_eq!(cache.stats().hit_rate, 0.0);
    }

    #[test]
    fn test_clear_resets_counters() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        cache.get("a");
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.cache_size, 0);
        assert_eq!(stats.sets, 0);
        assert_eq!(stats.total_requests, 0);
    }

    #[test]
    fn test_delete() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        cache.delete("a");
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_evict_expired_sweeps_only_expired() {
        let cache: TtlCache<i32> = TtlCache::new();
        cache.set("short", 1, Duration::from_millis(10));
        cache.set("long", 2, Duration::from_secs(60));

        sleep(Duration::from_millis(30));

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }
}
