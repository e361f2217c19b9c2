//! In-memory TTL + LRU cache for upstream documents.
//!
//! Keyed by URI. Capacity-bounded with least-recently-used eviction; each
//! entry carries its own expiry deadline, checked on read. Payloads are
//! `Arc`-shared so a hit hands back exactly the bytes that were stored.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

/// Thread-safe TTL+LRU cache.
pub struct TtlCache<V> {
    inner: Mutex<LruCache<String, Entry<V>>>,
}

impl<V> TtlCache<V> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up `key`, evicting it if its TTL has lapsed.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let mut cache = self.inner.lock();
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(Arc::clone(&entry.value)),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    /// Insert `value` under `key` with the given TTL, returning the shared handle.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) -> Arc<V> {
        let value = Arc::new(value);
        let entry = Entry {
            value: Arc::clone(&value),
            expires_at: Instant::now() + ttl,
        };
        self.inner.lock().put(key.into(), entry);
        value
    }

    /// Number of live entries (expired entries still count until touched).
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_same_allocation() {
        let cache: TtlCache<String> = TtlCache::new(10);
        let stored = cache.insert("a", "payload".to_string(), Duration::from_secs(60));
        let hit = cache.get("a").unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache: TtlCache<u32> = TtlCache::new(10);
        cache.insert("k", 1, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn lru_evicts_oldest_when_full() {
        let cache: TtlCache<u32> = TtlCache::new(2);
        cache.insert("a", 1, Duration::from_secs(60));
        cache.insert("b", 2, Duration::from_secs(60));
        // Touch "a" so "b" becomes the eviction candidate
        cache.get("a");
        cache.insert("c", 3, Duration::from_secs(60));
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn capacity_zero_is_clamped() {
        let cache: TtlCache<u32> = TtlCache::new(0);
        cache.insert("a", 1, Duration::from_secs(60));
        assert!(cache.get("a").is_some());
    }
}
