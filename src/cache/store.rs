//! Locked, lazily built LRU of [`ByteView`]s owned by one group.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::byteview::ByteView;
use super::lru::LruCache;
use super::stats::CacheStats;

/// Concurrency-safe local cache.
///
/// Reads promote entries, so `get` takes the same exclusive lock as `add`.
/// The underlying LRU is only allocated on the first write.
pub struct LocalCache {
    cache_bytes: usize,
    lru: Mutex<Option<LruCache<ByteView>>>,
    gets: AtomicU64,
    hits: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl LocalCache {
    /// Create a cache bounded to `cache_bytes` (0 = unbounded)
    pub fn new(cache_bytes: usize) -> Self {
        Self {
            cache_bytes,
            lru: Mutex::new(None),
            gets: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn add(&self, key: &str, value: ByteView) {
        let mut guard = self.lru.lock();
        let lru = guard.get_or_insert_with(|| {
            let evictions = Arc::clone(&self.evictions);
            LruCache::with_eviction_callback(
                self.cache_bytes,
                Box::new(move |_key, _value| {
                    evictions.fetch_add(1, Ordering::Relaxed);
                }),
            )
        });
        lru.add(key, value);
    }

    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.lru.lock();
        let value = guard.as_mut()?.get(key).cloned();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Configured bound
    pub fn cache_bytes(&self) -> usize {
        self.cache_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let (bytes, items) = match self.lru.lock().as_ref() {
            Some(lru) => (lru.used_bytes() as u64, lru.len() as u64),
            None => (0, 0),
        };
        CacheStats {
            bytes,
            items,
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("cache_bytes", &self.cache_bytes)
            .field("stats", &self.stats())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
