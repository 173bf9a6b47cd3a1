//! Byte-bounded LRU cache of decoded buffers
//!
//! Entries are weighed by their decoded size (`row_bytes * height`), not by
//! the size of the compressed download. After every `put` the running total
//! is back within capacity.

use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, trace};
use lru::LruCache;

use super::key::CacheKey;
use crate::imaging::SharedBuffer;

/// Store consulted and filled by the dispatcher
pub trait ImageCache: Send + Sync {
    /// Look up `key`, marking it most recently used
    fn get(&self, key: &CacheKey) -> Option<SharedBuffer>;

    /// Insert or replace `key`, evicting least recently used entries as needed
    fn put(&self, key: CacheKey, buffer: SharedBuffer);

    /// Drop every entry
    fn clear(&self);
}

/// Default capacity for a process with `memory_class_mb` of heap: one eighth
pub fn capacity_for_memory_class(memory_class_mb: usize) -> usize {
    memory_class_mb * 1024 * 1024 / 8
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Total decoded size in bytes
    pub size_bytes: usize,
    /// Maximum cache size
    pub max_size_bytes: usize,
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries dropped to stay within capacity
    pub evictions: u64,
}

struct CacheState {
    entries: LruCache<CacheKey, SharedBuffer>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// LRU cache of decoded buffers with a byte budget
pub struct BitmapCache {
    state: Mutex<CacheState>,
    capacity: usize,
}

impl BitmapCache {
    /// Create an empty cache holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity,
        }
    }

    /// Create a cache sized for a process heap of `memory_class_mb`
    pub fn for_memory_class(memory_class_mb: usize) -> Self {
        Self::new(capacity_for_memory_class(memory_class_mb))
    }

    /// Create a cache that starts with the entries of `previous`, which is
    /// cleared afterwards
    pub fn succeeding(capacity: usize, previous: &BitmapCache) -> Self {
        let cache = Self::new(capacity);
        cache.adopt_from(previous);
        cache
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current decoded size of all entries
    pub fn size_bytes(&self) -> usize {
        self.state().total_bytes
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Presence check without touching recency
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state().entries.contains(key)
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<CacheKey> {
        self.state().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Remove one entry
    pub fn remove(&self, key: &CacheKey) -> Option<SharedBuffer> {
        let mut state = self.state();
        let removed = state.entries.pop(key)?;
        state.total_bytes -= removed.byte_size();
        Some(removed)
    }

    /// Copy every entry of `previous` into this cache, oldest first so
    /// recency order carries over, then clear `previous`
    ///
    /// Entries go through the normal `put` path, so anything that would be
    /// evicted straight away is not kept. Returns the number of entries
    /// retained.
    pub fn adopt_from(&self, previous: &BitmapCache) -> usize {
        if ptr::eq(self, previous) {
            return self.len();
        }

        let snapshot: Vec<(CacheKey, SharedBuffer)> = previous
            .state()
            .entries
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        debug!(
            "adopt_from(): copying ({}) entries into the current cache",
            snapshot.len()
        );

        for (key, buffer) in snapshot {
            trace!("adopt_from(): copying {key} from old cache");
            self.put(key, buffer);
        }
        previous.clear();
        self.len()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            entries: state.entries.len(),
            size_bytes: state.total_bytes,
            max_size_bytes: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

impl ImageCache for BitmapCache {
    fn get(&self, key: &CacheKey) -> Option<SharedBuffer> {
        let mut state = self.state();
        match state.entries.get(key).cloned() {
            Some(buffer) => {
                state.hits += 1;
                Some(buffer)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    fn put(&self, key: CacheKey, buffer: SharedBuffer) {
        let size = buffer.byte_size();
        let mut state = self.state();

        if let Some(old) = state.entries.pop(&key) {
            state.total_bytes -= old.byte_size();
        }

        // Would be evicted immediately; keep the rest of the cache intact.
        if size > self.capacity {
            debug!(
                "put(): {key} is {size} bytes, over the {} byte capacity",
                self.capacity
            );
            return;
        }

        state.entries.put(key, buffer);
        state.total_bytes += size;

        while state.total_bytes > self.capacity {
            let Some((evicted, old)) = state.entries.pop_lru() else {
                break;
            };
            state.total_bytes -= old.byte_size();
            state.evictions += 1;
            trace!("put(): evicted {evicted} ({} bytes)", old.byte_size());
        }
    }

    fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.total_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::PixelBuffer;
    use std::sync::Arc;

    /// Buffer of exactly `width * 4 * height` bytes
    fn buffer(width: u32, height: u32) -> SharedBuffer {
        Arc::new(PixelBuffer::solid(width, height, [1, 2, 3, 255]))
    }

    #[test]
    fn test_put_get() {
        let cache = BitmapCache::new(1024);
        let value = buffer(4, 4);
        cache.put("a".into(), value.clone());

        assert_eq!(cache.get(&"a".into()), Some(value));
        assert_eq!(cache.get(&"missing".into()), None);
        assert_eq!(cache.size_bytes(), 64);
    }

    #[test]
    fn test_replace_updates_total() {
        let cache = BitmapCache::new(1024);
        cache.put("a".into(), buffer(4, 4));
        cache.put("a".into(), buffer(2, 2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), 16);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        // Each entry is 64 bytes, room for three.
        let cache = BitmapCache::new(192);
        cache.put("a".into(), buffer(4, 4));
        cache.put("b".into(), buffer(4, 4));
        cache.put("c".into(), buffer(4, 4));

        // Touch "a" so "b" becomes the oldest.
        assert!(cache.get(&"a".into()).is_some());
        cache.put("d".into(), buffer(4, 4));

        assert!(!cache.contains(&"b".into()));
        assert!(cache.contains(&"a".into()));
        assert_eq!(cache.size_bytes(), 192);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_oversized_entry_is_not_kept() {
        let cache = BitmapCache::new(100);
        cache.put("small".into(), buffer(2, 2));
        cache.put("huge".into(), buffer(10, 10));

        assert!(!cache.contains(&"huge".into()));
        assert!(cache.contains(&"small".into()));
        assert_eq!(cache.size_bytes(), 16);
    }

    #[test]
    fn test_clear() {
        let cache = BitmapCache::new(1024);
        cache.put("a".into(), buffer(4, 4));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_adopt_from_keeps_recency() {
        let old = BitmapCache::new(1024);
        let a = buffer(4, 4);
        old.put("a".into(), a.clone());
        old.put("b".into(), buffer(4, 4));
        old.get(&"a".into());

        let new = BitmapCache::succeeding(1024, &old);
        assert_eq!(new.get(&"a".into()), Some(a));
        assert_eq!(new.keys()[1], CacheKey::from("b"));
        assert!(old.is_empty());
    }

    #[test]
    fn test_adopt_into_smaller_cache_keeps_newest() {
        let old = BitmapCache::new(1024);
        old.put("a".into(), buffer(4, 4));
        old.put("b".into(), buffer(4, 4));
        old.put("c".into(), buffer(4, 4));

        let new = BitmapCache::new(128);
        assert_eq!(new.adopt_from(&old), 2);
        assert!(!new.contains(&"a".into()));
        assert!(new.contains(&"c".into()));
    }

    #[test]
    fn test_stats() {
        let cache = BitmapCache::for_memory_class(8);
        assert_eq!(cache.capacity(), 1024 * 1024);

        cache.put("a".into(), buffer(10, 10));
        cache.get(&"a".into());
        cache.get(&"b".into());

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.size_bytes, 400);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
