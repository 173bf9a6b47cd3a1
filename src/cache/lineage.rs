//! Warm succession of caches across screen lifetimes
//!
//! A [`CacheLineage`] owns the one "current" cache. Each screen that becomes
//! active asks it for a successor, which inherits the entries of the cache it
//! replaces. The owner threads the lineage through explicitly; there is no
//! process-wide static.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use super::bitmap::{BitmapCache, ImageCache};

/// Holder of the latest cache in a chain of successors
#[derive(Default)]
pub struct CacheLineage {
    current: Mutex<Option<Arc<BitmapCache>>>,
}

impl CacheLineage {
    /// Empty lineage; the first `succeed` starts cold
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<BitmapCache>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The latest successor, if any
    pub fn current(&self) -> Option<Arc<BitmapCache>> {
        self.slot().clone()
    }

    /// Create a cache of `capacity` bytes that adopts the current cache's
    /// entries, clear the old one, and make the new one current
    pub fn succeed(&self, capacity: usize) -> Arc<BitmapCache> {
        let mut current = self.slot();
        let cache = match current.take() {
            Some(previous) => {
                let cache = BitmapCache::succeeding(capacity, &previous);
                debug!("succeed(): new cache warmed with {} entries", cache.len());
                cache
            }
            None => BitmapCache::new(capacity),
        };

        let cache = Arc::new(cache);
        *current = Some(cache.clone());
        cache
    }

    /// Clear `cache`, and forget it if it is still the current one
    ///
    /// A screen tearing down after a newer screen already took over leaves
    /// the newer cache in place.
    pub fn teardown(&self, cache: &Arc<BitmapCache>) {
        cache.clear();

        let mut current = self.slot();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, cache)) {
            debug!("teardown(): clearing current cache");
            *current = None;
        } else {
            debug!("teardown(): letting current cache live another day");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, ImageCache};
    use crate::imaging::PixelBuffer;

    fn buffer() -> Arc<PixelBuffer> {
        Arc::new(PixelBuffer::solid(4, 4, [0, 0, 0, 255]))
    }

    #[test]
    fn test_first_successor_is_cold() {
        let lineage = CacheLineage::new();
        assert!(lineage.current().is_none());

        let cache = lineage.succeed(1024);
        assert!(cache.is_empty());
        assert!(Arc::ptr_eq(&lineage.current().unwrap(), &cache));
    }

    #[test]
    fn test_successor_inherits_entries() {
        let lineage = CacheLineage::new();
        let first = lineage.succeed(1024);
        let k1 = CacheKey::from("k1");
        let k2 = CacheKey::from("k2");
        let (v1, v2) = (buffer(), buffer());
        first.put(k1.clone(), v1.clone());
        first.put(k2.clone(), v2.clone());

        let second = lineage.succeed(1024);
        assert_eq!(second.get(&k1), Some(v1));
        assert_eq!(second.get(&k2), Some(v2));
        assert!(first.is_empty());
        assert!(Arc::ptr_eq(&lineage.current().unwrap(), &second));
    }

    #[test]
    fn test_teardown_of_current_empties_lineage() {
        let lineage = CacheLineage::new();
        let cache = lineage.succeed(1024);
        cache.put("k".into(), buffer());

        lineage.teardown(&cache);
        assert!(cache.is_empty());
        assert!(lineage.current().is_none());
    }

    #[test]
    fn test_teardown_of_stale_cache_keeps_successor() {
        let lineage = CacheLineage::new();
        let old = lineage.succeed(1024);
        let new = lineage.succeed(1024);
        new.put("k".into(), buffer());

        lineage.teardown(&old);
        assert!(Arc::ptr_eq(&lineage.current().unwrap(), &new));
        assert_eq!(new.len(), 1);
    }
}
