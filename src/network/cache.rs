//! HTTP response cache
//!
//! In-memory transport cache answering image requests that carry a
//! `max-stale` directive:
//! - Cache-Control parsing for storage and freshness
//! - Stale entries served within the request's accepted staleness
//! - Byte-bounded, oldest entries dropped first

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::trace;

use super::response::Response;

/// Cache entry representing a cached response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached response body
    pub body: Bytes,
    /// Content type
    pub content_type: Option<String>,
    /// When this entry was created
    pub created_at: Instant,
    /// Freshness lifetime
    pub ttl: Duration,
    /// Must be revalidated before every use
    pub no_cache: bool,
    /// Staleness is never acceptable
    pub must_revalidate: bool,
}

impl CacheEntry {
    /// Usable by a request that tolerates `max_stale` past freshness
    pub fn is_usable(&self, max_stale: Duration) -> bool {
        if self.no_cache {
            return false;
        }
        let tolerance = if self.must_revalidate {
            Duration::ZERO
        } else {
            max_stale
        };
        self.created_at.elapsed() < self.ttl.saturating_add(tolerance)
    }

    /// Get age of this entry in seconds
    pub fn age(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }
}

/// Cache-Control directive parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// max-age in seconds
    pub max_age: Option<u64>,
    /// s-maxage for shared caches
    pub s_maxage: Option<u64>,
    /// no-cache (must revalidate)
    pub no_cache: bool,
    /// no-store (don't cache)
    pub no_store: bool,
    /// must-revalidate
    pub must_revalidate: bool,
    /// immutable (never changes)
    pub immutable: bool,
}

impl CacheControl {
    /// Parse Cache-Control header value
    pub fn parse(header: &str) -> Self {
        let mut cc = Self::default();

        for directive in header.split(',') {
            let directive = directive.trim().to_lowercase();

            if directive == "no-cache" {
                cc.no_cache = true;
            } else if directive == "no-store" {
                cc.no_store = true;
            } else if directive == "must-revalidate" {
                cc.must_revalidate = true;
            } else if directive == "immutable" {
                cc.immutable = true;
            } else if let Some(value) = directive.strip_prefix("max-age=") {
                cc.max_age = value.parse().ok();
            } else if let Some(value) = directive.strip_prefix("s-maxage=") {
                cc.s_maxage = value.parse().ok();
            }
        }

        cc
    }

    /// Check if response is cacheable
    pub fn is_cacheable(&self) -> bool {
        !self.no_store
    }

    /// Freshness lifetime; zero when the response carries none
    pub fn ttl(&self) -> Duration {
        if self.no_cache {
            return Duration::ZERO;
        }

        // s-maxage takes precedence for shared caches
        if let Some(secs) = self.s_maxage.or(self.max_age) {
            return Duration::from_secs(secs);
        }

        // If immutable, use a very long TTL
        if self.immutable {
            return Duration::from_secs(31_536_000); // 1 year
        }

        Duration::ZERO
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Total size in bytes
    pub size_bytes: usize,
    /// Maximum cache size
    pub max_size_bytes: usize,
    /// Requests answered from the cache
    pub hit_count: u64,
    /// Requests that went to the network
    pub network_count: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    current_size: usize,
    hit_count: u64,
    network_count: u64,
}

/// HTTP response cache keyed by URL
pub struct ResponseCache {
    state: Mutex<CacheState>,
    /// Maximum cache size in bytes
    max_size: usize,
}

impl ResponseCache {
    /// Create a cache holding at most `max_size` body bytes
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_size,
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached body for `url` if usable with `max_stale`; counts a hit or a
    /// network request
    pub fn lookup(&self, url: &str, max_stale: Duration) -> Option<CacheEntry> {
        let mut state = self.state();
        let entry = state
            .entries
            .get(url)
            .filter(|e| e.is_usable(max_stale))
            .cloned();

        match entry {
            Some(entry) => {
                state.hit_count += 1;
                trace!("response cache hit for {url} (age {}s)", entry.age());
                Some(entry)
            }
            None => {
                state.network_count += 1;
                None
            }
        }
    }

    /// Store a successful response if its headers allow it
    pub fn store(&self, url: &str, response: &Response) {
        let cc = response.cache_control();
        if !response.is_success() || !cc.is_cacheable() {
            return;
        }

        let entry = CacheEntry {
            body: response.body().clone(),
            content_type: response.content_type().map(str::to_string),
            created_at: Instant::now(),
            ttl: cc.ttl(),
            no_cache: cc.no_cache,
            must_revalidate: cc.must_revalidate,
        };
        self.put(url, entry);
    }

    /// Store an entry in the cache
    pub fn put(&self, url: &str, entry: CacheEntry) {
        let entry_size = entry.body.len();

        // Don't cache if single entry exceeds max size
        if entry_size > self.max_size {
            return;
        }

        let mut state = self.state();
        if let Some(old) = state.entries.remove(url) {
            state.current_size -= old.body.len();
        }

        Self::evict_until_fits(&mut state, self.max_size - entry_size);

        state.entries.insert(url.to_string(), entry);
        state.current_size += entry_size;
    }

    /// Drop entries, oldest first, until `budget` bytes are free of use
    fn evict_until_fits(state: &mut CacheState, budget: usize) {
        while state.current_size > budget {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(url, _)| url.clone());
            let Some(url) = oldest else { break };
            if let Some(entry) = state.entries.remove(&url) {
                state.current_size -= entry.body.len();
                trace!("response cache evicted {url}");
            }
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> ResponseCacheStats {
        let state = self.state();
        ResponseCacheStats {
            entries: state.entries.len(),
            size_bytes: state.current_size,
            max_size_bytes: self.max_size,
            hit_count: state.hit_count,
            network_count: state.network_count,
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(16 * 1024 * 1024)
    }
}
