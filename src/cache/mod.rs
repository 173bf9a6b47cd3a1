//! In-memory cache of decoded images
//!
//! - Byte-size-aware LRU eviction over decoded pixel sizes
//! - Composite keys of URL and target size
//! - Warm succession between cache instances

mod bitmap;
mod key;
mod lineage;

pub use bitmap::{BitmapCache, CacheStats, ImageCache, capacity_for_memory_class};
pub use key::CacheKey;
pub use lineage::CacheLineage;
