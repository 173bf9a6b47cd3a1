//! # Scout Images - Remote Image Loading for Recycled Views
//!
//! Fetches remote images, decodes them under a memory budget, caches the
//! decoded pixels, and binds results to reusable display slots without ever
//! showing a stale image in a recycled row.
//!
//! ## Architecture
//!
//! The loader is organized into the following core modules:
//!
//! - **dispatch**: Slot binding, deduplication, cancellation and apply
//! - **network**: HTTP(S) fetching with a `max-stale` aware response cache
//! - **imaging**: Pixel buffers, downsampled decoding and resizing
//! - **cache**: Byte-bounded LRU of decoded images with warm succession
//! - **config**: Loader settings
//! - **utils**: Shared utilities and error types

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod imaging;
pub mod network;
pub mod utils;

// Re-export main types for convenience
pub use cache::{BitmapCache, CacheKey, CacheLineage, ImageCache};
pub use config::LoaderConfig;
pub use dispatch::{Dispatcher, ImageRequest, Presentation, Slot, SlotHandle, SlotState};
pub use imaging::{Dimension, PixelBuffer, Sampling, SharedBuffer};
pub use utils::error::{ScoutError, Result};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Scout Images";
