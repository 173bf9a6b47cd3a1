//! Loader configuration

use std::time::Duration;

use crate::imaging::{Dimension, Sampling};
use crate::utils::{Result, ScoutError};

/// Default fade-in duration when cross-fading from placeholder to image
pub const DEFAULT_FADE_DURATION: Duration = Duration::from_millis(200);

/// Default `max-stale` directive sent with every image request (one day)
pub const DEFAULT_MAX_STALE: Duration = Duration::from_secs(86_400);

/// Image loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Total time allowed for one fetch, connect through last body byte
    pub fetch_timeout: Duration,
    /// Staleness accepted from the transport response cache
    pub max_stale: Duration,
    /// User-Agent header for image requests
    pub user_agent: String,
    /// Worker threads for fetch and decode
    pub worker_threads: usize,
    /// Cross-fade from placeholder to result
    pub fade_in: bool,
    /// Cross-fade duration
    pub fade_duration: Duration,
    /// When false every request settles on its placeholder
    pub downloading_enabled: bool,
    /// Downsampling policy applied during decode
    pub sampling: Sampling,
    /// Target used for requests that carry none (usually the screen size)
    pub max_dimension: Option<Dimension>,
    /// Upper bound on a single decode allocation, in bytes
    pub decode_alloc_limit: u64,
    /// Byte budget of the transport response cache (0 disables it)
    pub response_cache_bytes: usize,
    /// Reject responses whose Content-Type is not `image/*`
    pub require_image_content_type: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(15),
            max_stale: DEFAULT_MAX_STALE,
            user_agent: format!("scout-images/{}", crate::VERSION),
            worker_threads: 4,
            fade_in: false,
            fade_duration: DEFAULT_FADE_DURATION,
            downloading_enabled: true,
            sampling: Sampling::AutoFit,
            max_dimension: None,
            decode_alloc_limit: 256 * 1024 * 1024,
            response_cache_bytes: 16 * 1024 * 1024,
            require_image_content_type: false,
        }
    }
}

impl LoaderConfig {
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_fade_in(mut self, enabled: bool) -> Self {
        self.fade_in = enabled;
        self
    }

    pub fn with_fade_duration(mut self, duration: Duration) -> Self {
        self.fade_duration = duration;
        self
    }

    pub fn with_downloading(mut self, enabled: bool) -> Self {
        self.downloading_enabled = enabled;
        self
    }

    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_max_dimension(mut self, dimension: Dimension) -> Self {
        self.max_dimension = Some(dimension);
        self
    }

    pub fn with_decode_alloc_limit(mut self, bytes: u64) -> Self {
        self.decode_alloc_limit = bytes;
        self
    }

    pub fn with_response_cache_bytes(mut self, bytes: usize) -> Self {
        self.response_cache_bytes = bytes;
        self
    }

    pub fn with_image_content_type_required(mut self, required: bool) -> Self {
        self.require_image_content_type = required;
        self
    }

    /// Check values that would make the loader unusable
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(ScoutError::Config("worker_threads must be > 0".into()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ScoutError::Config("fetch_timeout must be non-zero".into()));
        }
        if let Sampling::Fixed(0) = self.sampling {
            return Err(ScoutError::Config("fixed sample size must be >= 1".into()));
        }
        Ok(())
    }
}
