//! Request dispatch for image slots
//!
//! The [`Dispatcher`] is the entry point used by view-binding code:
//! - Cache lookup before any network work
//! - At most one in-flight load per slot and key
//! - Cancellation of superseded work when a slot is rebound
//! - Results applied on the caller's thread, only to the request that is
//!   still bound
//!
//! Fetch and decode run on a private tokio runtime. Finished loads are queued
//! and applied when the owning thread calls [`Dispatcher::pump`] or
//! [`Dispatcher::pump_until`], so slots are only ever mutated from there.

mod request;
mod slot;

pub use request::ImageRequest;
pub use slot::{CrossFade, Observer, Presentation, Slot, SlotHandle, SlotState};

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::BoxFuture;
use log::{debug, trace, warn};
use tokio::runtime::{Builder, Handle, Runtime};

use crate::cache::{CacheKey, ImageCache};
use crate::config::LoaderConfig;
use crate::imaging::{Dimension, ImageDecoder, RasterDecoder, Sampling, SharedBuffer, decode_to_target};
use crate::network::{HttpFetcher, ImageFetcher, parse_image_url};
use crate::utils::{DecodeError, FetchError, LoadError, Result};

type SharedCache = Arc<RwLock<Option<Arc<dyn ImageCache>>>>;

/// Toggles set by the owning screen
#[derive(Clone)]
struct Settings {
    downloading_enabled: bool,
    fade_in: bool,
    fade_duration: Duration,
    default_placeholder: Option<SharedBuffer>,
}

/// Where a finished load is headed
struct Destination {
    slot: SlotHandle,
    generation: u64,
    key: CacheKey,
    placeholder: Option<SharedBuffer>,
    oom_fallback: Option<SharedBuffer>,
    error_fallback: Option<SharedBuffer>,
}

struct Completion {
    destination: Destination,
    outcome: std::result::Result<SharedBuffer, LoadError>,
}

/// Binds image requests to slots and drives their loads
pub struct Dispatcher {
    runtime: Option<Runtime>,
    handle: Handle,
    fetcher: Arc<dyn ImageFetcher>,
    decoder: Arc<dyn ImageDecoder>,
    cache: SharedCache,
    settings: RwLock<Settings>,
    sampling: Sampling,
    max_dimension: Option<Dimension>,
    sender: Sender<Completion>,
    receiver: Mutex<Receiver<Completion>>,
}

impl Dispatcher {
    /// Create a dispatcher with its own worker runtime
    pub fn new(
        config: &LoaderConfig,
        fetcher: Arc<dyn ImageFetcher>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Result<Self> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.worker_threads)
            .thread_name("scout-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        let (sender, receiver) = mpsc::channel();

        debug!(
            "Dispatcher started with {} workers, sampling {:?}",
            config.worker_threads, config.sampling
        );

        Ok(Self {
            runtime: Some(runtime),
            handle,
            fetcher,
            decoder,
            cache: Arc::new(RwLock::new(None)),
            settings: RwLock::new(Settings {
                downloading_enabled: config.downloading_enabled,
                fade_in: config.fade_in,
                fade_duration: config.fade_duration,
                default_placeholder: None,
            }),
            sampling: config.sampling,
            max_dimension: config.max_dimension.filter(Dimension::is_specified),
            sender,
            receiver: Mutex::new(receiver),
        })
    }

    /// Create a dispatcher backed by [`HttpFetcher`] and [`RasterDecoder`]
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config)?);
        let decoder = Arc::new(RasterDecoder::with_alloc_limit(config.decode_alloc_limit));
        Self::new(config, fetcher, decoder)
    }

    fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_settings(&self, update: impl FnOnce(&mut Settings)) {
        update(&mut self.settings.write().unwrap_or_else(PoisonError::into_inner));
    }

    fn receiver(&self) -> MutexGuard<'_, Receiver<Completion>> {
        self.receiver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache consulted and filled by subsequent requests
    pub fn set_cache(&self, cache: Option<Arc<dyn ImageCache>>) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = cache;
    }

    pub fn cache(&self) -> Option<Arc<dyn ImageCache>> {
        current_cache(&self.cache)
    }

    /// When disabled, requests that miss the cache settle on their placeholder
    pub fn set_downloading_enabled(&self, enabled: bool) {
        self.update_settings(|s| s.downloading_enabled = enabled);
    }

    pub fn is_downloading_enabled(&self) -> bool {
        self.settings().downloading_enabled
    }

    /// Cross-fade from the placeholder when a result arrives
    pub fn set_fade_in_enabled(&self, enabled: bool) {
        self.update_settings(|s| s.fade_in = enabled);
    }

    pub fn is_fade_in_enabled(&self) -> bool {
        self.settings().fade_in
    }

    pub fn set_fade_duration(&self, duration: Duration) {
        self.update_settings(|s| s.fade_duration = duration);
    }

    /// Placeholder for requests without one, and for [`cancel_to_default`]
    ///
    /// [`cancel_to_default`]: Dispatcher::cancel_to_default
    pub fn set_default_placeholder(&self, placeholder: Option<SharedBuffer>) {
        self.update_settings(|s| s.default_placeholder = placeholder);
    }

    /// Show `request` in `slot`
    ///
    /// Resolves immediately from the cache when possible. Otherwise the slot
    /// shows the placeholder while a worker loads the image, unless the slot
    /// is already loading the same key, in which case nothing changes.
    pub fn request_image(&self, request: ImageRequest, slot: &SlotHandle) {
        let settings = self.settings();
        let target = request.target().or(self.max_dimension);
        let key = CacheKey::new(request.url(), target);
        let placeholder = request
            .placeholder()
            .cloned()
            .or(settings.default_placeholder);

        if let Some(buffer) = current_cache(&self.cache).and_then(|cache| cache.get(&key)) {
            trace!("request_image(): cache hit for {key}");
            slot.settle(Presentation::Still(buffer));
            return;
        }

        if !settings.downloading_enabled {
            trace!("request_image(): downloading disabled, showing placeholder for {key}");
            slot.settle(Presentation::from_buffer(placeholder));
            return;
        }

        if slot.is_pending_on(&key) {
            trace!("request_image(): {key} already loading");
            return;
        }

        let url = match parse_image_url(request.url()) {
            Ok(url) => url,
            Err(err) => {
                warn!("Unable to load image url {}: {}", request.url(), err);
                let fallback = request.error_fallback().cloned().or(placeholder);
                slot.settle(Presentation::from_buffer(fallback));
                return;
            }
        };

        let generation = slot.bind(key.clone(), placeholder.clone());
        let destination = Destination {
            slot: slot.clone(),
            generation,
            key,
            oom_fallback: request.oom_fallback().cloned().or_else(|| placeholder.clone()),
            error_fallback: request.error_fallback().cloned().or_else(|| placeholder.clone()),
            placeholder,
        };

        debug!("request_image(): loading {}", destination.key);
        let fetch = self.fetcher.fetch(url);
        let decoder = self.decoder.clone();
        let cache = self.cache.clone();
        let sender = self.sender.clone();
        let sampling = self.sampling;

        let task = self.handle.spawn(async move {
            let outcome = load(fetch, decoder, sampling, target).await;
            if let Ok(buffer) = &outcome {
                if let Some(cache) = current_cache(&cache) {
                    cache.put(destination.key.clone(), buffer.clone());
                }
            }
            // The receiver only goes away with the dispatcher.
            let _ = sender.send(Completion {
                destination,
                outcome,
            });
        });
        slot.attach(generation, task.abort_handle());
    }

    /// Stop any load bound to `slot` and show `fallback`, or clear it
    pub fn cancel(&self, slot: &SlotHandle, fallback: Option<SharedBuffer>) {
        trace!("cancel(): {slot:?}");
        slot.settle(Presentation::from_buffer(fallback));
    }

    /// Stop any load bound to `slot` and show the default placeholder, or the
    /// placeholder of the cancelled request
    pub fn cancel_to_default(&self, slot: &SlotHandle) {
        let fallback = self
            .settings()
            .default_placeholder
            .or_else(|| slot.bound_placeholder());
        self.cancel(slot, fallback);
    }

    /// Apply every finished load without blocking; returns how many reached
    /// their slot
    pub fn pump(&self) -> usize {
        let completions: Vec<Completion> = self.receiver().try_iter().collect();
        completions
            .into_iter()
            .filter(|completion| self.apply(completion))
            .count()
    }

    /// Apply finished loads until none of `slots` is pending or `deadline`
    /// passes; returns whether all of them settled
    pub fn pump_until(&self, slots: &[SlotHandle], deadline: Instant) -> bool {
        loop {
            self.pump();
            if slots.iter().all(|slot| slot.state() != SlotState::Pending) {
                return true;
            }

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let received = self.receiver().recv_timeout(remaining);
            match received {
                Ok(completion) => {
                    self.apply(&completion);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return false;
                }
            }
        }
    }

    fn apply(&self, completion: &Completion) -> bool {
        let Completion {
            destination,
            outcome,
        } = completion;

        let buffer = match outcome {
            Ok(buffer) => Some(buffer.clone()),
            Err(err) if err.is_memory_exhausted() => {
                warn!("Could not load {} due to memory exhaustion: {}", destination.key, err);
                destination.oom_fallback.clone()
            }
            Err(err) => {
                warn!("Could not load {}: {}", destination.key, err);
                destination.error_fallback.clone()
            }
        };

        let settings = self.settings();
        let presentation = match (buffer, &destination.placeholder) {
            (Some(to), Some(from)) if settings.fade_in && !Arc::ptr_eq(&to, from) => {
                Presentation::CrossFade(CrossFade::new(
                    from.clone(),
                    to,
                    Instant::now(),
                    settings.fade_duration,
                ))
            }
            (buffer, _) => Presentation::from_buffer(buffer),
        };

        let applied = destination.slot.complete(destination.generation, presentation);
        if !applied {
            trace!("apply(): {} no longer bound, discarding", destination.key);
        }
        applied
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn current_cache(cache: &SharedCache) -> Option<Arc<dyn ImageCache>> {
    cache.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Fetch, then decode off the async workers
async fn load(
    fetch: BoxFuture<'static, std::result::Result<Bytes, FetchError>>,
    decoder: Arc<dyn ImageDecoder>,
    sampling: Sampling,
    target: Option<Dimension>,
) -> std::result::Result<SharedBuffer, LoadError> {
    let bytes = fetch.await?;
    let decoded = tokio::task::spawn_blocking(move || {
        decode_to_target(decoder.as_ref(), &bytes, sampling, target)
    })
    .await
    .map_err(|e| DecodeError::Malformed(format!("decode task failed: {e}")))?;
    Ok(Arc::new(decoded?))
}
