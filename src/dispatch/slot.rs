//! Reusable display destinations
//!
//! A [`Slot`] stands in for one image element of a recycled row. It records
//! which request it is waiting on through a generation counter: every rebind,
//! cancellation or settle bumps the generation, so a completion carrying an
//! older generation can never reach the slot's visible content.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::trace;
use tokio::task::AbortHandle;

use crate::cache::CacheKey;
use crate::imaging::SharedBuffer;

/// Shared handle to a slot, held by the view layer and the dispatcher
pub type SlotHandle = Arc<Slot>;

/// Callback receiving every new presentation of a slot
pub type Observer = Arc<dyn Fn(&Presentation) + Send + Sync>;

/// Dispatch state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing bound yet
    Idle,
    /// A fetch and decode is in flight for the bound key
    Pending,
    /// A result, placeholder or fallback has been applied
    Settled,
}

/// Transition from a placeholder to a loaded image
#[derive(Debug, Clone)]
pub struct CrossFade {
    from: SharedBuffer,
    to: SharedBuffer,
    started: Instant,
    duration: Duration,
}

impl CrossFade {
    pub fn new(from: SharedBuffer, to: SharedBuffer, started: Instant, duration: Duration) -> Self {
        Self {
            from,
            to,
            started,
            duration,
        }
    }

    /// Buffer faded out
    pub fn source(&self) -> &SharedBuffer {
        &self.from
    }

    /// Buffer faded in
    pub fn target(&self) -> &SharedBuffer {
        &self.to
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Fraction of the transition completed at `now`, in `0.0..=1.0`
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

/// What a slot currently shows
#[derive(Debug, Clone, Default)]
pub enum Presentation {
    /// Nothing
    #[default]
    Cleared,
    /// A single buffer
    Still(SharedBuffer),
    /// Fading from a placeholder into the result
    CrossFade(CrossFade),
}

impl Presentation {
    /// Still image of `buffer`, or cleared
    pub fn from_buffer(buffer: Option<SharedBuffer>) -> Self {
        buffer.map_or(Self::Cleared, Self::Still)
    }

    /// The buffer this presentation ends on
    pub fn buffer(&self) -> Option<&SharedBuffer> {
        match self {
            Self::Cleared => None,
            Self::Still(buffer) => Some(buffer),
            Self::CrossFade(fade) => Some(fade.target()),
        }
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self, Self::Cleared)
    }
}

struct Binding {
    key: CacheKey,
    placeholder: Option<SharedBuffer>,
    abort: Option<AbortHandle>,
}

impl Binding {
    fn cancel(self) {
        if let Some(abort) = self.abort {
            trace!("cancelling in-flight load of {}", self.key);
            abort.abort();
        }
    }
}

struct SlotInner {
    state: SlotState,
    generation: u64,
    binding: Option<Binding>,
    presentation: Presentation,
}

/// A reusable image destination
pub struct Slot {
    inner: Mutex<SlotInner>,
    observer: Mutex<Option<Observer>>,
}

impl Slot {
    /// Create an idle, cleared slot
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                state: SlotState::Idle,
                generation: 0,
                binding: None,
                presentation: Presentation::Cleared,
            }),
            observer: Mutex::new(None),
        }
    }

    /// Create a slot behind a shared handle
    pub fn handle() -> SlotHandle {
        Arc::new(Self::new())
    }

    fn inner(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the callback that renders this slot's content
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(&Presentation) + Send + Sync + 'static,
    {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(observer));
    }

    pub fn state(&self) -> SlotState {
        self.inner().state
    }

    pub fn presentation(&self) -> Presentation {
        self.inner().presentation.clone()
    }

    /// The buffer currently shown, or faded towards
    pub fn current_buffer(&self) -> Option<SharedBuffer> {
        self.inner().presentation.buffer().cloned()
    }

    /// Identity of the request the slot is bound to
    pub fn generation(&self) -> u64 {
        self.inner().generation
    }

    /// Key of the in-flight request, if any
    pub fn pending_key(&self) -> Option<CacheKey> {
        self.inner().binding.as_ref().map(|b| b.key.clone())
    }

    /// Replace a finished cross-fade with its target; returns whether the
    /// presentation changed
    pub fn finish_fade(&self, now: Instant) -> bool {
        let presentation = {
            let mut inner = self.inner();
            let target = match &inner.presentation {
                Presentation::CrossFade(fade) if fade.is_finished(now) => fade.target().clone(),
                _ => return false,
            };
            inner.presentation = Presentation::Still(target);
            inner.presentation.clone()
        };
        self.notify(&presentation);
        true
    }

    pub(crate) fn is_pending_on(&self, key: &CacheKey) -> bool {
        let inner = self.inner();
        inner.state == SlotState::Pending
            && inner.binding.as_ref().is_some_and(|b| &b.key == key)
    }

    /// Placeholder shown by the in-flight request
    pub(crate) fn bound_placeholder(&self) -> Option<SharedBuffer> {
        self.inner()
            .binding
            .as_ref()
            .and_then(|b| b.placeholder.clone())
    }

    /// Cancel any in-flight work, show `placeholder`, and wait on `key`
    ///
    /// Returns the generation a completion must carry to be applied.
    pub(crate) fn bind(&self, key: CacheKey, placeholder: Option<SharedBuffer>) -> u64 {
        let (generation, presentation) = {
            let mut inner = self.inner();
            if let Some(previous) = inner.binding.take() {
                previous.cancel();
            }
            inner.generation += 1;
            inner.state = SlotState::Pending;
            inner.presentation = Presentation::from_buffer(placeholder.clone());
            inner.binding = Some(Binding {
                key,
                placeholder,
                abort: None,
            });
            (inner.generation, inner.presentation.clone())
        };
        self.notify(&presentation);
        generation
    }

    /// Attach the worker task of `generation` so a later rebind can stop it
    pub(crate) fn attach(&self, generation: u64, abort: AbortHandle) {
        let mut inner = self.inner();
        if inner.generation != generation {
            abort.abort();
            return;
        }
        match inner.binding.as_mut() {
            Some(binding) => binding.abort = Some(abort),
            None => abort.abort(),
        }
    }

    /// Cancel any in-flight work and show `presentation`
    pub(crate) fn settle(&self, presentation: Presentation) {
        {
            let mut inner = self.inner();
            if let Some(previous) = inner.binding.take() {
                previous.cancel();
            }
            inner.generation += 1;
            inner.state = SlotState::Settled;
            inner.presentation = presentation.clone();
        }
        self.notify(&presentation);
    }

    /// Apply the result of `generation` if the slot still waits on it
    pub(crate) fn complete(&self, generation: u64, presentation: Presentation) -> bool {
        {
            let mut inner = self.inner();
            if inner.state != SlotState::Pending || inner.generation != generation {
                return false;
            }
            inner.binding = None;
            inner.state = SlotState::Settled;
            inner.presentation = presentation.clone();
        }
        self.notify(&presentation);
        true
    }

    /// The observer runs unlocked so it may re-enter the slot
    fn notify(&self, presentation: &Presentation) {
        let observer = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer(presentation);
        }
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner();
        f.debug_struct("Slot")
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .field("pending", &inner.binding.as_ref().map(|b| &b.key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::PixelBuffer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn buffer(value: u8) -> SharedBuffer {
        Arc::new(PixelBuffer::solid(2, 2, [value, value, value, 255]))
    }

    #[test]
    fn test_new_slot_is_idle() {
        let slot = Slot::new();
        assert_eq!(slot.state(), SlotState::Idle);
        assert!(slot.presentation().is_cleared());
        assert_eq!(slot.generation(), 0);
    }

    #[test]
    fn test_bind_shows_placeholder() {
        let slot = Slot::new();
        let placeholder = buffer(1);
        let generation = slot.bind("a".into(), Some(placeholder.clone()));

        assert_eq!(generation, 1);
        assert_eq!(slot.state(), SlotState::Pending);
        assert_eq!(slot.current_buffer(), Some(placeholder.clone()));
        assert!(slot.is_pending_on(&"a".into()));
        assert_eq!(slot.bound_placeholder(), Some(placeholder));
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let slot = Slot::new();
        let first = slot.bind("a".into(), None);
        let second = slot.bind("b".into(), None);

        assert!(!slot.complete(first, Presentation::Still(buffer(1))));
        assert!(slot.presentation().is_cleared());

        let result = buffer(2);
        assert!(slot.complete(second, Presentation::Still(result.clone())));
        assert_eq!(slot.current_buffer(), Some(result));
        assert_eq!(slot.state(), SlotState::Settled);
    }

    #[test]
    fn test_settle_invalidates_pending_generation() {
        let slot = Slot::new();
        let generation = slot.bind("a".into(), None);
        slot.settle(Presentation::Cleared);

        assert!(!slot.complete(generation, Presentation::Still(buffer(1))));
        assert_eq!(slot.pending_key(), None);
    }

    #[test]
    fn test_observer_sees_each_presentation() {
        let slot = Slot::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        slot.set_observer(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let generation = slot.bind("a".into(), Some(buffer(1)));
        slot.complete(generation, Presentation::Still(buffer(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_observer_may_reenter_slot() {
        let slot = Slot::handle();
        let inner = slot.clone();
        let states = Arc::new(Mutex::new(Vec::new()));
        let seen = states.clone();
        slot.set_observer(move |_| {
            seen.lock().unwrap().push(inner.state());
            inner.set_observer(|_| {});
        });

        slot.settle(Presentation::Still(buffer(1)));
        slot.settle(Presentation::Cleared);
        assert_eq!(*states.lock().unwrap(), vec![SlotState::Settled]);
    }

    #[test]
    fn test_cross_fade_progress() {
        let start = Instant::now();
        let fade = CrossFade::new(buffer(1), buffer(2), start, Duration::from_millis(200));

        assert_eq!(fade.progress(start), 0.0);
        assert!((fade.progress(start + Duration::from_millis(100)) - 0.5).abs() < 1e-6);
        assert!(fade.is_finished(start + Duration::from_millis(250)));

        let instant = CrossFade::new(buffer(1), buffer(2), start, Duration::ZERO);
        assert!(instant.is_finished(start));
    }

    #[test]
    fn test_finish_fade_leaves_target() {
        let slot = Slot::new();
        let start = Instant::now();
        let target = buffer(2);
        let generation = slot.bind("a".into(), Some(buffer(1)));
        slot.complete(
            generation,
            Presentation::CrossFade(CrossFade::new(
                buffer(1),
                target.clone(),
                start,
                Duration::from_millis(10),
            )),
        );

        assert!(!slot.finish_fade(start));
        assert!(slot.finish_fade(start + Duration::from_millis(10)));
        assert!(matches!(slot.presentation(), Presentation::Still(b) if Arc::ptr_eq(&b, &target)));
    }
}
