//! Sound-data provider contract.
//!
//! Providers deliver interleaved `f32` samples. Positions and lengths are
//! counted in samples (frames * channels), matching what `read` fills.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Storage format of the underlying source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SampleFormat {
    I16,
    I24,
    I32,
    #[default]
    F32,
}

/// Notifications a provider raises while being read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    /// New position in samples
    PositionChanged(u64),
    /// No further samples will be produced
    EndOfStream,
}

/// Errors from seeking or reading a provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderError {
    NotSeekable,
    OutOfRange { offset: u64, length: u64 },
    Disposed,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NotSeekable => write!(f, "provider does not support seeking"),
            ProviderError::OutOfRange { offset, length } => {
                write!(f, "seek offset {} beyond length {}", offset, length)
            }
            ProviderError::Disposed => write!(f, "provider has been disposed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProviderError {}

/// Callback invoked with provider notifications.
pub type ProviderObserver = Box<dyn FnMut(ProviderEvent) + Send>;

/// Handle returned from `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(pub u32);

/// Observer list that providers embed to implement subscription.
#[derive(Default)]
pub struct ProviderObservers {
    next_id: u32,
    observers: Vec<(ObserverId, ProviderObserver)>,
}

impl fmt::Debug for ProviderObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderObservers").field("count", &self.observers.len()).finish()
    }
}

impl ProviderObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: ProviderObserver) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    pub fn notify(&mut self, event: ProviderEvent) {
        for (_, observer) in self.observers.iter_mut() {
            observer(event);
        }
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

/// A source of interleaved audio samples.
pub trait SoundDataProvider: Send {
    /// Current read position in samples.
    fn position(&self) -> u64;

    /// Total length in samples, `None` when unbounded.
    fn length(&self) -> Option<u64>;

    fn can_seek(&self) -> bool;

    fn sample_format(&self) -> SampleFormat {
        SampleFormat::F32
    }

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Fill `buffer` from the current position. Returns samples written;
    /// fewer than requested means the end was reached.
    fn read(&mut self, buffer: &mut [f32]) -> usize;

    /// Move the read position to `sample_offset`.
    fn seek(&mut self, sample_offset: u64) -> Result<(), ProviderError>;

    /// Register for notifications. Providers that never notify return `None`.
    fn subscribe(&mut self, _observer: ProviderObserver) -> Option<ObserverId> {
        None
    }

    fn unsubscribe(&mut self, _id: ObserverId) -> bool {
        false
    }

    /// Release resources. Must be safe to call more than once.
    fn dispose(&mut self) {}
}
