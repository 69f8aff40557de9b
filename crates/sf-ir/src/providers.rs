//! In-memory sound-data providers.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::sound::{
    ObserverId, ProviderError, ProviderEvent, ProviderObserver, ProviderObservers, SoundDataProvider,
};

/// Decoded, interleaved samples held in memory.
///
/// The sample data is reference counted, so clones share it while keeping
/// independent read positions.
#[derive(Debug)]
pub struct RawDataProvider {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
    position: u64,
    observers: ProviderObservers,
    disposed: bool,
}

impl RawDataProvider {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self::from_shared(samples.into(), channels, sample_rate)
    }

    pub fn from_shared(samples: Arc<[f32]>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
            position: 0,
            observers: ProviderObservers::new(),
            disposed: false,
        }
    }

    /// A provider of `frames` frames all set to `value`.
    pub fn constant(value: f32, frames: usize, channels: u16, sample_rate: u32) -> Self {
        Self::new(alloc::vec![value; frames * channels.max(1) as usize], channels, sample_rate)
    }

    /// A new provider over the same samples, positioned at zero.
    pub fn share(&self) -> Self {
        Self::from_shared(self.samples.clone(), self.channels, self.sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl SoundDataProvider for RawDataProvider {
    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> Option<u64> {
        Some(self.samples.len() as u64)
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, buffer: &mut [f32]) -> usize {
        if self.disposed {
            return 0;
        }
        let start = (self.position as usize).min(self.samples.len());
        let count = buffer.len().min(self.samples.len() - start);
        buffer[..count].copy_from_slice(&self.samples[start..start + count]);
        self.position += count as u64;

        if count > 0 {
            self.observers.notify(ProviderEvent::PositionChanged(self.position));
        }
        if count < buffer.len() || self.position >= self.samples.len() as u64 {
            self.observers.notify(ProviderEvent::EndOfStream);
        }
        count
    }

    fn seek(&mut self, sample_offset: u64) -> Result<(), ProviderError> {
        if self.disposed {
            return Err(ProviderError::Disposed);
        }
        let length = self.samples.len() as u64;
        if sample_offset > length {
            return Err(ProviderError::OutOfRange { offset: sample_offset, length });
        }
        self.position = sample_offset;
        self.observers.notify(ProviderEvent::PositionChanged(self.position));
        Ok(())
    }

    fn subscribe(&mut self, observer: ProviderObserver) -> Option<ObserverId> {
        Some(self.observers.subscribe(observer))
    }

    fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.observers.clear();
        self.samples = Arc::from(Vec::new());
        self.position = 0;
    }
}

/// Zero samples, finite or endless. Backs silence segments.
#[derive(Clone, Debug)]
pub struct SilenceProvider {
    channels: u16,
    sample_rate: u32,
    length: Option<u64>,
    position: u64,
}

impl SilenceProvider {
    /// Unbounded silence.
    pub fn endless(channels: u16, sample_rate: u32) -> Self {
        Self { channels: channels.max(1), sample_rate, length: None, position: 0 }
    }

    /// Silence of `samples` interleaved samples.
    pub fn with_length(samples: u64, channels: u16, sample_rate: u32) -> Self {
        Self { length: Some(samples), ..Self::endless(channels, sample_rate) }
    }
}

impl SoundDataProvider for SilenceProvider {
    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> Option<u64> {
        self.length
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, buffer: &mut [f32]) -> usize {
        let count = match self.length {
            Some(len) => (buffer.len() as u64).min(len.saturating_sub(self.position)) as usize,
            None => buffer.len(),
        };
        buffer[..count].fill(0.0);
        self.position += count as u64;
        count
    }

    fn seek(&mut self, sample_offset: u64) -> Result<(), ProviderError> {
        if let Some(length) = self.length {
            if sample_offset > length {
                return Err(ProviderError::OutOfRange { offset: sample_offset, length });
            }
        }
        self.position = sample_offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn raw_reads_and_signals_end() {
        let ends = Arc::new(AtomicUsize::new(0));
        let seen = ends.clone();
        let mut p = RawDataProvider::new(vec![0.1, 0.2, 0.3, 0.4], 2, 44100);
        p.subscribe(Box::new(move |e: ProviderEvent| {
            if e == ProviderEvent::EndOfStream {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let mut buf = [0.0f32; 3];
        assert_eq!(p.read(&mut buf), 3);
        assert_eq!(buf, [0.1, 0.2, 0.3]);
        assert_eq!(ends.load(Ordering::SeqCst), 0);
        assert_eq!(p.read(&mut buf), 1);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn raw_seek_bounds() {
        let mut p = RawDataProvider::constant(0.5, 10, 2, 48000);
        assert!(p.seek(20).is_ok());
        assert_eq!(p.seek(21), Err(ProviderError::OutOfRange { offset: 21, length: 20 }));
    }

    #[test]
    fn raw_dispose_is_idempotent() {
        let mut p = RawDataProvider::constant(0.5, 10, 1, 48000);
        p.dispose();
        p.dispose();
        assert!(p.is_disposed());
        let mut buf = [1.0f32; 4];
        assert_eq!(p.read(&mut buf), 0);
    }

    #[test]
    fn share_has_independent_position() {
        let mut a = RawDataProvider::constant(0.25, 4, 1, 8000);
        let mut buf = [0.0f32; 2];
        a.read(&mut buf);
        let b = a.share();
        assert_eq!(a.position(), 2);
        assert_eq!(b.position(), 0);
    }

    #[test]
    fn silence_finite_and_endless() {
        let mut finite = SilenceProvider::with_length(5, 1, 44100);
        let mut buf = [1.0f32; 8];
        assert_eq!(finite.read(&mut buf), 5);
        assert_eq!(&buf[..5], &[0.0; 5]);
        assert_eq!(buf[5], 1.0);

        let mut endless = SilenceProvider::endless(2, 44100);
        assert_eq!(endless.read(&mut buf), 8);
        assert_eq!(endless.length(), None);
    }
}
