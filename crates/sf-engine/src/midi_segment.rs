//! MIDI segments: an editable sequence placed on a MIDI track.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sf_ir::{MidiDataProvider, MidiSequence};
use uuid::Uuid;

/// A MIDI clip on the timeline.
///
/// The segment owns its sequence and lazily derives a render-ready
/// [`MidiDataProvider`] from it. The provider is rebuilt under a lock only
/// after the sequence has been touched; readers check the dirty flag
/// without locking.
#[derive(Debug)]
pub struct MidiSegment {
    id: Uuid,
    pub name: String,
    timeline_start: Duration,
    sequence: MidiSequence,
    dirty: AtomicBool,
    provider: Mutex<Option<Arc<MidiDataProvider>>>,
}

impl MidiSegment {
    pub fn new(name: &str, sequence: MidiSequence, timeline_start: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            timeline_start,
            sequence,
            dirty: AtomicBool::new(true),
            provider: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timeline_start(&self) -> Duration {
        self.timeline_start
    }

    pub fn set_timeline_start(&mut self, start: Duration) {
        self.timeline_start = start;
    }

    pub fn sequence(&self) -> &MidiSequence {
        &self.sequence
    }

    /// Mutable access; the cached provider is rebuilt on next read.
    pub fn sequence_mut(&mut self) -> &mut MidiSequence {
        self.dirty.store(true, Ordering::Release);
        &mut self.sequence
    }

    pub fn into_sequence(self) -> MidiSequence {
        self.sequence
    }

    pub fn is_provider_stale(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Flag the cached provider as stale.
    pub fn invalidate(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Render-ready view of the current sequence.
    pub fn data_provider(&self) -> Arc<MidiDataProvider> {
        if let Some(provider) = self.cached_provider() {
            return provider;
        }
        let mut slot = match self.provider.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.dirty.load(Ordering::Acquire) || slot.is_none() {
            *slot = Some(Arc::new(MidiDataProvider::from_sequence(&self.sequence)));
            self.dirty.store(false, Ordering::Release);
        }
        match slot.as_ref() {
            Some(provider) => provider.clone(),
            None => Arc::new(MidiDataProvider::from_sequence(&self.sequence)),
        }
    }

    /// Cached provider if it is current, without rebuilding.
    pub fn cached_provider(&self) -> Option<Arc<MidiDataProvider>> {
        if self.dirty.load(Ordering::Acquire) {
            return None;
        }
        self.provider.lock().ok().and_then(|slot| slot.clone())
    }

    /// Length in ticks of the sequence.
    pub fn length_ticks(&self) -> u64 {
        self.sequence.peek_length_ticks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_ir::MidiNote;

    fn segment() -> MidiSegment {
        let mut seq = MidiSequence::new(480);
        seq.add_note(MidiNote::new(0, 480, 60, 100));
        MidiSegment::new("clip", seq, Duration::ZERO)
    }

    #[test]
    fn provider_is_cached_until_edit() {
        let mut seg = segment();
        assert!(seg.cached_provider().is_none());
        let a = seg.data_provider();
        let b = seg.data_provider();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.events().len(), 2);

        seg.sequence_mut().add_note(MidiNote::new(480, 480, 62, 100));
        assert!(seg.is_provider_stale());
        let c = seg.data_provider();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.events().len(), 4);
        assert_eq!(a.events().len(), 2);
    }

    #[test]
    fn length_follows_sequence() {
        let seg = segment();
        assert_eq!(seg.length_ticks(), 480);
    }
}
