//! Note-On / Note-Off reconciliation.
//!
//! Open notes are tracked per `(channel, pitch)` with one slot per key. A
//! second Note-On for a key that is still open replaces the first; the
//! replaced note is never emitted. Velocity-zero Note-On closes a note
//! exactly like Note-Off. Notes still open when the stream ends are dropped.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::event::MidiMessage;

/// A note recovered from an on/off pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairedNote {
    pub channel: u8,
    pub note_number: u8,
    pub velocity: u8,
    pub start_tick: u64,
    /// Always at least one tick
    pub duration_ticks: u64,
}

#[derive(Clone, Copy, Debug)]
struct OpenNote {
    start_tick: u64,
    velocity: u8,
}

/// Incremental pairer fed with events in ascending tick order.
#[derive(Clone, Debug, Default)]
pub struct NotePairer {
    open: BTreeMap<(u8, u8), OpenNote>,
}

impl NotePairer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one message. Returns a note when this message closes one.
    pub fn push(&mut self, tick: u64, message: &MidiMessage) -> Option<PairedNote> {
        match *message {
            MidiMessage::NoteOn { channel, note, velocity } if velocity > 0 => {
                self.open.insert((channel, note), OpenNote { start_tick: tick, velocity });
                None
            }
            MidiMessage::NoteOn { channel, note, .. } | MidiMessage::NoteOff { channel, note, .. } => {
                let open = self.open.remove(&(channel, note))?;
                Some(PairedNote {
                    channel,
                    note_number: note,
                    velocity: open.velocity,
                    start_tick: open.start_tick,
                    duration_ticks: tick.saturating_sub(open.start_tick).max(1),
                })
            }
            _ => None,
        }
    }

    /// Number of notes currently waiting for their Note-Off.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Whether a note is open for this key.
    pub fn is_open(&self, channel: u8, note: u8) -> bool {
        self.open.contains_key(&(channel, note))
    }

    /// Forget all open notes.
    pub fn clear(&mut self) {
        self.open.clear();
    }
}

/// Pair every note in a tick-sorted message stream.
pub fn pair_notes<'a, I>(messages: I) -> Vec<PairedNote>
where
    I: IntoIterator<Item = (u64, &'a MidiMessage)>,
{
    let mut pairer = NotePairer::new();
    messages
        .into_iter()
        .filter_map(|(tick, message)| pairer.push(tick, message))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(channel: u8, note: u8, velocity: u8) -> MidiMessage {
        MidiMessage::NoteOn { channel, note, velocity }
    }

    fn off(channel: u8, note: u8) -> MidiMessage {
        MidiMessage::NoteOff { channel, note, velocity: 64 }
    }

    #[test]
    fn simple_pair() {
        let stream = [(0, on(0, 60, 100)), (480, off(0, 60))];
        let notes = pair_notes(stream.iter().map(|(t, m)| (*t, m)));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].start_tick, 0);
        assert_eq!(notes[0].duration_ticks, 480);
        assert_eq!(notes[0].velocity, 100);
    }

    #[test]
    fn velocity_zero_closes() {
        let stream = [(10, on(2, 64, 90)), (20, on(2, 64, 0))];
        let notes = pair_notes(stream.iter().map(|(t, m)| (*t, m)));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].channel, 2);
        assert_eq!(notes[0].duration_ticks, 10);
    }

    #[test]
    fn last_note_on_wins() {
        let stream = [(0, on(0, 60, 80)), (100, on(0, 60, 90)), (200, off(0, 60))];
        let notes = pair_notes(stream.iter().map(|(t, m)| (*t, m)));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].start_tick, 100);
        assert_eq!(notes[0].velocity, 90);
    }

    #[test]
    fn keys_are_per_channel() {
        let stream = [(0, on(0, 60, 80)), (0, on(1, 60, 80)), (50, off(1, 60)), (90, off(0, 60))];
        let notes = pair_notes(stream.iter().map(|(t, m)| (*t, m)));
        assert_eq!(notes.len(), 2);
        assert_eq!((notes[0].channel, notes[0].duration_ticks), (1, 50));
        assert_eq!((notes[1].channel, notes[1].duration_ticks), (0, 90));
    }

    #[test]
    fn unterminated_and_orphan_notes_dropped() {
        let mut pairer = NotePairer::new();
        assert!(pairer.push(0, &off(0, 61)).is_none());
        assert!(pairer.push(0, &on(0, 62, 70)).is_none());
        assert_eq!(pairer.open_count(), 1);
        assert!(pairer.is_open(0, 62));
    }

    #[test]
    fn zero_length_note_gets_one_tick() {
        let stream = [(30, on(0, 60, 80)), (30, off(0, 60))];
        let notes = pair_notes(stream.iter().map(|(t, m)| (*t, m)));
        assert_eq!(notes[0].duration_ticks, 1);
    }
}
