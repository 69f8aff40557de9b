//! Read-only, playback-ready MIDI view.
//!
//! A [`MidiDataProvider`] is a snapshot: it is rebuilt from a sequence (or
//! a parsed file) rather than mutated. Its tempo map comes from embedded
//! `Tempo` meta events, tick based, seeded with 500000 us/quarter at tick 0.

use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;
use core::time::Duration;

use crate::event::{sort_events, EventKind, MetaEvent, MidiEvent};
use crate::sequence::MidiSequence;
use crate::tempo::{micros_per_quarter_to_bpm, TempoMarker, TempoTrack, DEFAULT_MICROS_PER_QUARTER};

/// A tempo change at an absolute tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickTempo {
    pub tick: u64,
    pub micros_per_quarter: u32,
}

/// Immutable event list with its own tick-based tempo map.
#[derive(Clone, Debug)]
pub struct MidiDataProvider {
    ticks_per_quarter_note: u16,
    events: Vec<MidiEvent>,
    tempo: Vec<TickTempo>,
}

impl MidiDataProvider {
    /// Build from an arbitrary event list (sorted here).
    pub fn from_events(ticks_per_quarter_note: u16, mut events: Vec<MidiEvent>) -> Self {
        sort_events(&mut events);
        let mut tempo = vec![TickTempo { tick: 0, micros_per_quarter: DEFAULT_MICROS_PER_QUARTER }];
        for event in &events {
            if let EventKind::Meta(MetaEvent::Tempo(micros)) = event.kind {
                if micros == 0 {
                    continue;
                }
                let point = TickTempo { tick: event.tick, micros_per_quarter: micros };
                match tempo.last_mut() {
                    Some(last) if last.tick == event.tick => *last = point,
                    _ => tempo.push(point),
                }
            }
        }
        Self { ticks_per_quarter_note: ticks_per_quarter_note.max(1), events, tempo }
    }

    /// Snapshot a sequence's current content.
    pub fn from_sequence(sequence: &MidiSequence) -> Self {
        Self::from_events(sequence.ticks_per_quarter_note(), sequence.snapshot_events())
    }

    pub fn ticks_per_quarter_note(&self) -> u16 {
        self.ticks_per_quarter_note
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    pub fn tempo_points(&self) -> &[TickTempo] {
        &self.tempo
    }

    /// Tick of the last event.
    pub fn length_ticks(&self) -> u64 {
        self.events.last().map_or(0, |e| e.tick)
    }

    /// Wall-clock length.
    pub fn duration(&self) -> Duration {
        self.tick_to_time(self.length_ticks())
    }

    /// Index range of events with `start <= tick < end`.
    ///
    /// Binary search for the first event, then a forward scan to the end
    /// of the window.
    pub fn event_range(&self, start_tick: u64, end_tick: u64) -> Range<usize> {
        let first = self.events.partition_point(|e| e.tick < start_tick);
        let mut last = first;
        while last < self.events.len() && self.events[last].tick < end_tick {
            last += 1;
        }
        first..last
    }

    /// Events with `start <= tick < end`, in order.
    pub fn events_in(&self, start_tick: u64, end_tick: u64) -> &[MidiEvent] {
        &self.events[self.event_range(start_tick, end_tick)]
    }

    fn micros_per_tick(&self, micros_per_quarter: u32) -> f64 {
        micros_per_quarter as f64 / self.ticks_per_quarter_note as f64
    }

    /// Wall-clock position of `tick` under the embedded tempo map.
    pub fn tick_to_time(&self, tick: u64) -> Duration {
        let mut micros = 0.0;
        for (i, point) in self.tempo.iter().enumerate() {
            let seg_end = self.tempo.get(i + 1).map_or(u64::MAX, |next| next.tick);
            if tick <= seg_end {
                micros += (tick - point.tick) as f64 * self.micros_per_tick(point.micros_per_quarter);
                break;
            }
            micros += (seg_end - point.tick) as f64 * self.micros_per_tick(point.micros_per_quarter);
        }
        Duration::from_secs_f64(micros / 1_000_000.0)
    }

    /// Nearest tick for a wall-clock position under the embedded tempo map.
    pub fn time_to_tick(&self, time: Duration) -> u64 {
        let target = time.as_secs_f64() * 1_000_000.0;
        let mut elapsed = 0.0;
        for (i, point) in self.tempo.iter().enumerate() {
            let per_tick = self.micros_per_tick(point.micros_per_quarter);
            match self.tempo.get(i + 1) {
                Some(next) => {
                    let seg_micros = (next.tick - point.tick) as f64 * per_tick;
                    if target <= elapsed + seg_micros {
                        return point.tick + libm::round((target - elapsed) / per_tick) as u64;
                    }
                    elapsed += seg_micros;
                }
                None => return point.tick + libm::round((target - elapsed) / per_tick) as u64,
            }
        }
        0
    }

    /// The embedded tempo map expressed as a wall-clock tempo track.
    pub fn to_tempo_track(&self) -> TempoTrack {
        TempoTrack::from_markers(self.tempo.iter().map(|p| {
            TempoMarker::new(self.tick_to_time(p.tick), micros_per_quarter_to_bpm(p.micros_per_quarter))
        }))
    }
}
