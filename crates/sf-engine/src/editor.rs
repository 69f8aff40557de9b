//! Structural editing of a composition.
//!
//! Every successful edit marks the composition dirty. Geometrically
//! impossible requests (splitting at a boundary, empty ranges, joining
//! fewer than two segments) return `None`/`false` and change nothing.

use std::time::Duration;

use log::debug;
use sf_ir::{quantize, tick_to_time, time_to_tick, MidiSequence, NoteEdit, QuantizeSettings};
use uuid::Uuid;

use crate::composition::Composition;
use crate::error::CompositionError;
use crate::midi_segment::MidiSegment;
use crate::modifiers::{init_modifiers, SoundModifier};
use crate::segment::AudioSegment;
use crate::synth::ToneSynth;
use crate::track::{MidiTrack, Track};

/// Mutable editing view over a composition.
pub struct CompositionEditor<'a> {
    composition: &'a mut Composition,
}

impl Composition {
    pub fn editor(&mut self) -> CompositionEditor<'_> {
        CompositionEditor { composition: self }
    }
}

impl<'a> CompositionEditor<'a> {
    fn track_mut(&mut self, track: Uuid) -> Option<&mut Track> {
        self.composition.tracks.iter_mut().find(|t| t.id() == track)
    }

    fn midi_track_mut(&mut self, track: Uuid) -> Option<&mut MidiTrack> {
        self.composition.midi_tracks.iter_mut().find(|t| t.id() == track)
    }

    fn format(&self) -> (u32, u16) {
        let config = self.composition.config();
        (config.sample_rate, config.channels)
    }

    fn tick_at(&self, time: Duration) -> u64 {
        let c = &self.composition;
        time_to_tick(time, c.ticks_per_quarter_note(), &c.tempo)
    }

    fn time_at(&self, tick: u64) -> Duration {
        let c = &self.composition;
        tick_to_time(tick, c.ticks_per_quarter_note(), &c.tempo)
    }

    // --- Tracks ---

    pub fn add_track(&mut self, name: &str) -> Uuid {
        let mut track = Track::new(name);
        track.set_composition(Some(self.composition.id()));
        let id = track.id();
        self.composition.register_track(&track);
        self.composition.tracks.push(track);
        self.composition.mark_dirty();
        debug!("Added track '{}'", name);
        id
    }

    pub fn remove_track(&mut self, track: Uuid) -> bool {
        let Some(pos) = self.composition.tracks.iter().position(|t| t.id() == track) else {
            return false;
        };
        let mut removed = self.composition.tracks.remove(pos);
        removed.dispose();
        removed.set_composition(None);
        self.composition.unregister(&[removed.id(), removed.settings.id()]);
        self.composition.mark_dirty();
        debug!("Removed track '{}'", removed.name);
        true
    }

    /// Add a MIDI track routed to a fresh [`ToneSynth`].
    pub fn add_midi_track(&mut self, name: &str) -> Uuid {
        let mut track = MidiTrack::new(name);
        track.set_composition(Some(self.composition.id()));
        track.set_target(Some(Box::new(ToneSynth::default())));
        let id = track.id();
        self.composition.register_midi_track(&track);
        self.composition.midi_tracks.push(track);
        self.composition.mark_dirty();
        debug!("Added MIDI track '{}'", name);
        id
    }

    pub fn remove_midi_track(&mut self, track: Uuid) -> bool {
        let Some(pos) = self.composition.midi_tracks.iter().position(|t| t.id() == track) else {
            return false;
        };
        let mut removed = self.composition.midi_tracks.remove(pos);
        removed.reset_target();
        removed.set_composition(None);
        self.composition.recorder.disarm_track(track);
        self.composition.unregister(&[removed.id(), removed.settings.id()]);
        self.composition.mark_dirty();
        debug!("Removed MIDI track '{}'", removed.name);
        true
    }

    // --- Audio segments ---

    pub fn add_segment(&mut self, track: Uuid, mut segment: AudioSegment) -> Result<Uuid, CompositionError> {
        let (sample_rate, channels) = self.format();
        let t = self.track_mut(track).ok_or(CompositionError::UnknownTrack(track))?;
        init_modifiers(&mut segment.settings.modifiers, sample_rate, channels);
        let id = t.add_segment(segment);
        self.composition.mark_dirty();
        Ok(id)
    }

    pub fn remove_segment(&mut self, track: Uuid, segment: Uuid) -> bool {
        let Some(t) = self.track_mut(track) else { return false };
        if t.remove_segment(segment).is_none() {
            return false;
        }
        self.composition.mark_dirty();
        true
    }

    pub fn move_segment(&mut self, track: Uuid, segment: Uuid, timeline_start: Duration) -> bool {
        let Some(t) = self.track_mut(track) else { return false };
        let Some(s) = t.segment_mut(segment) else { return false };
        s.set_timeline_start(timeline_start);
        t.sort_segments();
        self.composition.mark_dirty();
        true
    }

    /// Split at timeline position `at`. Returns the id of the new second
    /// part; `None` if `at` is not strictly inside the segment.
    pub fn split_audio_segment(&mut self, track: Uuid, segment: Uuid, at: Duration) -> Option<Uuid> {
        let t = self.track_mut(track)?;
        let s = t.segment_mut(segment)?;
        let second = s.fragment_from(at)?;
        let first_len = at - s.timeline_start();
        s.set_timeline_duration(first_len);
        let id = t.add_segment(second);
        self.composition.mark_dirty();
        debug!("Split segment {} at {:?}", segment, at);
        Some(id)
    }

    /// Replace `[range_start, range_start + range_duration)` on a track
    /// with one explicit silence segment. Segments inside the range are
    /// removed; segments crossing its edges are cut back to it.
    pub fn silence_segment(&mut self, track: Uuid, range_start: Duration, range_duration: Duration) -> bool {
        if range_duration.is_zero() {
            return false;
        }
        let (channels, sample_rate) = (self.composition.channels(), self.composition.sample_rate());
        let range_end = range_start + range_duration;
        let Some(t) = self.track_mut(track) else { return false };

        let snapshot: Vec<(Uuid, Duration, Duration)> =
            t.segments().iter().map(|s| (s.id(), s.timeline_start(), s.timeline_end())).collect();

        for &(id, start, end) in snapshot.iter().rev() {
            if end <= range_start || start >= range_end {
                continue;
            }
            if start >= range_start && end <= range_end {
                t.remove_segment(id);
            } else if start < range_start && end > range_end {
                let Some(s) = t.segment_mut(id) else { continue };
                let after = s.fragment_from(range_end);
                s.set_timeline_duration(range_start - start);
                if let Some(after) = after {
                    t.add_segment(after);
                }
            } else if start < range_start {
                if let Some(s) = t.segment_mut(id) {
                    s.set_timeline_duration(range_start - start);
                }
            } else {
                let keep = t.segment_mut(id).is_some_and(|s| s.trim_start(range_end - start));
                if !keep {
                    t.remove_segment(id);
                }
            }
        }
        t.sort_segments();
        t.add_segment(AudioSegment::silence(range_start, range_duration, channels, sample_rate));
        self.composition.mark_dirty();
        debug!("Silenced {:?}..{:?} on track {}", range_start, range_end, track);
        true
    }

    /// Ripple insert: open a gap of `duration` at `at`, pushing later
    /// material right. A segment spanning `at` is split.
    pub fn insert_silence(&mut self, track: Uuid, at: Duration, duration: Duration) -> bool {
        if duration.is_zero() {
            return false;
        }
        let Some(t) = self.track_mut(track) else { return false };
        let spanning: Vec<Uuid> = t
            .segments()
            .iter()
            .filter(|s| s.timeline_start() < at && s.timeline_end() > at)
            .map(|s| s.id())
            .collect();
        for id in spanning {
            let Some(s) = t.segment_mut(id) else { continue };
            let Some(after) = s.fragment_from(at) else { continue };
            let start = s.timeline_start();
            s.set_timeline_duration(at - start);
            t.add_segment(after);
        }
        let later: Vec<(Uuid, Duration)> = t
            .segments()
            .iter()
            .filter(|s| s.timeline_start() >= at)
            .map(|s| (s.id(), s.timeline_start()))
            .collect();
        for (id, start) in later {
            if let Some(s) = t.segment_mut(id) {
                s.set_timeline_start(start + duration);
            }
        }
        t.sort_segments();
        self.composition.mark_dirty();
        debug!("Inserted {:?} of silence at {:?} on track {}", duration, at, track);
        true
    }

    // --- MIDI segments ---

    pub fn add_midi_segment(
        &mut self,
        track: Uuid,
        name: &str,
        sequence: MidiSequence,
        timeline_start: Duration,
    ) -> Result<Uuid, CompositionError> {
        let t = self.midi_track_mut(track).ok_or(CompositionError::UnknownTrack(track))?;
        let id = t.add_segment(MidiSegment::new(name, sequence, timeline_start));
        self.composition.mark_dirty();
        Ok(id)
    }

    pub fn remove_midi_segment(&mut self, track: Uuid, segment: Uuid) -> bool {
        let Some(t) = self.midi_track_mut(track) else { return false };
        if t.remove_segment(segment).is_none() {
            return false;
        }
        self.composition.mark_dirty();
        true
    }

    pub fn move_midi_segment(&mut self, track: Uuid, segment: Uuid, timeline_start: Duration) -> bool {
        let Some(t) = self.midi_track_mut(track) else { return false };
        let Some(s) = t.segment_mut(segment) else { return false };
        s.set_timeline_start(timeline_start);
        t.sort_segments();
        self.composition.mark_dirty();
        true
    }

    /// Split a MIDI segment at timeline position `at`. Returns the ids of
    /// the two replacement segments.
    pub fn split_midi_segment(&mut self, track: Uuid, segment: Uuid, at: Duration) -> Option<(Uuid, Uuid)> {
        let split_at = self.tick_at(at);
        let (offset, length, name, start) = {
            let t = self.composition.midi_track(track)?;
            let s = t.segment(segment)?;
            (self.tick_at(s.timeline_start()), s.length_ticks(), s.name.clone(), s.timeline_start())
        };
        if split_at <= offset || split_at - offset >= length {
            return None;
        }
        let split_tick = split_at - offset;
        let second_start = self.time_at(split_at);

        let t = self.midi_track_mut(track)?;
        let original = t.remove_segment(segment)?;
        let (first, second) = original.sequence().split(split_tick);
        let a = t.add_segment(MidiSegment::new(&name, first, start));
        let b = t.add_segment(MidiSegment::new(&name, second, second_start));
        self.composition.mark_dirty();
        debug!("Split MIDI segment '{}' at tick {}", name, split_tick);
        Some((a, b))
    }

    /// Merge segments into one placed at the earliest start. Needs at
    /// least two segments of the track.
    pub fn join_midi_segments(&mut self, track: Uuid, segments: &[Uuid]) -> Option<Uuid> {
        let mut placed: Vec<(Duration, Uuid)> = {
            let t = self.composition.midi_track(track)?;
            t.segments()
                .iter()
                .filter(|s| segments.contains(&s.id()))
                .map(|s| (s.timeline_start(), s.id()))
                .collect()
        };
        if placed.len() < 2 {
            return None;
        }
        placed.sort();
        let first_start = placed[0].0;
        let first_tick = self.tick_at(first_start);
        let offsets: Vec<u64> = placed.iter().map(|(start, _)| self.tick_at(*start) - first_tick).collect();

        let t = self.midi_track_mut(track)?;
        let mut removed = Vec::with_capacity(placed.len());
        for (_, id) in &placed {
            if let Some(s) = t.remove_segment(*id) {
                removed.push(s);
            }
        }
        let parts: Vec<(u64, &MidiSequence)> =
            offsets.iter().zip(&removed).map(|(offset, s)| (*offset, s.sequence())).collect();
        let merged = MidiSequence::join(&parts)?;
        let name = removed[0].name.clone();
        let id = t.add_segment(MidiSegment::new(&name, merged, first_start));
        self.composition.mark_dirty();
        debug!("Joined {} MIDI segments into '{}'", removed.len(), name);
        Some(id)
    }

    /// Snap a segment's notes to a grid. Returns the number of notes moved.
    pub fn quantize_segment(&mut self, track: Uuid, segment: Uuid, settings: &QuantizeSettings) -> usize {
        let Some(s) = self.midi_track_mut(track).and_then(|t| t.segment_mut(segment)) else {
            return 0;
        };
        let tpqn = s.sequence().ticks_per_quarter_note();
        let edits: Vec<NoteEdit> = quantize(s.sequence().notes(), tpqn, settings)
            .into_iter()
            .map(|q| {
                let edit = NoteEdit::new(q.note_id).start(q.new_start_tick);
                match q.new_duration_ticks {
                    Some(d) => edit.duration(d),
                    None => edit,
                }
            })
            .collect();
        let changed = s.sequence_mut().modify_notes(&edits);
        self.composition.mark_dirty();
        changed
    }

    // --- Tempo ---

    /// Add or replace a tempo marker. Returns false for an invalid BPM.
    pub fn set_tempo_marker(&mut self, time: Duration, beats_per_minute: f64) -> bool {
        if !self.composition.tempo.set_marker(time, beats_per_minute) {
            return false;
        }
        self.composition.mark_dirty();
        true
    }

    /// Remove the marker at `time`; the marker at zero stays.
    pub fn remove_tempo_marker(&mut self, time: Duration) -> bool {
        if !self.composition.tempo.remove_marker(time) {
            return false;
        }
        self.composition.mark_dirty();
        true
    }

    /// Keep only the marker at zero.
    pub fn clear_tempo_markers(&mut self) {
        self.composition.tempo.clear();
        self.composition.mark_dirty();
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.composition.master_volume = volume.max(0.0);
        self.composition.mark_dirty();
    }

    // --- Modifier chains ---
    //
    // Attached modifiers are initialised for the composition's format.

    pub fn add_master_modifier(&mut self, mut modifier: Box<dyn SoundModifier>) {
        let (sample_rate, channels) = self.format();
        modifier.init(sample_rate, channels);
        debug!("Master modifier '{}' at {} Hz", modifier.info().name, sample_rate);
        self.composition.master_modifiers.push(modifier);
        self.composition.mark_dirty();
    }

    /// Append to an audio or MIDI track's chain. False for an unknown track.
    pub fn add_track_modifier(&mut self, track: Uuid, mut modifier: Box<dyn SoundModifier>) -> bool {
        let (sample_rate, channels) = self.format();
        modifier.init(sample_rate, channels);
        if let Some(t) = self.track_mut(track) {
            t.settings.modifiers.push(modifier);
        } else if let Some(t) = self.midi_track_mut(track) {
            t.settings.modifiers.push(modifier);
        } else {
            return false;
        }
        self.composition.mark_dirty();
        true
    }

    pub fn add_segment_modifier(&mut self, track: Uuid, segment: Uuid, mut modifier: Box<dyn SoundModifier>) -> bool {
        let (sample_rate, channels) = self.format();
        modifier.init(sample_rate, channels);
        let Some(s) = self.track_mut(track).and_then(|t| t.segment_mut(segment)) else {
            return false;
        };
        s.settings.modifiers.push(modifier);
        s.invalidate_cache();
        self.composition.mark_dirty();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompositionConfig;
    use crate::segment::share_provider;
    use sf_ir::{MidiNote, QuantizeGrid, RawDataProvider};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn comp() -> Composition {
        let config = CompositionConfig { sample_rate: 1000, channels: 1, ..Default::default() };
        Composition::new("edit", config).unwrap()
    }

    fn ramp(start: u64, len: usize) -> AudioSegment {
        let samples: Vec<f32> = (0..len).map(|i| i as f32 / 1000.0).collect();
        AudioSegment::from_provider("ramp", share_provider(RawDataProvider::new(samples, 1, 1000)), ms(start), true)
    }

    fn spans(c: &Composition, track: Uuid) -> Vec<(Duration, Duration, bool)> {
        c.track(track)
            .unwrap()
            .segments()
            .iter()
            .map(|s| (s.timeline_start(), s.timeline_end(), s.is_silence()))
            .collect()
    }

    #[test]
    fn silence_cases() {
        let mut c = comp();
        let t = c.editor().add_track("a");
        // spans the range, overlaps start, overlaps end, inside
        c.editor().add_segment(t, ramp(0, 100)).unwrap();
        c.editor().add_segment(t, ramp(150, 100)).unwrap();
        c.editor().add_segment(t, ramp(390, 100)).unwrap();
        c.editor().add_segment(t, ramp(210, 20)).unwrap();
        assert!(c.editor().silence_segment(t, ms(200), ms(200)));
        assert_eq!(
            spans(&c, t),
            vec![
                (ms(0), ms(100), false),
                (ms(150), ms(200), false),
                (ms(200), ms(400), true),
                (ms(400), ms(490), false),
            ]
        );
        assert!(!c.editor().silence_segment(t, ms(10), Duration::ZERO));
    }

    #[test]
    fn silence_inside_one_segment_keeps_source_alignment() {
        let mut c = comp();
        let t = c.editor().add_track("a");
        c.editor().add_segment(t, ramp(0, 100)).unwrap();
        c.editor().silence_segment(t, ms(20), ms(30));
        let segs = c.track(t).unwrap().segments();
        assert_eq!(segs.len(), 3);
        let after = segs.iter().find(|s| s.timeline_start() == ms(50)).unwrap();
        assert_eq!(after.source_start(), ms(50));
        assert_eq!(after.timeline_end(), ms(100));
    }

    #[test]
    fn split_audio_segment_bounds() {
        let mut c = comp();
        let t = c.editor().add_track("a");
        let s = c.editor().add_segment(t, ramp(0, 100)).unwrap();
        assert!(c.editor().split_audio_segment(t, s, ms(0)).is_none());
        assert!(c.editor().split_audio_segment(t, s, ms(100)).is_none());
        let second = c.editor().split_audio_segment(t, s, ms(40)).unwrap();
        let tr = c.track(t).unwrap();
        assert_eq!(tr.segment(s).unwrap().timeline_end(), ms(40));
        assert_eq!(tr.segment(second).unwrap().source_start(), ms(40));
    }

    #[test]
    fn insert_silence_ripples() {
        let mut c = comp();
        let t = c.editor().add_track("a");
        c.editor().add_segment(t, ramp(0, 100)).unwrap();
        c.editor().add_segment(t, ramp(200, 50)).unwrap();
        assert!(c.editor().insert_silence(t, ms(50), ms(25)));
        let got: Vec<_> = spans(&c, t).into_iter().map(|(s, e, _)| (s, e)).collect();
        assert_eq!(got, vec![(ms(0), ms(50)), (ms(75), ms(125)), (ms(225), ms(275))]);
    }

    fn midi_comp() -> (Composition, Uuid, Uuid) {
        let mut c = comp();
        let t = c.editor().add_midi_track("m");
        let mut seq = MidiSequence::new(480);
        seq.add_note(MidiNote::new(0, 240, 60, 100));
        seq.add_note(MidiNote::new(480, 240, 62, 100));
        seq.add_note(MidiNote::new(960, 240, 64, 100));
        let s = c.editor().add_midi_segment(t, "clip", seq, ms(1000)).unwrap();
        (c, t, s)
    }

    #[test]
    fn split_then_join_restores_notes() {
        let (mut c, t, s) = midi_comp();
        assert!(c.editor().split_midi_segment(t, s, ms(1000)).is_none());
        assert!(c.editor().split_midi_segment(t, s, ms(2500)).is_none());

        // 1000 ms + 360 ticks (375 ms)
        let (a, b) = c.editor().split_midi_segment(t, s, ms(1375)).unwrap();
        let track = c.midi_track(t).unwrap();
        assert_eq!(track.segment(b).unwrap().timeline_start(), ms(1375));
        assert_eq!(track.segment(a).unwrap().sequence().note_count(), 1);

        let joined = c.editor().join_midi_segments(t, &[b, a]).unwrap();
        let track = c.midi_track(t).unwrap();
        assert_eq!(track.segments().len(), 1);
        let seg = track.segment(joined).unwrap();
        assert_eq!(seg.timeline_start(), ms(1000));
        let mut notes: Vec<_> = seg.sequence().notes().map(|n| (n.start_tick, n.duration_ticks, n.note_number)).collect();
        notes.sort();
        assert_eq!(notes, vec![(0, 240, 60), (480, 240, 62), (960, 240, 64)]);
    }

    #[test]
    fn join_needs_two() {
        let (mut c, t, s) = midi_comp();
        assert!(c.editor().join_midi_segments(t, &[s]).is_none());
        assert_eq!(c.midi_track(t).unwrap().segments().len(), 1);
    }

    #[test]
    fn quantize_moves_notes() {
        let mut c = comp();
        let t = c.editor().add_midi_track("m");
        let mut seq = MidiSequence::new(120);
        for tick in [10, 115, 240] {
            seq.add_note(MidiNote::new(tick, 30, 60, 100));
        }
        let s = c.editor().add_midi_segment(t, "q", seq, Duration::ZERO).unwrap();
        let settings = QuantizeSettings { grid: QuantizeGrid::Quarter, ..Default::default() };
        assert_eq!(c.editor().quantize_segment(t, s, &settings), 3);
        let mut starts: Vec<_> = c.midi_track(t).unwrap().segment(s).unwrap().sequence().notes().map(|n| n.start_tick).collect();
        starts.sort();
        assert_eq!(starts, vec![0, 120, 240]);
    }

    #[test]
    fn tempo_markers_and_dirty() {
        let mut c = comp();
        c.clear_dirty();
        assert!(c.editor().set_tempo_marker(ms(2000), 60.0));
        assert!(c.is_dirty());
        assert!(!c.editor().remove_tempo_marker(Duration::ZERO));
        assert!(c.editor().remove_tempo_marker(ms(2000)));
        c.editor().set_tempo_marker(ms(1000), 90.0);
        c.editor().clear_tempo_markers();
        assert_eq!(c.tempo().len(), 1);
        assert!(!c.editor().set_tempo_marker(ms(10), 0.0));
    }
}
