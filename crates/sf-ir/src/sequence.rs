//! Editable MIDI clip content.
//!
//! A [`MidiSequence`] keeps notes and control points keyed by id, plus
//! opaque "other" events (meta, SysEx, program changes). The flattened,
//! tick-sorted event list is a cache rebuilt on the first read after a
//! mutation, so batches of edits pay for a single rebuild.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use uuid::Uuid;

use crate::edit::{ControlPointEdit, NoteEdit};
use crate::event::{sort_events, EventKind, MetaEvent, MidiEvent, MidiMessage, PITCH_BEND_MAX};
use crate::pairing::NotePairer;

/// Controller bucket reserved for pitch bend.
pub const PITCH_BEND_CONTROLLER: i32 = -1;

/// A note owned by one sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiNote {
    pub id: Uuid,
    pub start_tick: u64,
    pub duration_ticks: u64,
    pub note_number: u8,
    pub velocity: u8,
    pub channel: u8,
}

impl MidiNote {
    /// A channel-0 note with a fresh id.
    pub fn new(start_tick: u64, duration_ticks: u64, note_number: u8, velocity: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_tick,
            duration_ticks,
            note_number: note_number.min(127),
            velocity: velocity.min(127),
            channel: 0,
        }
    }

    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = channel & 0x0F;
        self
    }

    /// Release tick. A zero-length note still sounds for one tick.
    pub fn end_tick(&self) -> u64 {
        self.start_tick + self.duration_ticks.max(1)
    }
}

/// A single automation value for a controller (or pitch bend).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlPoint {
    pub id: Uuid,
    pub tick: u64,
    /// 0..=127 for CC, 0..=16383 for pitch bend
    pub value: u16,
    pub channel: u8,
}

impl ControlPoint {
    pub fn new(tick: u64, value: u16) -> Self {
        Self { id: Uuid::new_v4(), tick, value, channel: 0 }
    }

    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = channel & 0x0F;
        self
    }
}

fn control_event(controller: i32, point: &ControlPoint) -> MidiEvent {
    let message = if controller == PITCH_BEND_CONTROLLER {
        MidiMessage::PitchBend { channel: point.channel, value: point.value.min(PITCH_BEND_MAX) }
    } else {
        MidiMessage::ControlChange {
            channel: point.channel,
            controller: controller.clamp(0, 127) as u8,
            value: point.value.min(127) as u8,
        }
    };
    MidiEvent::channel(point.tick, message)
}

/// Mutable MIDI content for one clip.
#[derive(Clone, Debug)]
pub struct MidiSequence {
    ticks_per_quarter_note: u16,
    notes: BTreeMap<Uuid, MidiNote>,
    control_points: BTreeMap<i32, BTreeMap<Uuid, ControlPoint>>,
    other_events: Vec<MidiEvent>,
    events: Vec<MidiEvent>,
    dirty: bool,
}

impl MidiSequence {
    /// An empty sequence. A zero resolution is raised to one tick per quarter.
    pub fn new(ticks_per_quarter_note: u16) -> Self {
        Self {
            ticks_per_quarter_note: ticks_per_quarter_note.max(1),
            notes: BTreeMap::new(),
            control_points: BTreeMap::new(),
            other_events: Vec::new(),
            events: Vec::new(),
            dirty: false,
        }
    }

    /// Build from an absolute-tick event stream, pairing notes.
    ///
    /// The stream is ordered by tick only, so a Note-On and Note-Off that
    /// share a tick pair in the order given. Control changes and pitch bends become
    /// control points; End-of-Track is dropped; everything else that is not
    /// a note message is kept as an other event.
    pub fn from_events(ticks_per_quarter_note: u16, mut events: Vec<MidiEvent>) -> Self {
        events.sort_by_key(|e| e.tick);
        let mut seq = Self::new(ticks_per_quarter_note);
        let mut pairer = NotePairer::new();

        for event in events {
            match event.kind {
                EventKind::Channel(message) => match message {
                    MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. } => {
                        if let Some(p) = pairer.push(event.tick, &message) {
                            seq.add_note(
                                MidiNote::new(p.start_tick, p.duration_ticks, p.note_number, p.velocity)
                                    .on_channel(p.channel),
                            );
                        }
                    }
                    MidiMessage::ControlChange { channel, controller, value } => {
                        seq.add_control_point(
                            controller as i32,
                            ControlPoint::new(event.tick, value as u16).on_channel(channel),
                        );
                    }
                    MidiMessage::PitchBend { channel, value } => {
                        seq.add_control_point(
                            PITCH_BEND_CONTROLLER,
                            ControlPoint::new(event.tick, value).on_channel(channel),
                        );
                    }
                    _ => seq.add_other_event(MidiEvent::channel(event.tick, message)),
                },
                EventKind::Meta(MetaEvent::EndOfTrack) => {}
                kind => seq.add_other_event(MidiEvent::new(event.tick, kind)),
            }
        }
        seq
    }

    pub fn ticks_per_quarter_note(&self) -> u16 {
        self.ticks_per_quarter_note
    }

    /// True when the cached event list is stale.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // --- Notes ---

    pub fn add_note(&mut self, note: MidiNote) -> Uuid {
        let id = note.id;
        self.notes.insert(id, note);
        self.dirty = true;
        id
    }

    /// Remove notes by id. Returns how many were present.
    pub fn remove_notes(&mut self, ids: &[Uuid]) -> usize {
        let removed = ids.iter().filter(|id| self.notes.remove(*id).is_some()).count();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Apply partial updates. Returns how many notes were found.
    pub fn modify_notes(&mut self, edits: &[NoteEdit]) -> usize {
        let mut changed = 0;
        for edit in edits {
            let Some(note) = self.notes.get_mut(&edit.id) else { continue };
            if let Some(v) = edit.start_tick {
                note.start_tick = v;
            }
            if let Some(v) = edit.duration_ticks {
                note.duration_ticks = v;
            }
            if let Some(v) = edit.note_number {
                note.note_number = v.min(127);
            }
            if let Some(v) = edit.velocity {
                note.velocity = v.min(127);
            }
            if let Some(v) = edit.channel {
                note.channel = v & 0x0F;
            }
            changed += 1;
        }
        if changed > 0 {
            self.dirty = true;
        }
        changed
    }

    pub fn note(&self, id: &Uuid) -> Option<&MidiNote> {
        self.notes.get(id)
    }

    pub fn notes(&self) -> impl Iterator<Item = &MidiNote> + '_ {
        self.notes.values()
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    // --- Control points ---

    pub fn add_control_point(&mut self, controller: i32, point: ControlPoint) -> Uuid {
        let id = point.id;
        self.control_points.entry(controller).or_default().insert(id, point);
        self.dirty = true;
        id
    }

    pub fn remove_control_points(&mut self, controller: i32, ids: &[Uuid]) -> usize {
        let Some(bucket) = self.control_points.get_mut(&controller) else { return 0 };
        let removed = ids.iter().filter(|id| bucket.remove(*id).is_some()).count();
        if bucket.is_empty() {
            self.control_points.remove(&controller);
        }
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn modify_control_points(&mut self, controller: i32, edits: &[ControlPointEdit]) -> usize {
        let Some(bucket) = self.control_points.get_mut(&controller) else { return 0 };
        let mut changed = 0;
        for edit in edits {
            let Some(point) = bucket.get_mut(&edit.id) else { continue };
            if let Some(v) = edit.tick {
                point.tick = v;
            }
            if let Some(v) = edit.value {
                point.value = v;
            }
            changed += 1;
        }
        if changed > 0 {
            self.dirty = true;
        }
        changed
    }

    /// Points for one controller, in id order.
    pub fn control_points(&self, controller: i32) -> impl Iterator<Item = &ControlPoint> + '_ {
        self.control_points.get(&controller).into_iter().flat_map(|b| b.values())
    }

    /// Controllers that currently hold at least one point.
    pub fn controllers(&self) -> impl Iterator<Item = i32> + '_ {
        self.control_points.keys().copied()
    }

    // --- Other events ---

    pub fn add_other_event(&mut self, event: MidiEvent) {
        self.other_events.push(event);
        self.dirty = true;
    }

    pub fn other_events(&self) -> &[MidiEvent] {
        &self.other_events
    }

    // --- Derived event stream ---

    fn build_events(&self) -> Vec<MidiEvent> {
        let point_count: usize = self.control_points.values().map(|b| b.len()).sum();
        let mut events =
            Vec::with_capacity(self.notes.len() * 2 + point_count + self.other_events.len());

        for note in self.notes.values() {
            events.push(MidiEvent::channel(
                note.start_tick,
                MidiMessage::NoteOn { channel: note.channel, note: note.note_number, velocity: note.velocity },
            ));
            events.push(MidiEvent::channel(
                note.end_tick(),
                MidiMessage::NoteOff { channel: note.channel, note: note.note_number, velocity: 0 },
            ));
        }
        for (&controller, bucket) in &self.control_points {
            events.extend(bucket.values().map(|p| control_event(controller, p)));
        }
        events.extend(self.other_events.iter().cloned());
        sort_events(&mut events);
        events
    }

    /// The flattened, tick-sorted event list, rebuilt if stale.
    pub fn events(&mut self) -> &[MidiEvent] {
        if self.dirty {
            self.events = self.build_events();
            self.dirty = false;
        }
        &self.events
    }

    /// An owned copy of the event list without touching the cache.
    pub fn snapshot_events(&self) -> Vec<MidiEvent> {
        if self.dirty {
            self.build_events()
        } else {
            self.events.clone()
        }
    }

    /// Tick of the last event, or zero when empty.
    pub fn length_ticks(&mut self) -> u64 {
        self.events().last().map_or(0, |e| e.tick)
    }

    /// Length computed without updating the cache.
    pub fn peek_length_ticks(&self) -> u64 {
        let notes = self.notes.values().map(|n| n.end_tick());
        let points = self.control_points.values().flat_map(|b| b.values()).map(|p| p.tick);
        let others = self.other_events.iter().map(|e| e.tick);
        notes.chain(points).chain(others).max().unwrap_or(0)
    }

    // --- Split / join ---

    /// Split at `split_tick` into two sequences; the second is rebased to zero.
    ///
    /// Notes wholly on one side keep their ids. A note crossing the split
    /// is cut: the first part keeps the id, the second part becomes a new,
    /// independent note starting at tick zero.
    pub fn split(&self, split_tick: u64) -> (MidiSequence, MidiSequence) {
        let mut first = MidiSequence::new(self.ticks_per_quarter_note);
        let mut second = MidiSequence::new(self.ticks_per_quarter_note);

        for note in self.notes.values() {
            if note.end_tick() <= split_tick {
                first.add_note(*note);
            } else if note.start_tick >= split_tick {
                second.add_note(MidiNote { start_tick: note.start_tick - split_tick, ..*note });
            } else {
                first.add_note(MidiNote { duration_ticks: split_tick - note.start_tick, ..*note });
                second.add_note(MidiNote {
                    id: Uuid::new_v4(),
                    start_tick: 0,
                    duration_ticks: note.end_tick() - split_tick,
                    ..*note
                });
            }
        }

        for (&controller, bucket) in &self.control_points {
            for point in bucket.values() {
                if point.tick < split_tick {
                    first.add_control_point(controller, *point);
                } else {
                    second.add_control_point(
                        controller,
                        ControlPoint { tick: point.tick - split_tick, ..*point },
                    );
                }
            }
        }

        for event in &self.other_events {
            if event.tick < split_tick {
                first.add_other_event(event.clone());
            } else {
                second.add_other_event(MidiEvent::new(event.tick - split_tick, event.kind.clone()));
            }
        }

        (first, second)
    }

    /// Join sequences placed at tick offsets.
    ///
    /// Parts are ordered by offset. Resolution comes from the first part;
    /// parts with a different resolution must be rescaled by the caller.
    /// Returns `None` for an empty input.
    pub fn join(parts: &[(u64, &MidiSequence)]) -> Option<MidiSequence> {
        let mut ordered: Vec<&(u64, &MidiSequence)> = parts.iter().collect();
        ordered.sort_by_key(|(offset, _)| *offset);
        let (_, head) = ordered.first()?;
        let mut joined = MidiSequence::new(head.ticks_per_quarter_note);

        for (offset, seq) in ordered.iter().map(|p| (p.0, p.1)) {
            for note in seq.notes.values() {
                let id = if joined.notes.contains_key(&note.id) { Uuid::new_v4() } else { note.id };
                joined.add_note(MidiNote { id, start_tick: note.start_tick + offset, ..*note });
            }
            for (&controller, bucket) in &seq.control_points {
                for point in bucket.values() {
                    let taken = joined
                        .control_points
                        .get(&controller)
                        .is_some_and(|b| b.contains_key(&point.id));
                    let id = if taken { Uuid::new_v4() } else { point.id };
                    joined.add_control_point(
                        controller,
                        ControlPoint { id, tick: point.tick + offset, ..*point },
                    );
                }
            }
            for event in &seq.other_events {
                joined.add_other_event(MidiEvent::new(event.tick + offset, event.kind.clone()));
            }
        }
        Some(joined)
    }
}
