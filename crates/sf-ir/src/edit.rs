//! Partial-update commands for sequence content.
//!
//! Every field is optional; `None` leaves the target value unchanged.

use uuid::Uuid;

/// A partial update to one note.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoteEdit {
    pub id: Uuid,
    pub start_tick: Option<u64>,
    pub duration_ticks: Option<u64>,
    pub note_number: Option<u8>,
    pub velocity: Option<u8>,
    pub channel: Option<u8>,
}

impl NoteEdit {
    pub fn new(id: Uuid) -> Self {
        Self { id, ..Default::default() }
    }

    pub fn start(mut self, tick: u64) -> Self {
        self.start_tick = Some(tick);
        self
    }

    pub fn duration(mut self, ticks: u64) -> Self {
        self.duration_ticks = Some(ticks);
        self
    }

    pub fn note(mut self, note_number: u8) -> Self {
        self.note_number = Some(note_number);
        self
    }

    pub fn velocity(mut self, velocity: u8) -> Self {
        self.velocity = Some(velocity);
        self
    }
}

/// A partial update to one control point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlPointEdit {
    pub id: Uuid,
    pub tick: Option<u64>,
    pub value: Option<u16>,
}

impl ControlPointEdit {
    pub fn new(id: Uuid) -> Self {
        Self { id, ..Default::default() }
    }

    pub fn tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    pub fn value(mut self, value: u16) -> Self {
        self.value = Some(value);
        self
    }
}
