//! Per-render event schedule for a MIDI track.

use core::ops::Range;

/// Initial capacity; the queue only grows when a window holds more events.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Reference to one event of one segment's provider, at its absolute tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub tick: u64,
    /// Same-tick ordering rank (meta, note-off, other, note-on)
    pub rank: u8,
    /// Index into the track's provider list for this render
    pub source: u32,
    /// Index into that provider's event list
    pub index: u32,
}

/// A sorted list of events consumed through a cursor.
///
/// The queue is refilled on every render: `clear`, `push` the window's
/// events, `sort`, then `drain_until` in tick order. Nothing is removed
/// while draining, so a warm queue never allocates.
#[derive(Clone, Debug)]
pub struct EventQueue {
    events: Vec<ScheduledEvent>,
    /// Next event index to process
    cursor: usize,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { events: Vec::with_capacity(capacity), cursor: 0 }
    }

    pub fn push(&mut self, event: ScheduledEvent) {
        self.events.push(event);
    }

    /// Order by tick, then rank; ties keep segment order.
    pub fn sort(&mut self) {
        self.events.sort_unstable_by_key(|e| (e.tick, e.rank, e.source, e.index));
        self.cursor = 0;
    }

    /// Next unconsumed event.
    pub fn peek(&self) -> Option<&ScheduledEvent> {
        self.events.get(self.cursor)
    }

    /// Index range of events at or before `tick`, advancing the cursor.
    pub fn drain_until(&mut self, tick: u64) -> Range<usize> {
        let start = self.cursor;
        while self.cursor < self.events.len() && self.events[self.cursor].tick <= tick {
            self.cursor += 1;
        }
        start..self.cursor
    }

    pub fn get(&self, index: usize) -> Option<&ScheduledEvent> {
        self.events.get(index)
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.cursor = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
