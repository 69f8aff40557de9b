//! MIDI routing targets.
//!
//! A [`MidiDestination`] receives the channel messages a MIDI track emits.
//! Audio-producing destinations (synths) also render into the track's
//! buffer between events. Only physical outputs accept System-Exclusive.

use std::sync::{Arc, Mutex};

use sf_ir::MidiMessage;

/// Receiver of routed MIDI.
pub trait MidiDestination: Send {
    fn name(&self) -> &str;

    /// Handle one channel message.
    fn process_message(&mut self, message: &MidiMessage);

    /// True for hardware outputs, which also accept SysEx.
    fn is_physical(&self) -> bool {
        false
    }

    /// Raw SysEx payload (without 0xF0 / 0xF7 framing).
    fn process_sysex(&mut self, _data: &[u8]) {}

    /// True when `render` produces audio.
    fn produces_audio(&self) -> bool {
        false
    }

    /// Add the destination's audio for `out.len() / channels` frames.
    fn render(&mut self, _out: &mut [f32], _channels: u16, _sample_rate: u32) {}

    /// Silence all notes and clear internal state.
    fn reset(&mut self) {}
}

/// Something a [`RecordingDestination`] saw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceivedMidi {
    Message(MidiMessage),
    SysEx(Vec<u8>),
    Reset,
}

/// Destination that logs everything it receives into a shared list.
#[derive(Clone, Debug)]
pub struct RecordingDestination {
    name: String,
    physical: bool,
    log: Arc<Mutex<Vec<ReceivedMidi>>>,
}

impl RecordingDestination {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), physical: false, log: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Behave like a hardware port (accepts SysEx).
    pub fn physical(mut self) -> Self {
        self.physical = true;
        self
    }

    /// Shared handle to the received list.
    pub fn log(&self) -> Arc<Mutex<Vec<ReceivedMidi>>> {
        self.log.clone()
    }

    fn push(&self, item: ReceivedMidi) {
        if let Ok(mut log) = self.log.lock() {
            log.push(item);
        }
    }
}

impl MidiDestination for RecordingDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_message(&mut self, message: &MidiMessage) {
        self.push(ReceivedMidi::Message(*message));
    }

    fn is_physical(&self) -> bool {
        self.physical
    }

    fn process_sysex(&mut self, data: &[u8]) {
        self.push(ReceivedMidi::SysEx(data.to_vec()));
    }

    fn reset(&mut self) {
        self.push(ReceivedMidi::Reset);
    }
}
