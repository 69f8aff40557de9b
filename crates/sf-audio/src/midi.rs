//! MIDI hardware ports through `midir`.
//!
//! [`MidiInputPort`] feeds a recorder; [`MidiOutputPort`] is a physical
//! destination for a MIDI track and the only kind that accepts SysEx.

use log::{debug, info, warn};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use sf_engine::{CompositionError, MidiDestination, MidiInputCallback, MidiInputDevice};
use sf_ir::MidiMessage;

use crate::traits::AudioError;

const CLIENT_NAME: &str = "soundflow";

/// Largest SysEx message sent without reallocating the scratch buffer.
const SYSEX_SCRATCH: usize = 256;

/// All Notes Off controller.
const CC_ALL_NOTES_OFF: u8 = 123;

pub fn list_midi_inputs() -> Result<Vec<String>, AudioError> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| AudioError::MidiInit(e.to_string()))?;
    Ok(midi_in.ports().iter().filter_map(|p| midi_in.port_name(p).ok()).collect())
}

pub fn list_midi_outputs() -> Result<Vec<String>, AudioError> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| AudioError::MidiInit(e.to_string()))?;
    Ok(midi_out.ports().iter().filter_map(|p| midi_out.port_name(p).ok()).collect())
}

/// A hardware MIDI input, opened when a recorder starts it.
pub struct MidiInputPort {
    name: String,
    connection: Option<MidiInputConnection<()>>,
}

impl MidiInputPort {
    /// Refer to the first input whose name contains `name`. The port is
    /// looked up again on every start.
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), connection: None }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn connect(&mut self, mut callback: MidiInputCallback) -> Result<(), AudioError> {
        let mut midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| AudioError::MidiInit(e.to_string()))?;
        midi_in.ignore(Ignore::TimeAndActiveSense);
        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).is_ok_and(|n| n.contains(&self.name)))
            .ok_or_else(|| AudioError::NoMidiPort(self.name.clone()))?;

        let connection = midi_in
            .connect(&port, "soundflow-in", move |_stamp, message, _| callback(message), ())
            .map_err(|e| AudioError::MidiPort(e.to_string()))?;
        self.connection = Some(connection);
        info!("MIDI input '{}' connected", self.name);
        Ok(())
    }
}

impl MidiInputDevice for MidiInputPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, callback: MidiInputCallback) -> Result<(), CompositionError> {
        self.stop();
        Ok(self.connect(callback)?)
    }

    fn stop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            info!("MIDI input '{}' disconnected", self.name);
        }
    }
}

impl Drop for MidiInputPort {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A hardware MIDI output used as a track destination.
pub struct MidiOutputPort {
    name: String,
    connection: Option<MidiOutputConnection>,
    scratch: Vec<u8>,
    send_failed: bool,
}

impl MidiOutputPort {
    /// Open the first output whose name contains `name`.
    pub fn connect(name: &str) -> Result<Self, AudioError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| AudioError::MidiInit(e.to_string()))?;
        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| midi_out.port_name(p).is_ok_and(|n| n.contains(name)))
            .ok_or_else(|| AudioError::NoMidiPort(name.to_string()))?;
        let connection = midi_out
            .connect(&port, "soundflow-out")
            .map_err(|e| AudioError::MidiPort(e.to_string()))?;
        info!("MIDI output '{}' connected", name);
        Ok(Self {
            name: name.to_string(),
            connection: Some(connection),
            scratch: Vec::with_capacity(SYSEX_SCRATCH),
            send_failed: false,
        })
    }

    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            debug!("MIDI output '{}' closed", self.name);
        }
    }

    fn send(&mut self, bytes: &[u8]) {
        let Some(connection) = self.connection.as_mut() else { return };
        if let Err(e) = connection.send(bytes) {
            if !self.send_failed {
                warn!("MIDI output '{}': {}", self.name, e);
                self.send_failed = true;
            }
        }
    }
}

impl MidiDestination for MidiOutputPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_message(&mut self, message: &MidiMessage) {
        let bytes = message.to_bytes();
        self.send(&bytes);
    }

    fn is_physical(&self) -> bool {
        true
    }

    fn process_sysex(&mut self, data: &[u8]) {
        let mut framed = std::mem::take(&mut self.scratch);
        framed.clear();
        framed.push(0xF0);
        framed.extend_from_slice(data);
        framed.push(0xF7);
        self.send(&framed);
        self.scratch = framed;
    }

    fn reset(&mut self) {
        for channel in 0..16 {
            let off = MidiMessage::ControlChange { channel, controller: CC_ALL_NOTES_OFF, value: 0 };
            self.process_message(&off);
        }
    }
}

impl Drop for MidiOutputPort {
    fn drop(&mut self) {
        self.close();
    }
}
