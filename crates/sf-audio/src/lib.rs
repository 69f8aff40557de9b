//! Audio output and MIDI device backends for soundflow.

mod cpal_backend;
mod midi;
mod traits;

pub use cpal_backend::{list_output_devices, CpalOutput, OutputDeviceInfo, RING_MILLIS};
pub use midi::{list_midi_inputs, list_midi_outputs, MidiInputPort, MidiOutputPort};
pub use traits::{AudioError, AudioOutput};
