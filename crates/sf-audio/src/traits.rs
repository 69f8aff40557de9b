//! Output trait and device errors.

use sf_engine::CompositionError;

/// Audio or MIDI device failure.
#[derive(Debug)]
pub enum AudioError {
    /// The host has no default output device
    NoDevice,
    /// No output device name contains the requested text
    DeviceNotFound(String),
    /// The device's native sample format has no conversion
    UnsupportedFormat(String),
    DeviceInit(String),
    StreamCreate(String),
    Playback(String),
    MidiInit(String),
    MidiPort(String),
    /// No MIDI port name contains the requested text
    NoMidiPort(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoDevice => write!(f, "no audio output device"),
            AudioError::DeviceNotFound(name) => write!(f, "no audio output matching '{}'", name),
            AudioError::UnsupportedFormat(format) => write!(f, "unsupported device sample format {}", format),
            AudioError::DeviceInit(msg) => write!(f, "audio device: {}", msg),
            AudioError::StreamCreate(msg) => write!(f, "audio stream: {}", msg),
            AudioError::Playback(msg) => write!(f, "playback: {}", msg),
            AudioError::MidiInit(msg) => write!(f, "MIDI client: {}", msg),
            AudioError::MidiPort(msg) => write!(f, "MIDI port: {}", msg),
            AudioError::NoMidiPort(name) => write!(f, "no MIDI port matching '{}'", name),
        }
    }
}

impl std::error::Error for AudioError {}

impl From<AudioError> for CompositionError {
    fn from(e: AudioError) -> Self {
        CompositionError::Device(e.to_string())
    }
}

/// A sink for interleaved composition output.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// True between `start` and `stop`.
    fn is_running(&self) -> bool;

    /// Queue interleaved samples, waiting for room while running. Returns
    /// how many were queued; fewer than given only if the output stopped.
    fn write(&mut self, samples: &[f32]) -> usize;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_map_to_composition_errors() {
        let e: CompositionError = AudioError::NoMidiPort("Launchkey".into()).into();
        assert_eq!(e, CompositionError::Device("no MIDI port matching 'Launchkey'".into()));
    }
}
