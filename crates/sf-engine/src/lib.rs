//! Composition engine for soundflow.
//!
//! Owns the editable composition (audio and MIDI tracks, segments,
//! tempo), renders it into interleaved `f32` buffers, and records MIDI
//! input back into it.

mod composition;
mod config;
mod destination;
mod editor;
mod error;
mod event_queue;
mod frequency;
mod midi_segment;
pub mod modifiers;
mod pool;
mod recorder;
mod renderer;
mod segment;
mod synth;
mod track;

pub use composition::{Composition, MappableObject, MappedParameter};
pub use config::{CompositionConfig, MAX_CHANNELS};
pub use destination::{MidiDestination, ReceivedMidi, RecordingDestination};
pub use editor::CompositionEditor;
pub use error::CompositionError;
pub use event_queue::{EventQueue, ScheduledEvent, EVENT_QUEUE_CAPACITY};
pub use frequency::{bend_to_semitones, note_to_hz, phase_increment, DEFAULT_BEND_RANGE};
pub use midi_segment::MidiSegment;
pub use modifiers::{AudioAnalyzer, MidiModifier, SoundModifier};
pub use pool::{BufferPool, PooledBuffer};
pub use recorder::{
    take_to_events, CompositionRecorder, MidiInputCallback, MidiInputDevice, MidiRecorder,
    RecorderState, RecordingMode, RecordingStopped, TimedMessage, VirtualMidiHandle,
    VirtualMidiInput,
};
pub use renderer::{CompositionSource, PlaybackState, Transport, SYNC_PULSES_PER_QUARTER};
pub use segment::{
    share_provider, AudioSegment, AudioSegmentSettings, LoopMode, SharedProvider,
    SEGMENT_CACHE_FRAMES,
};
pub use synth::{ToneSynth, Waveform, MAX_VOICES};
pub use track::{MidiRenderContext, MidiTrack, Track, TrackFlags, TrackSettings};
