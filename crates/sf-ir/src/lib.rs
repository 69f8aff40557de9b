//! Core composition model types for soundflow.
//!
//! This crate holds the data that the engine renders and the editor
//! mutates: tempo maps and tick/time conversion, MIDI events and
//! sequences, the playback-side MIDI provider, quantization, and the
//! sound-data provider contract.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod data_provider;
mod edit;
mod event;
mod pairing;
mod providers;
mod quantize;
mod sequence;
mod sound;
mod tempo;
pub mod time_convert;

pub use data_provider::{MidiDataProvider, TickTempo};
pub use edit::{ControlPointEdit, NoteEdit};
pub use event::{sort_events, EventKind, MetaEvent, MidiEvent, MidiMessage, PITCH_BEND_CENTER, PITCH_BEND_MAX};
pub use pairing::{pair_notes, NotePairer, PairedNote};
pub use providers::{RawDataProvider, SilenceProvider};
pub use quantize::{quantize, NoteQuantization, QuantizeGrid, QuantizeSettings};
pub use sequence::{ControlPoint, MidiNote, MidiSequence, PITCH_BEND_CONTROLLER};
pub use sound::{
    ObserverId, ProviderError, ProviderEvent, ProviderObserver, ProviderObservers, SampleFormat,
    SoundDataProvider,
};
pub use tempo::{
    bpm_to_micros_per_quarter, micros_per_quarter_to_bpm, TempoMarker, TempoTrack, DEFAULT_BPM,
    DEFAULT_MICROS_PER_QUARTER,
};
pub use time_convert::{frames_to_time, tick_to_time, time_to_frames, time_to_tick};

pub use uuid::Uuid;
