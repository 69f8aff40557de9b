//! Error type for composition operations.

use uuid::Uuid;

/// Error type for composition construction and lookups.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionError {
    /// A construction argument was out of range
    InvalidArgument(String),
    /// No audio or MIDI track with this id
    UnknownTrack(Uuid),
    /// No segment with this id on the given track
    UnknownSegment(Uuid),
    /// A MIDI or audio device failed
    Device(String),
}

impl std::fmt::Display for CompositionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompositionError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CompositionError::UnknownTrack(id) => write!(f, "Unknown track: {}", id),
            CompositionError::UnknownSegment(id) => write!(f, "Unknown segment: {}", id),
            CompositionError::Device(msg) => write!(f, "Device error: {}", msg),
        }
    }
}

impl std::error::Error for CompositionError {}
