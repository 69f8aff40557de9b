//! File formats for soundflow.
//!
//! Standard MIDI Files are read and written with `midly`, WAV audio with
//! `hound`. Loaded audio becomes an in-memory provider; loaded MIDI becomes
//! sequences, providers, or whole composition tracks.

mod smf;
mod wav;

pub use smf::{
    export_smf, import_smf, provider_from_smf, read_smf, sequence_from_smf, SmfFile, SmfTrack,
};
pub use wav::{
    load_wav, load_wav_file, samples_to_wav, segment_from_wav_file, write_wav, write_wav_file,
};

use std::fmt;

/// Error type for format parsing and encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    InvalidHeader,
    /// Unexpected end of file
    UnexpectedEof,
    /// Unsupported format version, timing mode, or sample layout
    UnsupportedVersion,
    /// Malformed MIDI content
    Midi(String),
    /// Malformed WAV content
    Wav(String),
    /// I/O error
    Io(String),
    /// The caller cancelled the load
    Cancelled,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidHeader => write!(f, "Invalid file header"),
            FormatError::UnexpectedEof => write!(f, "Unexpected end of file"),
            FormatError::UnsupportedVersion => write!(f, "Unsupported format version"),
            FormatError::Midi(msg) => write!(f, "MIDI error: {}", msg),
            FormatError::Wav(msg) => write!(f, "WAV error: {}", msg),
            FormatError::Io(msg) => write!(f, "I/O error: {}", msg),
            FormatError::Cancelled => write!(f, "Load cancelled"),
        }
    }
}

impl std::error::Error for FormatError {}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FormatError::UnexpectedEof,
            _ => FormatError::Io(e.to_string()),
        }
    }
}

impl From<hound::Error> for FormatError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => io.into(),
            hound::Error::FormatError(msg) => FormatError::Wav(msg.to_string()),
            hound::Error::Unsupported => FormatError::UnsupportedVersion,
            other => FormatError::Wav(other.to_string()),
        }
    }
}

impl From<midly::Error> for FormatError {
    fn from(e: midly::Error) -> Self {
        FormatError::Midi(e.to_string())
    }
}
