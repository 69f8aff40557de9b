//! Note-to-frequency conversion for the built-in synth.
//!
//! Equal temperament with A4 (note 69) at 440 Hz.

use sf_ir::PITCH_BEND_CENTER;

/// MIDI note number of concert A.
const REFERENCE_NOTE: f32 = 69.0;

/// Frequency of the reference note in Hz.
const REFERENCE_HZ: f32 = 440.0;

/// Default pitch-bend range in semitones (each direction).
pub const DEFAULT_BEND_RANGE: f32 = 2.0;

/// Frequency of a (possibly fractional) note number.
pub fn note_to_hz(note: f32) -> f32 {
    REFERENCE_HZ * 2f32.powf((note - REFERENCE_NOTE) / 12.0)
}

/// Semitone offset for a 14-bit pitch-bend value.
pub fn bend_to_semitones(value: u16, range: f32) -> f32 {
    (value as f32 - PITCH_BEND_CENTER as f32) / PITCH_BEND_CENTER as f32 * range
}

/// Phase increment per sample (in cycles) for `hz` at `sample_rate`.
pub fn phase_increment(hz: f32, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    hz / sample_rate as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_note_is_440() {
        assert!((note_to_hz(69.0) - 440.0).abs() < 1e-3);
    }

    #[test]
    fn octave_doubles() {
        let a = note_to_hz(60.0);
        let b = note_to_hz(72.0);
        assert!((b / a - 2.0).abs() < 1e-5);
    }

    #[test]
    fn semitone_ratio() {
        let ratio = note_to_hz(61.0) / note_to_hz(60.0);
        assert!((ratio - 1.059463).abs() < 1e-5);
    }

    #[test]
    fn bend_range() {
        assert_eq!(bend_to_semitones(PITCH_BEND_CENTER, 2.0), 0.0);
        assert!((bend_to_semitones(0, 2.0) + 2.0).abs() < 1e-6);
        assert!((bend_to_semitones(16383, 2.0) - 2.0).abs() < 1e-3);
    }

    #[test]
    fn increment_at_zero_rate() {
        assert_eq!(phase_increment(440.0, 0), 0.0);
        assert!((phase_increment(441.0, 44100) - 0.01).abs() < 1e-7);
    }
}
