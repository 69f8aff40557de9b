//! Grid quantization of note timing.

use alloc::vec::Vec;
use uuid::Uuid;

use crate::sequence::MidiNote;

/// Rhythmic grid, expressed relative to a quarter note.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QuantizeGrid {
    Whole,
    Half,
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    HalfTriplet,
    QuarterTriplet,
    EighthTriplet,
    SixteenthTriplet,
}

impl QuantizeGrid {
    /// Grid interval in ticks (possibly fractional for triplets).
    pub fn ticks(self, ticks_per_quarter_note: u16) -> f64 {
        let q = ticks_per_quarter_note as f64;
        let ticks = match self {
            Self::Whole => q * 4.0,
            Self::Half => q * 2.0,
            Self::Quarter => q,
            Self::Eighth => q / 2.0,
            Self::Sixteenth => q / 4.0,
            Self::ThirtySecond => q / 8.0,
            Self::HalfTriplet => q * 4.0 / 3.0,
            Self::QuarterTriplet => q * 2.0 / 3.0,
            Self::EighthTriplet => q / 3.0,
            Self::SixteenthTriplet => q / 6.0,
        };
        ticks.max(1.0)
    }
}

/// Quantizer parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantizeSettings {
    pub grid: QuantizeGrid,
    /// 0.0 leaves notes alone, 1.0 snaps fully
    pub strength: f64,
    /// 0.5 is straight; other values shift odd grid slots
    pub swing: f64,
    /// Also snap note ends
    pub quantize_end: bool,
}

impl Default for QuantizeSettings {
    fn default() -> Self {
        Self { grid: QuantizeGrid::Quarter, strength: 1.0, swing: 0.5, quantize_end: false }
    }
}

/// A proposed change for one note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteQuantization {
    pub note_id: Uuid,
    pub new_start_tick: u64,
    /// `None` when note ends are not quantized
    pub new_duration_ticks: Option<u64>,
}

fn snap(tick: u64, grid: f64, settings: &QuantizeSettings, swing: bool) -> u64 {
    let index = libm::round(tick as f64 / grid);
    let mut target = index * grid;
    if swing && (index as i64) % 2 != 0 {
        target += grid * (settings.swing - 0.5);
    }
    let strength = settings.strength.clamp(0.0, 1.0);
    let moved = tick as f64 + (target - tick as f64) * strength;
    libm::round(moved.max(0.0)) as u64
}

/// Compute quantized positions for `notes` without modifying them.
pub fn quantize<'a, I>(notes: I, ticks_per_quarter_note: u16, settings: &QuantizeSettings) -> Vec<NoteQuantization>
where
    I: IntoIterator<Item = &'a MidiNote>,
{
    let grid = settings.grid.ticks(ticks_per_quarter_note);
    notes
        .into_iter()
        .map(|note| {
            let new_start_tick = snap(note.start_tick, grid, settings, true);
            let new_duration_ticks = settings.quantize_end.then(|| {
                let new_end = snap(note.end_tick(), grid, settings, false);
                new_end.saturating_sub(new_start_tick).max(1)
            });
            NoteQuantization { note_id: note.id, new_start_tick, new_duration_ticks }
        })
        .collect()
}
