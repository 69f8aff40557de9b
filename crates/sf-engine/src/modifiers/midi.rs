//! Built-in MIDI modifiers.

use sf_ir::MidiMessage;

use super::{MidiFanOut, MidiModifier, ModifierInfo};

static TRANSPOSE_INFO: ModifierInfo = ModifierInfo { name: "Transpose", short_name: "Trns" };
static VELOCITY_INFO: ModifierInfo = ModifierInfo { name: "Velocity Scale", short_name: "Vel" };
static CHANNEL_INFO: ModifierInfo = ModifierInfo { name: "Channel Filter", short_name: "ChFlt" };
static HARMONIZER_INFO: ModifierInfo = ModifierInfo { name: "Harmonizer", short_name: "Harm" };

fn shift_note(note: u8, semitones: i8) -> Option<u8> {
    let shifted = note as i16 + semitones as i16;
    (0..=127).contains(&shifted).then_some(shifted as u8)
}

/// Shift note and poly-pressure messages by a number of semitones.
/// Notes pushed outside 0..=127 are dropped.
#[derive(Clone, Debug)]
pub struct Transpose {
    semitones: i8,
    enabled: bool,
}

impl Transpose {
    pub fn new(semitones: i8) -> Self {
        Self { semitones, enabled: true }
    }
}

impl MidiModifier for Transpose {
    fn info(&self) -> &ModifierInfo {
        &TRANSPOSE_INFO
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn process(&mut self, message: MidiMessage, out: &mut MidiFanOut) {
        let shifted = match message {
            MidiMessage::NoteOn { channel, note, velocity } => {
                shift_note(note, self.semitones).map(|note| MidiMessage::NoteOn { channel, note, velocity })
            }
            MidiMessage::NoteOff { channel, note, velocity } => {
                shift_note(note, self.semitones).map(|note| MidiMessage::NoteOff { channel, note, velocity })
            }
            MidiMessage::PolyPressure { channel, note, pressure } => shift_note(note, self.semitones)
                .map(|note| MidiMessage::PolyPressure { channel, note, pressure }),
            other => Some(other),
        };
        if let Some(m) = shifted {
            let _ = out.push(m);
        }
    }
}

/// Scale Note-On velocities; results stay in 1..=127.
#[derive(Clone, Debug)]
pub struct VelocityScale {
    factor: f32,
    enabled: bool,
}

impl VelocityScale {
    pub fn new(factor: f32) -> Self {
        Self { factor: factor.max(0.0), enabled: true }
    }
}

impl MidiModifier for VelocityScale {
    fn info(&self) -> &ModifierInfo {
        &VELOCITY_INFO
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn process(&mut self, message: MidiMessage, out: &mut MidiFanOut) {
        let message = match message {
            MidiMessage::NoteOn { channel, note, velocity } if velocity > 0 => {
                let scaled = (velocity as f32 * self.factor).round().clamp(1.0, 127.0) as u8;
                MidiMessage::NoteOn { channel, note, velocity: scaled }
            }
            other => other,
        };
        let _ = out.push(message);
    }
}

/// Pass only messages on the channels in a 16-bit mask.
#[derive(Clone, Debug)]
pub struct ChannelFilter {
    mask: u16,
    enabled: bool,
}

impl ChannelFilter {
    pub fn new(mask: u16) -> Self {
        Self { mask, enabled: true }
    }

    /// Pass a single channel.
    pub fn only(channel: u8) -> Self {
        Self::new(1 << (channel & 0x0F))
    }
}

impl MidiModifier for ChannelFilter {
    fn info(&self) -> &ModifierInfo {
        &CHANNEL_INFO
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn process(&mut self, message: MidiMessage, out: &mut MidiFanOut) {
        if self.mask & (1 << message.channel()) != 0 {
            let _ = out.push(message);
        }
    }
}

/// Emit the original note plus copies at fixed intervals.
#[derive(Clone, Debug)]
pub struct Harmonizer {
    intervals: heapless::Vec<i8, 8>,
    enabled: bool,
}

impl Harmonizer {
    /// Intervals beyond the eighth are ignored.
    pub fn new(intervals: &[i8]) -> Self {
        let mut v = heapless::Vec::new();
        for &i in intervals.iter().take(8) {
            let _ = v.push(i);
        }
        Self { intervals: v, enabled: true }
    }
}

impl MidiModifier for Harmonizer {
    fn info(&self) -> &ModifierInfo {
        &HARMONIZER_INFO
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn process(&mut self, message: MidiMessage, out: &mut MidiFanOut) {
        let _ = out.push(message);
        let (channel, note, velocity, on) = match message {
            MidiMessage::NoteOn { channel, note, velocity } => (channel, note, velocity, true),
            MidiMessage::NoteOff { channel, note, velocity } => (channel, note, velocity, false),
            _ => return,
        };
        for &interval in &self.intervals {
            let Some(note) = shift_note(note, interval) else { continue };
            let extra = if on {
                MidiMessage::NoteOn { channel, note, velocity }
            } else {
                MidiMessage::NoteOff { channel, note, velocity }
            };
            let _ = out.push(extra);
        }
    }
}
