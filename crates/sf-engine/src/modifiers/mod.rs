//! Modifier, analyzer and MIDI-modifier chains.
//!
//! Every processor carries an enabled flag; disabled processors are
//! skipped by the chain helpers below.

mod gain;
mod level_meter;
mod low_pass;
mod midi;

pub use gain::GainModifier;
pub use level_meter::{LevelMeter, LevelReadings};
pub use low_pass::OnePoleLowPass;
pub use midi::{ChannelFilter, Harmonizer, Transpose, VelocityScale};

use sf_ir::MidiMessage;

/// Most messages one MIDI modifier stage can emit for a single input.
pub const MAX_FAN_OUT: usize = 16;

/// Output slot for a MIDI modifier stage.
pub type MidiFanOut = heapless::Vec<MidiMessage, MAX_FAN_OUT>;

/// Static metadata about a processor.
#[derive(Debug)]
pub struct ModifierInfo {
    pub name: &'static str,
    pub short_name: &'static str,
}

/// In-place processor for interleaved audio.
pub trait SoundModifier: Send {
    fn info(&self) -> &ModifierInfo;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    /// Called when the output format is known or changes.
    fn init(&mut self, _sample_rate: u32, _channels: u16) {}
    fn process(&mut self, buffer: &mut [f32], channels: u16);
    /// Clear internal state (filter memory etc).
    fn reset(&mut self) {}
    fn clone_box(&self) -> Box<dyn SoundModifier>;
}

impl Clone for Box<dyn SoundModifier> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Read-only observer of interleaved audio.
pub trait AudioAnalyzer: Send {
    fn info(&self) -> &ModifierInfo;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    fn analyze(&mut self, buffer: &[f32], channels: u16);
}

/// Per-message MIDI transform that may emit zero or more messages.
pub trait MidiModifier: Send {
    fn info(&self) -> &ModifierInfo;
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
    fn process(&mut self, message: MidiMessage, out: &mut MidiFanOut);
}

/// Tell every modifier in `chain` the output format.
pub fn init_modifiers(chain: &mut [Box<dyn SoundModifier>], sample_rate: u32, channels: u16) {
    for modifier in chain.iter_mut() {
        modifier.init(sample_rate, channels);
    }
}

/// Clear the running state of every modifier in `chain`.
pub fn reset_modifiers(chain: &mut [Box<dyn SoundModifier>]) {
    for modifier in chain.iter_mut() {
        modifier.reset();
    }
}

/// Run every enabled modifier over `buffer`, in order.
pub fn apply_modifiers(chain: &mut [Box<dyn SoundModifier>], buffer: &mut [f32], channels: u16) {
    for modifier in chain.iter_mut().filter(|m| m.is_enabled()) {
        modifier.process(buffer, channels);
    }
}

/// Run every enabled analyzer over `buffer`.
pub fn apply_analyzers(chain: &mut [Box<dyn AudioAnalyzer>], buffer: &[f32], channels: u16) {
    for analyzer in chain.iter_mut().filter(|a| a.is_enabled()) {
        analyzer.analyze(buffer, channels);
    }
}

/// Push `message` through the enabled MIDI modifiers and hand each
/// resulting message to `emit`. Allocation free.
pub fn apply_midi_modifiers(
    chain: &mut [Box<dyn MidiModifier>],
    message: MidiMessage,
    mut emit: impl FnMut(&MidiMessage),
) {
    let mut current = MidiFanOut::new();
    let mut next = MidiFanOut::new();
    let _ = current.push(message);

    for modifier in chain.iter_mut().filter(|m| m.is_enabled()) {
        next.clear();
        for msg in current.iter() {
            modifier.process(*msg, &mut next);
        }
        core::mem::swap(&mut current, &mut next);
        if current.is_empty() {
            return;
        }
    }
    for msg in current.iter() {
        emit(msg);
    }
}

/// Names accepted by [`create_modifier`].
pub const BUILTIN_MODIFIERS: [&str; 2] = ["Gain", "Low Pass"];

/// Create a built-in sound modifier by name.
pub fn create_modifier(name: &str) -> Option<Box<dyn SoundModifier>> {
    match name {
        "Gain" => Some(Box::new(GainModifier::new(1.0))),
        "Low Pass" => Some(Box::new(OnePoleLowPass::new(low_pass::DEFAULT_CUTOFF_HZ))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(note: u8) -> MidiMessage {
        MidiMessage::NoteOn { channel: 0, note, velocity: 100 }
    }

    #[test]
    fn disabled_modifier_is_skipped() {
        let mut gain = GainModifier::new(0.0);
        gain.set_enabled(false);
        let mut chain: Vec<Box<dyn SoundModifier>> = vec![Box::new(gain)];
        let mut buf = [0.5f32; 4];
        apply_modifiers(&mut chain, &mut buf, 2);
        assert_eq!(buf, [0.5; 4]);
    }

    #[test]
    fn midi_chain_fans_out_then_filters() {
        let mut chain: Vec<Box<dyn MidiModifier>> = vec![
            Box::new(Harmonizer::new(&[12])),
            Box::new(Transpose::new(1)),
        ];
        let mut seen = Vec::new();
        apply_midi_modifiers(&mut chain, note_on(60), |m| seen.push(*m));
        assert_eq!(seen, vec![note_on(61), note_on(73)]);
    }

    #[test]
    fn midi_chain_can_swallow() {
        let mut chain: Vec<Box<dyn MidiModifier>> = vec![Box::new(ChannelFilter::only(5))];
        let mut count = 0;
        apply_midi_modifiers(&mut chain, note_on(60), |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn create_by_name() {
        assert_eq!(create_modifier("Gain").unwrap().info().name, "Gain");
        assert!(create_modifier("Reverb").is_none());
    }

    #[test]
    fn boxed_modifier_clones() {
        let a: Box<dyn SoundModifier> = Box::new(GainModifier::new(0.5));
        let b = a.clone();
        assert_eq!(b.info().name, "Gain");
    }
}
