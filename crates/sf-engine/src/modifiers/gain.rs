//! Constant gain.

use super::{ModifierInfo, SoundModifier};

static INFO: ModifierInfo = ModifierInfo { name: "Gain", short_name: "Gain" };

#[derive(Clone, Debug)]
pub struct GainModifier {
    gain: f32,
    enabled: bool,
}

impl GainModifier {
    pub fn new(gain: f32) -> Self {
        Self { gain, enabled: true }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

impl SoundModifier for GainModifier {
    fn info(&self) -> &ModifierInfo {
        &INFO
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn process(&mut self, buffer: &mut [f32], _channels: u16) {
        for s in buffer.iter_mut() {
            *s *= self.gain;
        }
    }

    fn clone_box(&self) -> Box<dyn SoundModifier> {
        Box::new(self.clone())
    }
}
