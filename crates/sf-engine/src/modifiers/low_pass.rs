//! One-pole RC low-pass filter.

use std::f32::consts::TAU;

use super::{ModifierInfo, SoundModifier};
use crate::config::MAX_CHANNELS;

pub(crate) const DEFAULT_CUTOFF_HZ: f32 = 4410.0;

static INFO: ModifierInfo = ModifierInfo { name: "Low Pass", short_name: "LPF" };

/// `y = y_prev + alpha * (x - y_prev)`, one state per channel.
#[derive(Clone, Debug)]
pub struct OnePoleLowPass {
    prev: [f32; MAX_CHANNELS as usize],
    alpha: f32,
    cutoff_hz: f32,
    sample_rate: u32,
    enabled: bool,
}

impl OnePoleLowPass {
    pub fn new(cutoff_hz: f32) -> Self {
        let mut filter = Self {
            prev: [0.0; MAX_CHANNELS as usize],
            alpha: 0.0,
            cutoff_hz,
            sample_rate: 44100,
            enabled: true,
        };
        filter.set_cutoff(cutoff_hz);
        filter
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff_hz
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        let nyquist = self.sample_rate as f32 / 2.0;
        self.cutoff_hz = cutoff_hz.clamp(20.0, nyquist.max(20.0));
        self.recompute_alpha();
    }

    fn recompute_alpha(&mut self) {
        self.alpha = (TAU * self.cutoff_hz / self.sample_rate as f32).min(1.0);
    }
}

impl SoundModifier for OnePoleLowPass {
    fn info(&self) -> &ModifierInfo {
        &INFO
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn init(&mut self, sample_rate: u32, _channels: u16) {
        self.sample_rate = sample_rate.max(1);
        self.set_cutoff(self.cutoff_hz);
    }

    fn process(&mut self, buffer: &mut [f32], channels: u16) {
        let channels = (channels as usize).clamp(1, MAX_CHANNELS as usize);
        let alpha = self.alpha;
        for frame in buffer.chunks_exact_mut(channels) {
            for (sample, prev) in frame.iter_mut().zip(self.prev.iter_mut()) {
                *prev += alpha * (*sample - *prev);
                *sample = *prev;
            }
        }
    }

    fn reset(&mut self) {
        self.prev = [0.0; MAX_CHANNELS as usize];
    }

    fn clone_box(&self) -> Box<dyn SoundModifier> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(cutoff: f32, sr: u32) -> OnePoleLowPass {
        let mut f = OnePoleLowPass::new(cutoff);
        f.init(sr, 2);
        f
    }

    #[test]
    fn alpha_at_default_cutoff() {
        let f = filter(DEFAULT_CUTOFF_HZ, 44100);
        let expected = TAU * 4410.0 / 44100.0;
        assert!((f.alpha - expected).abs() < 1e-6);
    }

    #[test]
    fn attenuates_high_frequency_content() {
        let mut f = filter(DEFAULT_CUTOFF_HZ, 44100);
        let mut buf: Vec<f32> = (0..200)
            .flat_map(|i| {
                let v = if i % 2 == 0 { 1.0 } else { -1.0 };
                [v, v]
            })
            .collect();
        f.process(&mut buf, 2);
        let peak: f32 = buf.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!(peak < 0.95, "peak should be attenuated, got {}", peak);
    }

    #[test]
    fn passes_dc() {
        let mut f = filter(DEFAULT_CUTOFF_HZ, 44100);
        let mut buf = vec![0.5f32; 200];
        f.process(&mut buf, 2);
        let last = buf[buf.len() - 2];
        assert!((last - 0.5).abs() < 0.01, "DC should pass through, got {}", last);
    }

    #[test]
    fn reset_clears_state() {
        let mut f = filter(DEFAULT_CUTOFF_HZ, 44100);
        let mut buf = vec![1.0; 20];
        f.process(&mut buf, 2);
        assert!(f.prev[0] != 0.0);
        f.reset();
        assert_eq!(f.prev[0], 0.0);
        assert_eq!(f.prev[1], 0.0);
    }
}
