//! Peak and RMS metering.

use std::sync::{Arc, Mutex};

use super::{AudioAnalyzer, ModifierInfo};
use crate::config::MAX_CHANNELS;

static INFO: ModifierInfo = ModifierInfo { name: "Level Meter", short_name: "Meter" };

/// Levels from the most recent analyzed block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LevelReadings {
    pub peak: [f32; MAX_CHANNELS as usize],
    pub rms: [f32; MAX_CHANNELS as usize],
    pub channels: u16,
}

/// Analyzer publishing per-channel peak and RMS to a shared handle.
#[derive(Debug)]
pub struct LevelMeter {
    readings: Arc<Mutex<LevelReadings>>,
    enabled: bool,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self { readings: Arc::new(Mutex::new(LevelReadings::default())), enabled: true }
    }

    /// Handle for reading levels from another thread.
    pub fn handle(&self) -> Arc<Mutex<LevelReadings>> {
        self.readings.clone()
    }

    pub fn readings(&self) -> LevelReadings {
        self.readings.lock().map(|r| *r).unwrap_or_default()
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioAnalyzer for LevelMeter {
    fn info(&self) -> &ModifierInfo {
        &INFO
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn analyze(&mut self, buffer: &[f32], channels: u16) {
        let ch = (channels as usize).clamp(1, MAX_CHANNELS as usize);
        let mut out = LevelReadings { channels: ch as u16, ..Default::default() };
        let mut sum_sq = [0.0f64; MAX_CHANNELS as usize];
        let mut frames = 0usize;

        for frame in buffer.chunks_exact(ch) {
            for (c, &s) in frame.iter().enumerate() {
                out.peak[c] = out.peak[c].max(s.abs());
                sum_sq[c] += (s as f64) * (s as f64);
            }
            frames += 1;
        }
        if frames > 0 {
            for c in 0..ch {
                out.rms[c] = (sum_sq[c] / frames as f64).sqrt() as f32;
            }
        }
        if let Ok(mut r) = self.readings.lock() {
            *r = out;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_peak_and_rms() {
        let mut meter = LevelMeter::new();
        let handle = meter.handle();
        meter.analyze(&[0.5, -1.0, -0.5, 0.0], 2);
        let r = *handle.lock().unwrap();
        assert_eq!(r.channels, 2);
        assert_eq!(r.peak[0], 0.5);
        assert_eq!(r.peak[1], 1.0);
        assert!((r.rms[0] - 0.5).abs() < 1e-6);
        assert!((r.rms[1] - (0.5f32).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn does_not_touch_samples() {
        let mut meter = LevelMeter::new();
        let buf = [0.25f32; 8];
        meter.analyze(&buf, 2);
        assert_eq!(buf, [0.25; 8]);
    }
}
