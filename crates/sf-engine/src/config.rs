//! Composition configuration.

use crate::error::CompositionError;

/// Largest channel count the mixer handles.
pub const MAX_CHANNELS: u16 = 8;

/// Global format and timing settings for a composition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositionConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub ticks_per_quarter_note: u16,
    pub initial_bpm: f64,
    pub master_volume: f32,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            ticks_per_quarter_note: 480,
            initial_bpm: 120.0,
            master_volume: 1.0,
        }
    }
}

impl CompositionConfig {
    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), CompositionError> {
        if self.sample_rate == 0 {
            return Err(CompositionError::InvalidArgument("sample rate must be positive".into()));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(CompositionError::InvalidArgument(format!(
                "channel count must be in 1..={}, got {}",
                MAX_CHANNELS, self.channels
            )));
        }
        if self.ticks_per_quarter_note == 0 {
            return Err(CompositionError::InvalidArgument(
                "ticks per quarter note must be positive".into(),
            ));
        }
        if !(self.initial_bpm.is_finite() && self.initial_bpm > 0.0) {
            return Err(CompositionError::InvalidArgument(format!(
                "tempo must be positive, got {}",
                self.initial_bpm
            )));
        }
        if !(self.master_volume.is_finite() && self.master_volume >= 0.0) {
            return Err(CompositionError::InvalidArgument("master volume must be non-negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(CompositionConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            CompositionConfig { channels: 0, ..Default::default() },
            CompositionConfig { channels: MAX_CHANNELS + 1, ..Default::default() },
            CompositionConfig { sample_rate: 0, ..Default::default() },
            CompositionConfig { ticks_per_quarter_note: 0, ..Default::default() },
            CompositionConfig { initial_bpm: -1.0, ..Default::default() },
            CompositionConfig { master_volume: f32::NAN, ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(CompositionError::InvalidArgument(_))));
        }
    }
}
