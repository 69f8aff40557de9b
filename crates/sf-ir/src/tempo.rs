//! Tempo map: a time-ordered list of BPM change points.

use alloc::vec;
use alloc::vec::Vec;
use core::time::Duration;

/// Tempo used when nothing else is specified.
pub const DEFAULT_BPM: f64 = 120.0;

/// 120 BPM expressed as microseconds per quarter note.
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// A tempo change at a wall-clock position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoMarker {
    /// Position on the timeline
    pub time: Duration,
    /// Tempo from this point until the next marker
    pub beats_per_minute: f64,
}

impl TempoMarker {
    pub const fn new(time: Duration, beats_per_minute: f64) -> Self {
        Self { time, beats_per_minute }
    }

    /// Length of one quarter note in microseconds.
    pub fn micros_per_quarter(&self) -> f64 {
        bpm_to_micros_per_quarter(self.beats_per_minute)
    }
}

/// Convert BPM to microseconds per quarter note.
pub fn bpm_to_micros_per_quarter(bpm: f64) -> f64 {
    60_000_000.0 / bpm
}

/// Convert microseconds per quarter note to BPM.
pub fn micros_per_quarter_to_bpm(micros: u32) -> f64 {
    if micros == 0 {
        return DEFAULT_BPM;
    }
    60_000_000.0 / micros as f64
}

fn valid_bpm(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

/// Piecewise-constant tempo timeline.
///
/// Always holds a marker at time zero. Markers are strictly increasing in
/// time; setting a marker at an existing time replaces it.
#[derive(Clone, Debug, PartialEq)]
pub struct TempoTrack {
    markers: Vec<TempoMarker>,
}

impl Default for TempoTrack {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl TempoTrack {
    /// A constant-tempo track. Invalid BPM values fall back to the default.
    pub fn new(beats_per_minute: f64) -> Self {
        let bpm = if valid_bpm(beats_per_minute) { beats_per_minute } else { DEFAULT_BPM };
        Self {
            markers: vec![TempoMarker::new(Duration::ZERO, bpm)],
        }
    }

    /// Build a track from arbitrary markers.
    ///
    /// Markers are sorted; duplicates at the same time keep the last one;
    /// a default marker is inserted at zero if none was given there.
    pub fn from_markers(markers: impl IntoIterator<Item = TempoMarker>) -> Self {
        let mut track = Self { markers: Vec::new() };
        for marker in markers {
            track.set_marker(marker.time, marker.beats_per_minute);
        }
        if track.markers.first().map_or(true, |m| m.time != Duration::ZERO) {
            track.markers.insert(0, TempoMarker::new(Duration::ZERO, DEFAULT_BPM));
        }
        track
    }

    pub fn markers(&self) -> &[TempoMarker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Never true; the zero marker is always present.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Insert or replace the marker at `time`. Returns false for a non-positive
    /// or non-finite BPM.
    pub fn set_marker(&mut self, time: Duration, beats_per_minute: f64) -> bool {
        if !valid_bpm(beats_per_minute) {
            return false;
        }
        match self.markers.binary_search_by(|m| m.time.cmp(&time)) {
            Ok(idx) => self.markers[idx].beats_per_minute = beats_per_minute,
            Err(idx) => self.markers.insert(idx, TempoMarker::new(time, beats_per_minute)),
        }
        true
    }

    /// Remove the marker at exactly `time`. The zero marker cannot be removed.
    pub fn remove_marker(&mut self, time: Duration) -> bool {
        if time == Duration::ZERO {
            return false;
        }
        match self.markers.binary_search_by(|m| m.time.cmp(&time)) {
            Ok(idx) => {
                self.markers.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    /// Drop every marker except the one at zero.
    pub fn clear(&mut self) {
        self.markers.truncate(1);
    }

    /// Tempo in effect at `time`.
    pub fn bpm_at(&self, time: Duration) -> f64 {
        let idx = self.markers.partition_point(|m| m.time <= time);
        self.markers[idx.saturating_sub(1)].beats_per_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn new_has_zero_marker() {
        let track = TempoTrack::new(90.0);
        assert_eq!(track.len(), 1);
        assert_eq!(track.markers()[0].time, Duration::ZERO);
        assert_eq!(track.markers()[0].beats_per_minute, 90.0);
    }

    #[test]
    fn invalid_bpm_falls_back_to_default() {
        let track = TempoTrack::new(0.0);
        assert_eq!(track.markers()[0].beats_per_minute, DEFAULT_BPM);
    }

    #[test]
    fn set_marker_keeps_order() {
        let mut track = TempoTrack::new(120.0);
        track.set_marker(secs(4.0), 140.0);
        track.set_marker(secs(2.0), 100.0);
        let times: Vec<f64> = track.markers().iter().map(|m| m.time.as_secs_f64()).collect();
        assert_eq!(times, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn set_marker_replaces_same_time() {
        let mut track = TempoTrack::new(120.0);
        track.set_marker(secs(2.0), 100.0);
        track.set_marker(secs(2.0), 150.0);
        assert_eq!(track.len(), 2);
        assert_eq!(track.markers()[1].beats_per_minute, 150.0);
    }

    #[test]
    fn zero_marker_cannot_be_removed() {
        let mut track = TempoTrack::new(120.0);
        assert!(!track.remove_marker(Duration::ZERO));
        track.set_marker(secs(1.0), 60.0);
        assert!(track.remove_marker(secs(1.0)));
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn bpm_at_picks_active_segment() {
        let mut track = TempoTrack::new(120.0);
        track.set_marker(secs(2.0), 60.0);
        assert_eq!(track.bpm_at(secs(1.999)), 120.0);
        assert_eq!(track.bpm_at(secs(2.0)), 60.0);
        assert_eq!(track.bpm_at(secs(100.0)), 60.0);
    }

    #[test]
    fn from_markers_inserts_zero_and_dedups() {
        let track = TempoTrack::from_markers([
            TempoMarker::new(secs(3.0), 90.0),
            TempoMarker::new(secs(3.0), 95.0),
        ]);
        assert_eq!(track.len(), 2);
        assert_eq!(track.markers()[0].beats_per_minute, DEFAULT_BPM);
        assert_eq!(track.markers()[1].beats_per_minute, 95.0);
    }

    #[test]
    fn micros_conversion() {
        assert_eq!(bpm_to_micros_per_quarter(120.0), 500_000.0);
        assert_eq!(micros_per_quarter_to_bpm(DEFAULT_MICROS_PER_QUARTER), 120.0);
    }
}
