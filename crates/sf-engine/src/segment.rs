//! Audio segments: a sound source placed on a track timeline.
//!
//! A segment maps the source range `[source_start, source_start +
//! source_duration)` onto the timeline at `timeline_start`, stretched by
//! the speed factor and optionally looped or reversed. Reads go through a
//! small per-segment cache of source frames so consecutive render calls
//! continue from where the previous one stopped.

use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sf_ir::{SilenceProvider, SoundDataProvider};
use uuid::Uuid;

use crate::config::MAX_CHANNELS;
use crate::modifiers::{apply_modifiers, SoundModifier};

/// A provider shared between segments (and file caches).
pub type SharedProvider = Arc<Mutex<dyn SoundDataProvider>>;

/// Source frames held in a segment's read cache.
pub const SEGMENT_CACHE_FRAMES: usize = 4096;

/// Wrap a provider for sharing.
pub fn share_provider<P: SoundDataProvider + 'static>(provider: P) -> SharedProvider {
    Arc::new(Mutex::new(provider))
}

/// How a segment repeats its source range.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum LoopMode {
    #[default]
    Off,
    /// Play the range this many times in total
    Repetitions(u32),
    /// Repeat until the timeline span reaches this length
    Duration(Duration),
}

/// Per-segment playback settings.
#[derive(Clone)]
pub struct AudioSegmentSettings {
    pub volume: f32,
    /// -1.0 (left) to 1.0 (right)
    pub pan: f32,
    /// Playback rate; 2.0 plays twice as fast
    pub speed: f64,
    pub loop_mode: LoopMode,
    pub reverse: bool,
    pub enabled: bool,
    pub fade_in: Duration,
    pub fade_out: Duration,
    pub modifiers: Vec<Box<dyn SoundModifier>>,
}

impl Default for AudioSegmentSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            speed: 1.0,
            loop_mode: LoopMode::Off,
            reverse: false,
            enabled: true,
            fade_in: Duration::ZERO,
            fade_out: Duration::ZERO,
            modifiers: Vec::new(),
        }
    }
}

impl std::fmt::Debug for AudioSegmentSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSegmentSettings")
            .field("volume", &self.volume)
            .field("pan", &self.pan)
            .field("speed", &self.speed)
            .field("loop_mode", &self.loop_mode)
            .field("reverse", &self.reverse)
            .field("enabled", &self.enabled)
            .field("modifiers", &self.modifiers.len())
            .finish()
    }
}

impl AudioSegmentSettings {
    fn speed(&self) -> f64 {
        if self.speed.is_finite() && self.speed > 0.0 {
            self.speed
        } else {
            1.0
        }
    }
}

/// Format facts about the source, captured when the segment is built.
#[derive(Clone, Copy, Debug)]
struct SourceFormat {
    sample_rate: u32,
    channels: u16,
    /// Total frames, if bounded
    frames: Option<u64>,
}

/// Window of decoded source frames.
#[derive(Debug)]
struct ReadCache {
    samples: Vec<f32>,
    start_frame: u64,
    frames: usize,
}

impl ReadCache {
    fn new(channels: u16) -> Self {
        Self { samples: vec![0.0; SEGMENT_CACHE_FRAMES * channels as usize], start_frame: 0, frames: 0 }
    }

    fn contains(&self, frame: u64) -> bool {
        frame >= self.start_frame && frame < self.start_frame + self.frames as u64
    }

    fn invalidate(&mut self) {
        self.frames = 0;
    }
}

/// A sound source placed on a track.
pub struct AudioSegment {
    id: Uuid,
    pub name: String,
    provider: SharedProvider,
    owns_provider: bool,
    silent: bool,
    format: SourceFormat,
    source_start: Duration,
    source_duration: Duration,
    timeline_start: Duration,
    /// Timeline cut from the front and back since the segment was placed.
    /// Fades and loop phase are measured against the uncut span.
    trimmed_front: Duration,
    trimmed_back: Duration,
    pub settings: AudioSegmentSettings,
    cache: ReadCache,
    disposed: bool,
}

impl std::fmt::Debug for AudioSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSegment")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source_start", &self.source_start)
            .field("source_duration", &self.source_duration)
            .field("timeline_start", &self.timeline_start)
            .field("owns_provider", &self.owns_provider)
            .finish()
    }
}

impl AudioSegment {
    /// Place `[source_start, source_start + source_duration)` of `provider`
    /// at `timeline_start`. The source duration is clamped to what the
    /// provider holds.
    pub fn new(
        name: &str,
        provider: SharedProvider,
        source_start: Duration,
        source_duration: Duration,
        timeline_start: Duration,
        owns_provider: bool,
    ) -> Self {
        let format = match provider.lock() {
            Ok(p) => {
                let channels = p.channels().max(1);
                SourceFormat {
                    sample_rate: p.sample_rate().max(1),
                    channels,
                    frames: p.length().map(|len| len / channels as u64),
                }
            }
            Err(_) => SourceFormat { sample_rate: 1, channels: 1, frames: Some(0) },
        };
        let mut source_duration = source_duration;
        if let Some(frames) = format.frames {
            let total = frames_duration(frames, format.sample_rate);
            let available = total.saturating_sub(source_start);
            source_duration = source_duration.min(available);
        }

        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            provider,
            owns_provider,
            silent: false,
            format,
            source_start,
            source_duration,
            timeline_start,
            trimmed_front: Duration::ZERO,
            trimmed_back: Duration::ZERO,
            settings: AudioSegmentSettings::default(),
            cache: ReadCache::new(format.channels),
            disposed: false,
        }
    }

    /// Place the whole provider at `timeline_start`.
    pub fn from_provider(name: &str, provider: SharedProvider, timeline_start: Duration, owns_provider: bool) -> Self {
        Self::new(name, provider, Duration::ZERO, Duration::MAX, timeline_start, owns_provider)
    }

    /// An explicit silent region.
    pub fn silence(timeline_start: Duration, duration: Duration, channels: u16, sample_rate: u32) -> Self {
        let provider = share_provider(SilenceProvider::endless(channels, sample_rate));
        let mut segment = Self::new("Silence", provider, Duration::ZERO, duration, timeline_start, true);
        segment.silent = true;
        segment
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_silence(&self) -> bool {
        self.silent
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn owns_provider(&self) -> bool {
        self.owns_provider
    }

    pub fn source_start(&self) -> Duration {
        self.source_start
    }

    pub fn source_duration(&self) -> Duration {
        self.source_duration
    }

    pub fn timeline_start(&self) -> Duration {
        self.timeline_start
    }

    pub fn set_timeline_start(&mut self, start: Duration) {
        self.timeline_start = start;
        self.cache.invalidate();
    }

    /// Choose a new source range. Earlier cuts are forgotten.
    pub fn set_source_range(&mut self, start: Duration, duration: Duration) {
        self.source_start = start;
        self.source_duration = duration;
        self.trimmed_front = Duration::ZERO;
        self.trimmed_back = Duration::ZERO;
        self.cache.invalidate();
    }

    /// Timeline length of one pass through the source range.
    pub fn pass_duration(&self) -> Duration {
        scale(self.source_duration, 1.0 / self.settings.speed())
    }

    /// Timeline length including looping.
    pub fn timeline_duration(&self) -> Duration {
        match self.settings.loop_mode {
            LoopMode::Off => self.pass_duration(),
            LoopMode::Repetitions(n) => self.pass_duration() * n.max(1),
            LoopMode::Duration(d) => d,
        }
    }

    pub fn timeline_end(&self) -> Duration {
        self.timeline_start + self.timeline_duration()
    }

    /// Shorten (or lengthen) the timeline span, keeping the start.
    pub fn set_timeline_duration(&mut self, duration: Duration) {
        let current = self.timeline_duration();
        match self.settings.loop_mode {
            LoopMode::Off => {
                let source = scale(duration, self.settings.speed());
                // Reversed playback ends on the low part of the source.
                if self.settings.reverse {
                    if source <= self.source_duration {
                        self.source_start += self.source_duration - source;
                    } else {
                        self.source_start = self.source_start.saturating_sub(source - self.source_duration);
                    }
                }
                self.source_duration = source;
            }
            _ => self.settings.loop_mode = LoopMode::Duration(duration),
        }
        if duration < current {
            self.trimmed_back += current - duration;
        } else {
            self.trimmed_back = self.trimmed_back.saturating_sub(duration - current);
        }
        self.cache.invalidate();
    }

    /// Drop `amount` of timeline from the front. Returns false (and leaves
    /// the segment untouched) if nothing would remain.
    pub fn trim_start(&mut self, amount: Duration) -> bool {
        if amount >= self.timeline_duration() {
            return false;
        }
        match self.settings.loop_mode {
            LoopMode::Off => {
                let source_advance = scale(amount, self.settings.speed());
                if source_advance >= self.source_duration {
                    return false;
                }
                self.drop_played_source(source_advance);
            }
            _ => {
                let remaining = self.timeline_duration() - amount;
                self.settings.loop_mode = LoopMode::Duration(remaining);
            }
        }
        self.timeline_start += amount;
        self.trimmed_front += amount;
        self.cache.invalidate();
        true
    }

    /// Remove the first `amount` of source in playback order.
    fn drop_played_source(&mut self, amount: Duration) {
        if !self.settings.reverse {
            self.source_start += amount;
        }
        self.source_duration = self.source_duration.saturating_sub(amount);
    }

    /// A new segment covering this one's timeline from `at` onward.
    ///
    /// Unlooped, the source offset advances by `(at - timeline_start) *
    /// speed` in playback order; looped, the fragment keeps the loop phase.
    /// Settings (including speed) are inherited. The fragment shares the
    /// provider and inherits ownership of it.
    pub fn fragment_from(&self, at: Duration) -> Option<AudioSegment> {
        if at <= self.timeline_start || at >= self.timeline_end() {
            return None;
        }
        let offset = at - self.timeline_start;
        let mut fragment = AudioSegment {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            provider: self.provider.clone(),
            owns_provider: self.owns_provider,
            silent: self.silent,
            format: self.format,
            source_start: self.source_start,
            source_duration: self.source_duration,
            timeline_start: at,
            trimmed_front: self.trimmed_front + offset,
            trimmed_back: self.trimmed_back,
            settings: self.settings.clone(),
            cache: ReadCache::new(self.format.channels),
            disposed: false,
        };
        match self.settings.loop_mode {
            LoopMode::Off => fragment.drop_played_source(scale(offset, self.settings.speed())),
            _ => fragment.settings.loop_mode = LoopMode::Duration(self.timeline_duration() - offset),
        }
        Some(fragment)
    }

    /// Drop cached source frames; the next read seeks the provider.
    pub fn invalidate_cache(&mut self) {
        self.cache.invalidate();
    }

    /// Release the provider if this segment owns it and is its last user.
    /// Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.cache.invalidate();
        if self.owns_provider && Arc::strong_count(&self.provider) == 1 {
            if let Ok(mut p) = self.provider.lock() {
                p.dispose();
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Make sure `frame` (and, if present, `frame + 1`) are cached.
    fn fill_cache(&mut self, frame: u64, backwards: bool) {
        if self.cache.contains(frame) && (self.cache.contains(frame + 1) || self.is_last_frame(frame)) {
            return;
        }
        let channels = self.format.channels as u64;
        let start = if backwards {
            frame.saturating_sub(SEGMENT_CACHE_FRAMES as u64 - 2)
        } else {
            frame
        };
        self.cache.start_frame = start;
        self.cache.frames = 0;
        let Ok(mut provider) = self.provider.lock() else { return };
        if provider.seek(start * channels).is_err() {
            return;
        }
        let read = provider.read(&mut self.cache.samples);
        self.cache.frames = read / channels as usize;
    }

    fn is_last_frame(&self, frame: u64) -> bool {
        self.format.frames.is_some_and(|f| frame + 1 >= f)
    }

    /// Interleaved source sample at a fractional source frame, linear
    /// interpolation between neighbours; channel is mapped to the source.
    fn sample_at(&self, frame: u64, frac: f32, channel: usize, out_channels: usize) -> f32 {
        let src_channels = self.format.channels as usize;
        let src_ch = if src_channels == out_channels {
            channel
        } else if src_channels == 1 {
            0
        } else {
            channel % src_channels
        };
        let get = |f: u64| -> f32 {
            if !self.cache.contains(f) {
                return 0.0;
            }
            let idx = (f - self.cache.start_frame) as usize * src_channels + src_ch;
            self.cache.samples[idx]
        };
        let a = get(frame);
        if frac <= 0.0 {
            return a;
        }
        let b = if self.cache.contains(frame + 1) { get(frame + 1) } else { a };
        a + (b - a) * frac
    }

    /// Gain from fade-in / fade-out at `local` seconds into the segment.
    fn fade_gain(&self, local: f64, span: f64) -> f32 {
        let mut gain = 1.0;
        let fade_in = self.settings.fade_in.as_secs_f64();
        if fade_in > 0.0 && local < fade_in {
            gain *= local / fade_in;
        }
        let fade_out = self.settings.fade_out.as_secs_f64();
        let remaining = span - local;
        if fade_out > 0.0 && remaining < fade_out {
            gain *= (remaining / fade_out).max(0.0);
        }
        gain as f32
    }

    /// Overwrite `out` with this segment's contribution to the window that
    /// starts at output frame `window_start`. Frames outside the segment's
    /// span are left untouched. Returns the range of frames written.
    pub fn render(&mut self, window_start: u64, out: &mut [f32], channels: u16, sample_rate: u32) -> Range<usize> {
        if !self.settings.enabled || self.disposed || sample_rate == 0 {
            return 0..0;
        }
        let out_channels = (channels as usize).clamp(1, MAX_CHANNELS as usize);
        let frames = out.len() / out_channels;
        let rate = sample_rate as f64;

        let seg_start = (self.timeline_start.as_secs_f64() * rate).round() as u64;
        let seg_end = (self.timeline_end().as_secs_f64() * rate).round() as u64;
        let window_end = window_start + frames as u64;
        if seg_end <= window_start || seg_start >= window_end || seg_end <= seg_start {
            return 0..0;
        }
        let first = seg_start.saturating_sub(window_start) as usize;
        let last = (seg_end.min(window_end) - window_start) as usize;

        if self.silent {
            out[first * out_channels..last * out_channels].fill(0.0);
            return first..last;
        }

        let speed = self.settings.speed();
        let ratio = speed * self.format.sample_rate as f64 / rate;
        let src_first = (self.source_start.as_secs_f64() * self.format.sample_rate as f64).round() as u64;
        let src_frames = (self.source_duration.as_secs_f64() * self.format.sample_rate as f64).round() as u64;
        if src_frames == 0 {
            return 0..0;
        }
        let pass_frames = src_frames as f64 / ratio;
        let front_secs = self.trimmed_front.as_secs_f64();
        let span_secs = (seg_end - seg_start) as f64 / rate + front_secs + self.trimmed_back.as_secs_f64();
        let phase = match self.settings.loop_mode {
            LoopMode::Off => 0.0,
            _ => (front_secs * rate).round(),
        };

        let (left_gain, right_gain) = pan_gains(self.settings.pan);
        let volume = self.settings.volume;
        let reverse = self.settings.reverse;

        for i in first..last {
            let local = (window_start + i as u64 - seg_start) as f64;
            let pos = local + phase;
            let in_pass = if pos >= pass_frames { pos % pass_frames } else { pos };
            let mut offset = in_pass * ratio;
            if reverse {
                offset = (src_frames as f64 - 1.0 - offset).max(0.0);
            }
            let offset = offset.min(src_frames as f64 - 1.0);
            let whole = offset.floor();
            let frac = (offset - whole) as f32;
            let frame = src_first + whole as u64;

            self.fill_cache(frame, reverse);
            let gain = volume * self.fade_gain(local / rate + front_secs, span_secs);
            let dst = &mut out[i * out_channels..(i + 1) * out_channels];
            for (c, sample) in dst.iter_mut().enumerate() {
                let pan = match (out_channels, c) {
                    (2, 0) => left_gain,
                    (2, 1) => right_gain,
                    _ => 1.0,
                };
                *sample = self.sample_at(frame, frac, c, out_channels) * gain * pan;
            }
        }

        if !self.settings.modifiers.is_empty() {
            let region = &mut out[first * out_channels..last * out_channels];
            apply_modifiers(&mut self.settings.modifiers, region, channels);
        }
        first..last
    }
}

impl Drop for AudioSegment {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// `d * factor`; exact when the factor is one.
fn scale(d: Duration, factor: f64) -> Duration {
    if factor == 1.0 {
        d
    } else {
        sf_ir::time_convert::secs_clamped(d.as_secs_f64() * factor)
    }
}

/// Exact length of `frames` at `sample_rate`, to the nanosecond.
fn frames_duration(frames: u64, sample_rate: u32) -> Duration {
    let nanos = frames as u128 * 1_000_000_000 / sample_rate.max(1) as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Linear balance: centre leaves both sides at unity.
pub(crate) fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_ir::RawDataProvider;

    const SR: u32 = 1000;

    fn ramp_segment(frames: usize, start: Duration) -> AudioSegment {
        let samples: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        let provider = share_provider(RawDataProvider::new(samples, 1, SR));
        AudioSegment::from_provider("ramp", provider, start, true)
    }

    fn copy_of(seg: &AudioSegment) -> AudioSegment {
        AudioSegment {
            id: Uuid::new_v4(),
            name: seg.name.clone(),
            provider: seg.provider.clone(),
            owns_provider: false,
            silent: seg.silent,
            format: seg.format,
            source_start: seg.source_start,
            source_duration: seg.source_duration,
            timeline_start: seg.timeline_start,
            trimmed_front: seg.trimmed_front,
            trimmed_back: seg.trimmed_back,
            settings: seg.settings.clone(),
            cache: ReadCache::new(seg.format.channels),
            disposed: false,
        }
    }

    fn render(seg: &mut AudioSegment, window_start: u64, frames: usize) -> Vec<f32> {
        let mut out = vec![-9.0f32; frames];
        seg.render(window_start, &mut out, 1, SR);
        out
    }

    #[test]
    fn places_source_on_timeline() {
        let mut seg = ramp_segment(100, Duration::from_millis(10));
        assert_eq!(seg.timeline_end(), Duration::from_millis(110));
        let out = render(&mut seg, 0, 20);
        assert_eq!(out[9], -9.0);
        assert_eq!(out[10], 0.0);
        assert!((out[19] - 0.09).abs() < 1e-6);
    }

    #[test]
    fn consecutive_windows_are_continuous() {
        let mut seg = ramp_segment(100, Duration::ZERO);
        let a = render(&mut seg, 0, 50);
        let b = render(&mut seg, 50, 50);
        let whole = render(&mut ramp_segment(100, Duration::ZERO), 0, 100);
        assert_eq!([a, b].concat(), whole);
    }

    #[test]
    fn double_speed_halves_span() {
        let mut seg = ramp_segment(100, Duration::ZERO);
        seg.settings.speed = 2.0;
        assert_eq!(seg.timeline_end(), Duration::from_millis(50));
        let out = render(&mut seg, 0, 60);
        assert!((out[10] - 0.2).abs() < 1e-6);
        assert_eq!(out[55], -9.0);
    }

    #[test]
    fn repetitions_loop_source() {
        let mut seg = ramp_segment(10, Duration::ZERO);
        seg.settings.loop_mode = LoopMode::Repetitions(3);
        let out = render(&mut seg, 0, 30);
        assert_eq!(out[0], out[10]);
        assert_eq!(out[3], out[23]);
    }

    #[test]
    fn reverse_plays_backwards() {
        let mut seg = ramp_segment(10, Duration::ZERO);
        seg.settings.reverse = true;
        let out = render(&mut seg, 0, 10);
        assert!((out[0] - 0.9).abs() < 1e-6);
        assert_eq!(out[9], 0.0);
    }

    #[test]
    fn stereo_pan_and_mono_source() {
        let provider = share_provider(RawDataProvider::constant(0.5, 10, 1, SR));
        let mut seg = AudioSegment::from_provider("c", provider, Duration::ZERO, true);
        seg.settings.pan = 1.0;
        let mut out = vec![0.0f32; 20];
        seg.render(0, &mut out, 2, SR);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.5);
    }

    #[test]
    fn fragment_advances_source() {
        let seg = ramp_segment(100, Duration::from_millis(100));
        let frag = seg.fragment_from(Duration::from_millis(150)).unwrap();
        assert_eq!(frag.timeline_start(), Duration::from_millis(150));
        assert_eq!(frag.source_start(), Duration::from_millis(50));
        assert_eq!(frag.timeline_end(), seg.timeline_end());
        assert!(seg.fragment_from(Duration::from_millis(100)).is_none());
    }

    /// Render `seg` cut at `at` into a truncated head and a fragment.
    fn render_split(seg: &AudioSegment, at: Duration, frames: usize) -> Vec<f32> {
        let mut tail = seg.fragment_from(at).unwrap();
        let mut head = copy_of(seg);
        head.set_timeline_duration(at - seg.timeline_start());
        let mut out = vec![-9.0f32; frames];
        head.render(0, &mut out, 1, SR);
        tail.render(0, &mut out, 1, SR);
        out
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).abs() < 1e-5, "frame {}: {} != {}", i, x, y);
        }
    }

    #[test]
    fn reversed_split_keeps_samples() {
        let mut seg = ramp_segment(100, Duration::ZERO);
        seg.settings.reverse = true;
        let whole = render(&mut seg, 0, 100);
        let split = render_split(&seg, Duration::from_millis(30), 100);
        assert_close(&split, &whole);

        let frag = seg.fragment_from(Duration::from_millis(30)).unwrap();
        assert_eq!(frag.source_start(), Duration::ZERO);
        assert_eq!(frag.source_duration(), Duration::from_millis(70));
    }

    #[test]
    fn looped_split_keeps_phase() {
        let mut seg = ramp_segment(10, Duration::ZERO);
        seg.settings.loop_mode = LoopMode::Repetitions(4);
        let whole = render(&mut seg, 0, 40);
        let split = render_split(&seg, Duration::from_millis(13), 40);
        assert_close(&split, &whole);

        seg.settings.reverse = true;
        let whole = render(&mut seg, 0, 40);
        let split = render_split(&seg, Duration::from_millis(27), 40);
        assert_close(&split, &whole);
    }

    #[test]
    fn cut_edges_keep_original_fades() {
        let mut seg = ramp_segment(100, Duration::ZERO);
        seg.settings.fade_in = Duration::from_millis(20);
        seg.settings.fade_out = Duration::from_millis(20);
        let whole = render(&mut seg, 0, 100);
        let split = render_split(&seg, Duration::from_millis(50), 100);
        assert_close(&split, &whole);

        let mut trimmed = copy_of(&seg);
        assert!(trimmed.trim_start(Duration::from_millis(10)));
        let out = render(&mut trimmed, 0, 100);
        assert_close(&out[10..], &whole[10..]);
    }

    #[test]
    fn trim_start_collapses() {
        let mut seg = ramp_segment(100, Duration::ZERO);
        assert!(!seg.trim_start(Duration::from_millis(100)));
        assert!(seg.trim_start(Duration::from_millis(40)));
        assert_eq!(seg.timeline_start(), Duration::from_millis(40));
        assert_eq!(seg.source_duration(), Duration::from_millis(60));
    }

    #[test]
    fn shared_provider_survives_fragment_dispose() {
        let mut seg = ramp_segment(100, Duration::ZERO);
        let mut frag = seg.fragment_from(Duration::from_millis(50)).unwrap();
        frag.dispose();
        frag.dispose();
        let out = render(&mut seg, 0, 10);
        assert!((out[5] - 0.05).abs() < 1e-6);
    }

    #[test]
    fn silence_writes_zeros() {
        let mut seg = AudioSegment::silence(Duration::from_millis(5), Duration::from_millis(5), 1, SR);
        let out = render(&mut seg, 0, 12);
        assert_eq!(out[4], -9.0);
        assert!(out[5..10].iter().all(|&s| s == 0.0));
        assert_eq!(out[10], -9.0);
    }
}
