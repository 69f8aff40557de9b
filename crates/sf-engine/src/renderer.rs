//! Mixing and transport.
//!
//! [`Composition::render`] mixes an arbitrary window without depending on
//! earlier calls. [`Composition::read_samples`] is the streaming front
//! door: it keeps a cursor, follows the loop range and reports position
//! and end-of-stream to observers. [`CompositionSource`] exposes a shared
//! composition as a sound-data provider so it can be nested in another mix.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sf_ir::{
    frames_to_time, time_to_frames, ObserverId, ProviderError, ProviderEvent, ProviderObserver, SoundDataProvider,
};

use crate::composition::Composition;
use crate::modifiers::{apply_analyzers, apply_modifiers, reset_modifiers};
use crate::track::{any_soloed, should_play, MidiRenderContext};

/// MIDI clock pulses per quarter note.
pub const SYNC_PULSES_PER_QUARTER: u32 = 24;

/// Internal playback state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

/// Cursor, loop range and clock source of a composition.
#[derive(Clone, Debug, Default)]
pub struct Transport {
    state: PlaybackState,
    /// Next frame `read_samples` renders
    cursor: u64,
    /// `[start, end)` in frames
    loop_range: Option<(u64, u64)>,
    sync_driven: bool,
    /// Fractional frames owed by the external clock
    sync_remainder: f64,
    needs_synth_reset: bool,
}

impl Transport {
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn loop_range(&self) -> Option<(u64, u64)> {
        self.loop_range
    }

    pub fn is_sync_driven(&self) -> bool {
        self.sync_driven
    }

    pub fn needs_synth_reset(&self) -> bool {
        self.needs_synth_reset
    }
}

impl Composition {
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Mix `duration` starting at `start` into `out`. Returns samples
    /// written (interleaved), clamped to the buffer.
    pub fn render(&mut self, start: Duration, duration: Duration, out: &mut [f32]) -> usize {
        let rate = self.config().sample_rate;
        let frames = time_to_frames(duration, rate) as usize;
        self.render_frames(time_to_frames(start, rate), frames, out)
    }

    /// Mix `frames` frames starting at frame `start_frame`.
    pub fn render_frames(&mut self, start_frame: u64, frames: usize, out: &mut [f32]) -> usize {
        let sample_rate = self.config().sample_rate;
        let channels = self.config().channels;
        let ch = channels as usize;
        let window_start = frames_to_time(start_frame, sample_rate);

        self.recorder.check_punch(window_start);
        if self.has_finished_recordings() {
            self.process_finished_recordings();
        }
        if self.transport.needs_synth_reset {
            for track in &mut self.midi_tracks {
                track.reset_target();
                track.settings.reset_modifiers();
            }
            for track in &mut self.tracks {
                track.reset_modifiers();
            }
            reset_modifiers(&mut self.master_modifiers);
            self.transport.needs_synth_reset = false;
        }

        let samples = (frames * ch).min(out.len() / ch * ch);
        let out = &mut out[..samples];
        out.fill(0.0);
        if samples == 0 {
            return 0;
        }

        let mut scratch = self.pool.rent(samples);
        let mut segment_scratch = self.pool.rent(samples);

        let audio_solo = any_soloed(self.tracks.iter().map(|t| t.settings.flags()));
        for track in &mut self.tracks {
            if !should_play(track.settings.flags(), audio_solo) {
                continue;
            }
            scratch.clear();
            track.render(start_frame, &mut scratch, &mut segment_scratch, channels, sample_rate);
            accumulate(out, &scratch);
        }

        let midi_solo = any_soloed(self.midi_tracks.iter().map(|t| t.settings.flags()));
        let ctx = MidiRenderContext {
            window_start,
            window_frames: samples / ch,
            sample_rate,
            channels,
            ticks_per_quarter_note: self.config().ticks_per_quarter_note,
            tempo: &self.tempo,
        };
        for track in &mut self.midi_tracks {
            if !should_play(track.settings.flags(), midi_solo) {
                continue;
            }
            scratch.clear();
            track.render(&ctx, &mut scratch);
            accumulate(out, &scratch);
        }
        drop(segment_scratch);
        drop(scratch);

        apply_modifiers(&mut self.master_modifiers, out, channels);
        apply_analyzers(&mut self.master_analyzers, out, channels);
        let volume = self.master_volume;
        for sample in out.iter_mut() {
            *sample = (*sample * volume).clamp(-1.0, 1.0);
        }
        samples
    }

    /// Render from the cursor into `out` and advance. Follows the loop
    /// range; without one, stops at the composition's end. Returns samples
    /// written.
    pub fn read_samples(&mut self, out: &mut [f32]) -> usize {
        let ch = self.config().channels as usize;
        let sample_rate = self.config().sample_rate;
        let wanted = out.len() / ch;
        let end = time_to_frames(self.duration(), sample_rate);
        let mut written = 0usize;

        while written < wanted {
            let cursor = self.transport.cursor;
            let limit = match self.transport.loop_range {
                Some((_, loop_end)) if cursor < loop_end => loop_end,
                _ => end,
            };
            if cursor >= limit {
                break;
            }
            let chunk = (wanted - written).min((limit - cursor) as usize);
            let region = &mut out[written * ch..(written + chunk) * ch];
            let n = self.render_frames(cursor, chunk, region) / ch;
            if n == 0 {
                break;
            }
            written += n;
            self.transport.cursor += n as u64;

            if let Some((loop_start, loop_end)) = self.transport.loop_range {
                if self.transport.cursor >= loop_end {
                    self.transport.cursor = loop_start;
                    self.recorder.on_transport_loop();
                }
            }
        }

        out[written * ch..].fill(0.0);
        let position = self.transport.cursor * ch as u64;
        self.observers.notify(ProviderEvent::PositionChanged(position));
        if written < wanted || (self.transport.loop_range.is_none() && self.transport.cursor >= end) {
            self.observers.notify(ProviderEvent::EndOfStream);
        }
        written * ch
    }

    // --- Transport control ---

    /// Start internal-clock playback. Refused while sync-driven.
    pub fn play(&mut self) -> bool {
        if self.transport.sync_driven {
            return false;
        }
        self.transport.state = PlaybackState::Playing;
        true
    }

    pub fn stop(&mut self) {
        self.transport.state = PlaybackState::Stopped;
        self.transport.needs_synth_reset = true;
    }

    pub fn is_playing(&self) -> bool {
        self.transport.state == PlaybackState::Playing
    }

    /// Current cursor position.
    pub fn position(&self) -> Duration {
        frames_to_time(self.transport.cursor, self.config().sample_rate)
    }

    /// Move the cursor. Synth targets are reset and segment read caches
    /// dropped before the next render.
    pub fn seek(&mut self, time: Duration) {
        self.seek_frames(time_to_frames(time, self.config().sample_rate));
    }

    pub fn seek_frames(&mut self, frame: u64) {
        self.transport.cursor = frame;
        self.transport.sync_remainder = 0.0;
        self.transport.needs_synth_reset = true;
        for track in &mut self.tracks {
            track.invalidate_caches();
        }
        let position = frame * self.config().channels as u64;
        self.observers.notify(ProviderEvent::PositionChanged(position));
    }

    /// Loop `[start, end)`. Returns false for an empty range.
    pub fn set_loop(&mut self, start: Duration, end: Duration) -> bool {
        let rate = self.config().sample_rate;
        let (start, end) = (time_to_frames(start, rate), time_to_frames(end, rate));
        if end <= start {
            return false;
        }
        self.transport.loop_range = Some((start, end));
        true
    }

    pub fn clear_loop(&mut self) {
        self.transport.loop_range = None;
    }

    /// Follow an external MIDI clock instead of the internal one.
    pub fn set_sync_driven(&mut self, sync_driven: bool) {
        self.transport.sync_driven = sync_driven;
        self.transport.sync_remainder = 0.0;
        if sync_driven {
            self.transport.state = PlaybackState::Stopped;
        }
    }

    /// Advance by `pulses` external clock pulses (24 per quarter note) and
    /// render the covered span into `out`. Returns samples written.
    pub fn advance_by_sync_ticks(&mut self, pulses: u32, out: &mut [f32]) -> usize {
        if !self.transport.sync_driven || pulses == 0 {
            return 0;
        }
        let rate = self.config().sample_rate as f64;
        let ch = self.config().channels as usize;
        let bpm = self.tempo.bpm_at(self.position());
        let secs = pulses as f64 * 60.0 / bpm / SYNC_PULSES_PER_QUARTER as f64;
        let exact = secs * rate + self.transport.sync_remainder;
        let frames = exact.floor();
        self.transport.sync_remainder = exact - frames;
        let samples = (frames as usize * ch).min(out.len() / ch * ch);
        self.read_samples(&mut out[..samples])
    }

    pub fn subscribe(&mut self, observer: ProviderObserver) -> ObserverId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }
}

fn accumulate(out: &mut [f32], src: &[f32]) {
    for (dst, s) in out.iter_mut().zip(src) {
        *dst += *s;
    }
}

/// A shared composition exposed as a sound-data provider.
#[derive(Clone)]
pub struct CompositionSource {
    composition: Arc<Mutex<Composition>>,
    sample_rate: u32,
    channels: u16,
}

impl CompositionSource {
    pub fn new(composition: Arc<Mutex<Composition>>) -> Self {
        let (sample_rate, channels) = match composition.lock() {
            Ok(c) => (c.sample_rate(), c.channels()),
            Err(poisoned) => {
                let c = poisoned.into_inner();
                (c.sample_rate(), c.channels())
            }
        };
        Self { composition, sample_rate, channels }
    }

    pub fn composition(&self) -> &Arc<Mutex<Composition>> {
        &self.composition
    }

    fn lock(&self) -> MutexGuard<'_, Composition> {
        match self.composition.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SoundDataProvider for CompositionSource {
    fn position(&self) -> u64 {
        self.lock().transport.cursor * self.channels as u64
    }

    fn length(&self) -> Option<u64> {
        let c = self.lock();
        Some(time_to_frames(c.duration(), self.sample_rate) * self.channels as u64)
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, buffer: &mut [f32]) -> usize {
        self.lock().read_samples(buffer)
    }

    fn seek(&mut self, sample_offset: u64) -> Result<(), ProviderError> {
        self.lock().seek_frames(sample_offset / self.channels.max(1) as u64);
        Ok(())
    }

    fn subscribe(&mut self, observer: ProviderObserver) -> Option<ObserverId> {
        Some(self.lock().subscribe(observer))
    }

    fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.lock().unsubscribe(id)
    }
}
