//! Audio and MIDI tracks.
//!
//! A track renders its segments into a caller-supplied (zeroed) buffer,
//! then runs its own modifier and analyzer chains and applies volume and
//! pan. Mute, solo and enable flags are atomics shared through a handle so
//! another thread can toggle them without locking the composition; a
//! change becomes visible on the next render.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sf_ir::{
    tick_to_time, time_to_frames, time_to_tick, EventKind, MidiDataProvider, TempoTrack,
};
use uuid::Uuid;

use crate::destination::MidiDestination;
use crate::event_queue::{EventQueue, ScheduledEvent};
use crate::midi_segment::MidiSegment;
use crate::modifiers::{
    apply_analyzers, apply_midi_modifiers, apply_modifiers, reset_modifiers, AudioAnalyzer, MidiModifier, SoundModifier,
};
use crate::segment::{pan_gains, AudioSegment};

/// Segments a MIDI track can read in one render without growing its lists.
const MIDI_SOURCE_CAPACITY: usize = 64;

/// Mute / solo / enable flags, shareable across threads.
#[derive(Debug)]
pub struct TrackFlags {
    muted: AtomicBool,
    soloed: AtomicBool,
    enabled: AtomicBool,
}

impl Default for TrackFlags {
    fn default() -> Self {
        Self { muted: AtomicBool::new(false), soloed: AtomicBool::new(false), enabled: AtomicBool::new(true) }
    }
}

impl TrackFlags {
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_soloed(&self) -> bool {
        self.soloed.load(Ordering::Relaxed)
    }

    pub fn set_soloed(&self, soloed: bool) {
        self.soloed.store(soloed, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Enabled and not muted.
    pub fn is_audible(&self) -> bool {
        self.is_enabled() && !self.is_muted()
    }
}

/// Mixer settings shared by audio and MIDI tracks.
pub struct TrackSettings {
    id: Uuid,
    flags: Arc<TrackFlags>,
    pub volume: f32,
    /// -1.0 (left) to 1.0 (right)
    pub pan: f32,
    pub modifiers: Vec<Box<dyn SoundModifier>>,
    pub analyzers: Vec<Box<dyn AudioAnalyzer>>,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            flags: Arc::new(TrackFlags::default()),
            volume: 1.0,
            pan: 0.0,
            modifiers: Vec::new(),
            analyzers: Vec::new(),
        }
    }
}

impl std::fmt::Debug for TrackSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSettings")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("volume", &self.volume)
            .field("pan", &self.pan)
            .field("modifiers", &self.modifiers.len())
            .field("analyzers", &self.analyzers.len())
            .finish()
    }
}

impl TrackSettings {
    /// Registry id of the settings object itself.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn flags(&self) -> &TrackFlags {
        &self.flags
    }

    /// Handle for toggling flags from another thread.
    pub fn flags_handle(&self) -> Arc<TrackFlags> {
        self.flags.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.flags.is_muted()
    }

    pub fn set_muted(&self, muted: bool) {
        self.flags.set_muted(muted);
    }

    pub fn is_soloed(&self) -> bool {
        self.flags.is_soloed()
    }

    pub fn set_soloed(&self, soloed: bool) {
        self.flags.set_soloed(soloed);
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.is_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.flags.set_enabled(enabled);
    }

    /// Clear filter memory and other running state in the track chain.
    pub fn reset_modifiers(&mut self) {
        reset_modifiers(&mut self.modifiers);
    }

    /// Track-level chains, then volume and pan.
    fn finish(&mut self, buffer: &mut [f32], channels: u16) {
        apply_modifiers(&mut self.modifiers, buffer, channels);
        apply_analyzers(&mut self.analyzers, buffer, channels);
        apply_volume_pan(buffer, channels, self.volume, self.pan);
    }
}

/// Multiply by `volume`; for stereo also apply linear balance.
pub(crate) fn apply_volume_pan(buffer: &mut [f32], channels: u16, volume: f32, pan: f32) {
    if channels == 2 && pan != 0.0 {
        let (left, right) = pan_gains(pan);
        for frame in buffer.chunks_exact_mut(2) {
            frame[0] *= volume * left;
            frame[1] *= volume * right;
        }
    } else if volume != 1.0 {
        for sample in buffer.iter_mut() {
            *sample *= volume;
        }
    }
}

/// True if any audible track is soloed.
pub(crate) fn any_soloed<'a>(flags: impl IntoIterator<Item = &'a TrackFlags>) -> bool {
    flags.into_iter().any(|f| f.is_soloed() && f.is_audible())
}

/// Soloed audible tracks play if any exist, else all audible tracks.
pub(crate) fn should_play(flags: &TrackFlags, any_solo: bool) -> bool {
    flags.is_audible() && (!any_solo || flags.is_soloed())
}

/// A track of audio segments.
#[derive(Debug)]
pub struct Track {
    id: Uuid,
    pub name: String,
    segments: Vec<AudioSegment>,
    pub settings: TrackSettings,
    composition: Option<Uuid>,
}

impl Track {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            segments: Vec::new(),
            settings: TrackSettings::default(),
            composition: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Owning composition, once added to one.
    pub fn composition(&self) -> Option<Uuid> {
        self.composition
    }

    pub(crate) fn set_composition(&mut self, composition: Option<Uuid>) {
        self.composition = composition;
    }

    pub fn segments(&self) -> &[AudioSegment] {
        &self.segments
    }

    pub fn segment(&self, id: Uuid) -> Option<&AudioSegment> {
        self.segments.iter().find(|s| s.id() == id)
    }

    pub fn segment_mut(&mut self, id: Uuid) -> Option<&mut AudioSegment> {
        self.segments.iter_mut().find(|s| s.id() == id)
    }

    /// Insert keeping timeline order. Returns the segment id.
    pub fn add_segment(&mut self, segment: AudioSegment) -> Uuid {
        let id = segment.id();
        let pos = self.segments.partition_point(|s| s.timeline_start() <= segment.timeline_start());
        self.segments.insert(pos, segment);
        id
    }

    pub fn remove_segment(&mut self, id: Uuid) -> Option<AudioSegment> {
        let pos = self.segments.iter().position(|s| s.id() == id)?;
        Some(self.segments.remove(pos))
    }

    /// Restore timeline order after a segment moved.
    pub fn sort_segments(&mut self) {
        self.segments.sort_by_key(|s| s.timeline_start());
    }

    /// End of the last segment.
    pub fn duration(&self) -> Duration {
        self.segments.iter().map(|s| s.timeline_end()).max().unwrap_or_default()
    }

    /// Drop cached source reads on every segment.
    pub fn invalidate_caches(&mut self) {
        for segment in &mut self.segments {
            segment.invalidate_cache();
        }
    }

    /// Reset the track chain and every segment chain.
    pub fn reset_modifiers(&mut self) {
        self.settings.reset_modifiers();
        for segment in &mut self.segments {
            reset_modifiers(&mut segment.settings.modifiers);
        }
    }

    /// Dispose every segment.
    pub fn dispose(&mut self) {
        for segment in &mut self.segments {
            segment.dispose();
        }
    }

    /// Mix the window starting at output frame `window_start` into `out`
    /// (expected zeroed). `scratch` holds one segment at a time and must be
    /// at least as long as `out`.
    pub fn render(&mut self, window_start: u64, out: &mut [f32], scratch: &mut [f32], channels: u16, sample_rate: u32) {
        let scratch = &mut scratch[..out.len()];
        let ch = channels.max(1) as usize;
        for segment in &mut self.segments {
            let written = segment.render(window_start, scratch, channels, sample_rate);
            let region = written.start * ch..written.end * ch;
            for (dst, src) in out[region.clone()].iter_mut().zip(&scratch[region]) {
                *dst += *src;
            }
        }
        self.settings.finish(out, channels);
    }
}

/// Format and timing facts a MIDI track needs for one render.
#[derive(Clone, Copy, Debug)]
pub struct MidiRenderContext<'a> {
    pub window_start: Duration,
    pub window_frames: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub ticks_per_quarter_note: u16,
    pub tempo: &'a TempoTrack,
}

/// A track of MIDI segments routed to a destination.
pub struct MidiTrack {
    id: Uuid,
    pub name: String,
    segments: Vec<MidiSegment>,
    pub settings: TrackSettings,
    pub midi_modifiers: Vec<Box<dyn MidiModifier>>,
    target: Option<Box<dyn MidiDestination>>,
    composition: Option<Uuid>,
    queue: EventQueue,
    sources: Vec<Arc<MidiDataProvider>>,
}

impl std::fmt::Debug for MidiTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiTrack")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("segments", &self.segments)
            .field("settings", &self.settings)
            .field("target", &self.target.as_ref().map(|t| t.name().to_string()))
            .finish()
    }
}

impl MidiTrack {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            segments: Vec::new(),
            settings: TrackSettings::default(),
            midi_modifiers: Vec::new(),
            target: None,
            composition: None,
            queue: EventQueue::default(),
            sources: Vec::with_capacity(MIDI_SOURCE_CAPACITY),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn composition(&self) -> Option<Uuid> {
        self.composition
    }

    pub(crate) fn set_composition(&mut self, composition: Option<Uuid>) {
        self.composition = composition;
    }

    /// Route to `target`, returning the previous destination.
    pub fn set_target(&mut self, target: Option<Box<dyn MidiDestination>>) -> Option<Box<dyn MidiDestination>> {
        std::mem::replace(&mut self.target, target)
    }

    pub fn target(&self) -> Option<&dyn MidiDestination> {
        self.target.as_deref()
    }

    pub fn target_mut(&mut self) -> Option<&mut (dyn MidiDestination + 'static)> {
        self.target.as_deref_mut()
    }

    pub fn segments(&self) -> &[MidiSegment] {
        &self.segments
    }

    pub fn segment(&self, id: Uuid) -> Option<&MidiSegment> {
        self.segments.iter().find(|s| s.id() == id)
    }

    pub fn segment_mut(&mut self, id: Uuid) -> Option<&mut MidiSegment> {
        self.segments.iter_mut().find(|s| s.id() == id)
    }

    pub fn add_segment(&mut self, segment: MidiSegment) -> Uuid {
        let id = segment.id();
        let pos = self.segments.partition_point(|s| s.timeline_start() <= segment.timeline_start());
        self.segments.insert(pos, segment);
        id
    }

    pub fn remove_segment(&mut self, id: Uuid) -> Option<MidiSegment> {
        let pos = self.segments.iter().position(|s| s.id() == id)?;
        Some(self.segments.remove(pos))
    }

    pub fn sort_segments(&mut self) {
        self.segments.sort_by_key(|s| s.timeline_start());
    }

    /// End of the last segment under `tempo`.
    pub fn duration(&self, ticks_per_quarter_note: u16, tempo: &TempoTrack) -> Duration {
        self.segments
            .iter()
            .map(|s| {
                let offset = time_to_tick(s.timeline_start(), ticks_per_quarter_note, tempo);
                tick_to_time(offset + s.length_ticks(), ticks_per_quarter_note, tempo)
            })
            .max()
            .unwrap_or_default()
    }

    /// Clear the destination's state (notes, controllers).
    pub fn reset_target(&mut self) {
        if let Some(target) = self.target.as_mut() {
            target.reset();
        }
    }

    /// Dispatch the window's events to the target and mix the target's
    /// audio into `out` (expected zeroed).
    pub fn render(&mut self, ctx: &MidiRenderContext<'_>, out: &mut [f32]) {
        let tpqn = ctx.ticks_per_quarter_note;
        let window_end = ctx.window_start + sf_ir::frames_to_time(ctx.window_frames as u64, ctx.sample_rate);
        let start_tick = time_to_tick(ctx.window_start, tpqn, ctx.tempo);
        let end_tick = time_to_tick(window_end, tpqn, ctx.tempo);

        self.queue.clear();
        self.sources.clear();
        for segment in &self.segments {
            let offset = time_to_tick(segment.timeline_start(), tpqn, ctx.tempo);
            if offset >= end_tick {
                continue;
            }
            let provider = segment.data_provider();
            let local_end = end_tick - offset;
            let local_start = start_tick.saturating_sub(offset);
            let range = provider.event_range(local_start, local_end);
            if range.is_empty() {
                continue;
            }
            let source = self.sources.len() as u32;
            for index in range {
                let event = &provider.events()[index];
                self.queue.push(ScheduledEvent {
                    tick: offset + event.tick,
                    rank: event.order_rank(),
                    source,
                    index: index as u32,
                });
            }
            self.sources.push(provider);
        }
        self.queue.sort();

        let channels = ctx.channels.max(1);
        let ch = channels as usize;
        let frames = out.len() / ch;
        let mut cursor = 0usize;

        while let Some(next) = self.queue.peek().copied() {
            let at = tick_to_time(next.tick, tpqn, ctx.tempo).saturating_sub(ctx.window_start);
            let frame = (time_to_frames(at, ctx.sample_rate) as usize).clamp(cursor, frames);
            if let Some(target) = self.target.as_mut() {
                if frame > cursor && target.produces_audio() {
                    target.render(&mut out[cursor * ch..frame * ch], channels, ctx.sample_rate);
                }
            }
            cursor = frame;

            for i in self.queue.drain_until(next.tick) {
                let Some(scheduled) = self.queue.get(i).copied() else { continue };
                let Some(target) = self.target.as_mut() else { continue };
                let event = &self.sources[scheduled.source as usize].events()[scheduled.index as usize];
                match &event.kind {
                    EventKind::Channel(message) => {
                        apply_midi_modifiers(&mut self.midi_modifiers, *message, |m| target.process_message(m));
                    }
                    EventKind::SysEx(data) => {
                        if target.is_physical() {
                            target.process_sysex(data);
                        }
                    }
                    EventKind::Meta(_) => {}
                }
            }
        }

        if let Some(target) = self.target.as_mut() {
            if cursor < frames && target.produces_audio() {
                target.render(&mut out[cursor * ch..frames * ch], channels, ctx.sample_rate);
            }
        }
        self.sources.clear();
        self.settings.finish(out, channels);
    }
}
