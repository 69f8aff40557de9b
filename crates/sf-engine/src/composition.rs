//! The composition aggregate: tracks, tempo, master chain and registry.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use sf_ir::{
    tick_to_time, time_to_tick, ControlPoint, MidiNote, MidiSequence, ProviderObservers, TempoTrack,
};
use uuid::Uuid;

use crate::config::CompositionConfig;
use crate::error::CompositionError;
use crate::midi_segment::MidiSegment;
use crate::modifiers::{AudioAnalyzer, SoundModifier};
use crate::pool::BufferPool;
use crate::recorder::{take_to_events, CompositionRecorder, RecordingMode, RecordingStopped};
use crate::renderer::Transport;
use crate::track::{MidiTrack, Track, TrackSettings};

/// Something external automation can address by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappableObject {
    Composition,
    Track(Uuid),
    TrackSettings { track: Uuid },
    MidiTrack(Uuid),
    MidiTrackSettings { track: Uuid },
}

/// A parameter that can be set on a mappable object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappedParameter {
    Volume,
    Pan,
    Mute,
    Solo,
    Enabled,
}

/// Root owner of everything that gets rendered.
pub struct Composition {
    id: Uuid,
    pub name: String,
    config: CompositionConfig,
    pub(crate) tempo: TempoTrack,
    pub(crate) master_volume: f32,
    pub(crate) tracks: Vec<Track>,
    pub(crate) midi_tracks: Vec<MidiTrack>,
    pub master_modifiers: Vec<Box<dyn SoundModifier>>,
    pub master_analyzers: Vec<Box<dyn AudioAnalyzer>>,
    dirty: bool,
    registry: HashMap<Uuid, MappableObject>,
    pub(crate) pool: BufferPool,
    pub(crate) transport: Transport,
    pub(crate) recorder: CompositionRecorder,
    stopped: Receiver<RecordingStopped>,
    pub(crate) observers: ProviderObservers,
    takes: u32,
    disposed: bool,
}

impl std::fmt::Debug for Composition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("config", &self.config)
            .field("tracks", &self.tracks.len())
            .field("midi_tracks", &self.midi_tracks.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Composition {
    /// Create an empty composition. Fails on an invalid configuration.
    pub fn new(name: &str, config: CompositionConfig) -> Result<Self, CompositionError> {
        config.validate()?;
        let recorder = CompositionRecorder::new();
        let stopped = recorder.stopped();
        let id = Uuid::new_v4();
        let mut registry = HashMap::new();
        registry.insert(id, MappableObject::Composition);
        debug!("Created composition '{}' ({} Hz, {} ch)", name, config.sample_rate, config.channels);
        Ok(Self {
            id,
            name: name.to_string(),
            config,
            tempo: TempoTrack::new(config.initial_bpm),
            master_volume: config.master_volume,
            tracks: Vec::new(),
            midi_tracks: Vec::new(),
            master_modifiers: Vec::new(),
            master_analyzers: Vec::new(),
            dirty: false,
            registry,
            pool: BufferPool::default(),
            transport: Transport::default(),
            recorder,
            stopped,
            observers: ProviderObservers::new(),
            takes: 0,
            disposed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    pub fn ticks_per_quarter_note(&self) -> u16 {
        self.config.ticks_per_quarter_note
    }

    pub fn tempo(&self) -> &TempoTrack {
        &self.tempo
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    // --- Dirty flag ---

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Called after the composition has been saved.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    // --- Tracks ---

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: Uuid) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    pub fn track_mut(&mut self, id: Uuid) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id() == id)
    }

    pub fn midi_tracks(&self) -> &[MidiTrack] {
        &self.midi_tracks
    }

    pub fn midi_track(&self, id: Uuid) -> Option<&MidiTrack> {
        self.midi_tracks.iter().find(|t| t.id() == id)
    }

    pub fn midi_track_mut(&mut self, id: Uuid) -> Option<&mut MidiTrack> {
        self.midi_tracks.iter_mut().find(|t| t.id() == id)
    }

    /// End of the last segment on any track.
    pub fn duration(&self) -> Duration {
        let audio = self.tracks.iter().map(Track::duration);
        let midi = self
            .midi_tracks
            .iter()
            .map(|t| t.duration(self.config.ticks_per_quarter_note, &self.tempo));
        audio.chain(midi).max().unwrap_or_default()
    }

    // --- Registry ---

    pub(crate) fn register_track(&mut self, track: &Track) {
        self.registry.insert(track.id(), MappableObject::Track(track.id()));
        self.registry.insert(track.settings.id(), MappableObject::TrackSettings { track: track.id() });
    }

    pub(crate) fn register_midi_track(&mut self, track: &MidiTrack) {
        self.registry.insert(track.id(), MappableObject::MidiTrack(track.id()));
        self.registry.insert(track.settings.id(), MappableObject::MidiTrackSettings { track: track.id() });
    }

    pub(crate) fn unregister(&mut self, ids: &[Uuid]) {
        for id in ids {
            self.registry.remove(id);
        }
    }

    /// What `id` refers to, if registered.
    pub fn lookup(&self, id: Uuid) -> Option<MappableObject> {
        self.registry.get(&id).copied()
    }

    pub fn registered_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.registry.keys().copied()
    }

    /// Set an automatable parameter. Returns false if `id` is unknown or
    /// the parameter does not apply.
    pub fn set_mapped_value(&mut self, id: Uuid, parameter: MappedParameter, value: f32) -> bool {
        let settings = match self.lookup(id) {
            None => return false,
            Some(MappableObject::Composition) => {
                if parameter != MappedParameter::Volume {
                    return false;
                }
                self.master_volume = value.max(0.0);
                self.mark_dirty();
                return true;
            }
            Some(MappableObject::Track(track)) | Some(MappableObject::TrackSettings { track }) => {
                self.track_mut(track).map(|t| &mut t.settings)
            }
            Some(MappableObject::MidiTrack(track)) | Some(MappableObject::MidiTrackSettings { track }) => {
                self.midi_track_mut(track).map(|t| &mut t.settings)
            }
        };
        let Some(settings) = settings else { return false };
        apply_parameter(settings, parameter, value);
        self.mark_dirty();
        true
    }

    // --- Recording ---

    pub fn recorder(&self) -> &CompositionRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut CompositionRecorder {
        &mut self.recorder
    }

    pub(crate) fn has_finished_recordings(&self) -> bool {
        !self.stopped.is_empty()
    }

    /// Apply every finished take waiting in the recorder channel.
    pub fn process_finished_recordings(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(take) = self.stopped.try_recv() {
            if self.apply_take(take) {
                applied += 1;
            }
        }
        if applied > 0 {
            self.mark_dirty();
        }
        applied
    }

    fn apply_take(&mut self, take: RecordingStopped) -> bool {
        let tpqn = self.config.ticks_per_quarter_note;
        let Some(track) = self.midi_tracks.iter_mut().find(|t| t.id() == take.track_id) else {
            warn!("Take for unknown MIDI track {}", take.track_id);
            return false;
        };
        if take.messages.is_empty() {
            debug!("Empty take on '{}' discarded", track.name);
            return false;
        }

        if take.mode == RecordingMode::Overdub {
            let target = take
                .target_segment
                .filter(|id| track.segment(*id).is_some())
                .or_else(|| overlapping_segment(track, take.start_time, tpqn, &self.tempo));
            let track_name = track.name.clone();
            if let Some(segment) = target.and_then(|id| track.segment_mut(id)) {
                let events = take_to_events(&take, segment.timeline_start(), tpqn, &self.tempo);
                let captured = MidiSequence::from_events(tpqn, events);
                merge_into(segment.sequence_mut(), &captured);
                info!("Merged take into '{}' on '{}'", segment.name, track_name);
                return true;
            }
            debug!("No segment to overdub on '{}'; creating a new one", track.name);
        }

        self.takes += 1;
        let events = take_to_events(&take, take.start_time, tpqn, &self.tempo);
        let sequence = MidiSequence::from_events(tpqn, events);
        let name = format!("Take {}", self.takes);
        info!("Added '{}' to '{}' at {:?}", name, track.name, take.start_time);
        track.add_segment(MidiSegment::new(&name, sequence, take.start_time));
        true
    }

    /// Stop recording, release recorders and segment sources. Safe to call
    /// more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.recorder.dispose();
        for track in &mut self.tracks {
            track.dispose();
        }
        self.observers.clear();
        debug!("Disposed composition '{}'", self.name);
    }
}

impl Drop for Composition {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn apply_parameter(settings: &mut TrackSettings, parameter: MappedParameter, value: f32) {
    match parameter {
        MappedParameter::Volume => settings.volume = value.max(0.0),
        MappedParameter::Pan => settings.pan = value.clamp(-1.0, 1.0),
        MappedParameter::Mute => settings.set_muted(value >= 0.5),
        MappedParameter::Solo => settings.set_soloed(value >= 0.5),
        MappedParameter::Enabled => settings.set_enabled(value >= 0.5),
    }
}

/// Segment whose span contains `time`.
fn overlapping_segment(track: &MidiTrack, time: Duration, tpqn: u16, tempo: &TempoTrack) -> Option<Uuid> {
    track
        .segments()
        .iter()
        .find(|s| {
            let offset = time_to_tick(s.timeline_start(), tpqn, tempo);
            let end = tick_to_time(offset + s.length_ticks(), tpqn, tempo);
            s.timeline_start() <= time && time < end
        })
        .map(|s| s.id())
}

/// Copy notes, control points and other events of `source` into `target`.
fn merge_into(target: &mut MidiSequence, source: &MidiSequence) {
    for note in source.notes() {
        let copy = MidiNote::new(note.start_tick, note.duration_ticks, note.note_number, note.velocity);
        target.add_note(copy.on_channel(note.channel));
    }
    for controller in source.controllers() {
        for point in source.control_points(controller) {
            let copy = ControlPoint::new(point.tick, point.value).on_channel(point.channel);
            target.add_control_point(controller, copy);
        }
    }
    for event in source.other_events() {
        target.add_other_event(event.clone());
    }
}
