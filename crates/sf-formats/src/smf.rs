//! Standard MIDI File reading and writing.
//!
//! Reading flattens each track into absolute-tick [`MidiEvent`]s. Writing
//! produces a format 1 file: track 0 is a conductor track holding the
//! composition name and its tempo map, followed by one track per MIDI
//! track with segment content offset by each segment's timeline position.

use log::{debug, info};
use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, Smf, Timing, TrackEvent, TrackEventKind};
use sf_engine::Composition;
use sf_ir::{
    bpm_to_micros_per_quarter, sort_events, time_to_tick, EventKind, MetaEvent, MidiDataProvider,
    MidiEvent, MidiMessage, MidiSequence, Uuid,
};

use crate::FormatError;

/// Largest delta-time a track event can carry.
const MAX_DELTA: u64 = (1 << 28) - 1;

/// Meta type used for plain text events.
const META_TEXT: u8 = 0x01;

/// One track of a parsed file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SmfTrack {
    pub name: Option<String>,
    /// Absolute-tick events, End-of-Track excluded.
    pub events: Vec<MidiEvent>,
}

impl SmfTrack {
    /// True if the track carries anything besides meta events.
    pub fn has_content(&self) -> bool {
        self.events.iter().any(|e| !matches!(e.kind, EventKind::Meta(_)))
    }
}

/// A parsed Standard MIDI File.
#[derive(Clone, Debug, PartialEq)]
pub struct SmfFile {
    pub ticks_per_quarter_note: u16,
    pub tracks: Vec<SmfTrack>,
}

impl SmfFile {
    /// Tempo events from every track.
    pub fn tempo_events(&self) -> Vec<MidiEvent> {
        self.tracks
            .iter()
            .flat_map(|t| t.events.iter())
            .filter(|e| matches!(e.kind, EventKind::Meta(MetaEvent::Tempo(_))))
            .cloned()
            .collect()
    }

    /// All tracks merged into one event list.
    pub fn merged_events(&self) -> Vec<MidiEvent> {
        let mut events: Vec<MidiEvent> = self.tracks.iter().flat_map(|t| t.events.iter().cloned()).collect();
        sort_events(&mut events);
        events
    }
}

// --- Reading ---

pub fn read_smf(data: &[u8]) -> Result<SmfFile, FormatError> {
    let smf = Smf::parse(data)?;
    let ticks_per_quarter_note = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(..) => return Err(FormatError::UnsupportedVersion),
    };
    if ticks_per_quarter_note == 0 {
        return Err(FormatError::InvalidHeader);
    }

    let tracks = smf.tracks.iter().map(|track| decode_track(track)).collect::<Vec<_>>();
    debug!(
        "SMF: {:?}, {} tracks, {} ticks/quarter",
        smf.header.format,
        tracks.len(),
        ticks_per_quarter_note
    );
    Ok(SmfFile { ticks_per_quarter_note, tracks })
}

/// Parse a file into a single sequence holding every track's events.
pub fn sequence_from_smf(data: &[u8]) -> Result<MidiSequence, FormatError> {
    let file = read_smf(data)?;
    Ok(MidiSequence::from_events(file.ticks_per_quarter_note, file.merged_events()))
}

/// Parse a file into a playback provider; tempo events drive its clock.
pub fn provider_from_smf(data: &[u8]) -> Result<MidiDataProvider, FormatError> {
    let file = read_smf(data)?;
    Ok(MidiDataProvider::from_events(file.ticks_per_quarter_note, file.merged_events()))
}

/// Add the file's tracks to `composition`.
///
/// The file's tempo map replaces the composition's. Every track with
/// channel or SysEx content becomes a MIDI track with one segment at zero;
/// ticks are rescaled to the composition's resolution. Returns the new
/// track ids.
pub fn import_smf(composition: &mut Composition, data: &[u8]) -> Result<Vec<Uuid>, FormatError> {
    let file = read_smf(data)?;
    let from_tpqn = file.ticks_per_quarter_note;
    let to_tpqn = composition.ticks_per_quarter_note();
    let tempo = MidiDataProvider::from_events(from_tpqn, file.tempo_events()).to_tempo_track();

    let mut editor = composition.editor();
    editor.clear_tempo_markers();
    for marker in tempo.markers() {
        editor.set_tempo_marker(marker.time, marker.beats_per_minute);
    }

    let mut ids = Vec::new();
    for (i, track) in file.tracks.iter().enumerate() {
        if !track.has_content() {
            continue;
        }
        let name = track.name.clone().unwrap_or_else(|| format!("Track {}", i + 1));
        let events = track
            .events
            .iter()
            .filter(|e| !matches!(e.kind, EventKind::Meta(MetaEvent::Tempo(_) | MetaEvent::TrackName(_))))
            .map(|e| MidiEvent::new(rescale(e.tick, from_tpqn, to_tpqn), e.kind.clone()))
            .collect();
        let sequence = MidiSequence::from_events(to_tpqn, events);

        let id = editor.add_midi_track(&name);
        editor
            .add_midi_segment(id, &name, sequence, std::time::Duration::ZERO)
            .map_err(|e| FormatError::Midi(e.to_string()))?;
        ids.push(id);
    }
    info!("Imported {} MIDI tracks, {} tempo markers", ids.len(), tempo.len());
    Ok(ids)
}

fn decode_track(track: &[TrackEvent<'_>]) -> SmfTrack {
    let mut out = SmfTrack::default();
    let mut tick = 0u64;
    for event in track {
        tick += event.delta.as_int() as u64;
        let kind = match event.kind {
            TrackEventKind::Midi { channel, message } => EventKind::Channel(decode_message(channel.as_int(), message)),
            TrackEventKind::SysEx(data) => {
                let payload = data.strip_suffix(&[0xF7]).unwrap_or(data);
                EventKind::SysEx(payload.to_vec())
            }
            TrackEventKind::Escape(_) => continue,
            TrackEventKind::Meta(meta) => match decode_meta(meta) {
                Some(MetaEvent::EndOfTrack) | None => continue,
                Some(MetaEvent::TrackName(name)) if out.name.is_none() => {
                    out.name = Some(name.clone());
                    EventKind::Meta(MetaEvent::TrackName(name))
                }
                Some(meta) => EventKind::Meta(meta),
            },
        };
        out.events.push(MidiEvent::new(tick, kind));
    }
    out
}

fn decode_message(channel: u8, message: midly::MidiMessage) -> MidiMessage {
    use midly::MidiMessage as M;
    match message {
        M::NoteOff { key, vel } => MidiMessage::NoteOff { channel, note: key.as_int(), velocity: vel.as_int() },
        M::NoteOn { key, vel } => MidiMessage::NoteOn { channel, note: key.as_int(), velocity: vel.as_int() },
        M::Aftertouch { key, vel } => MidiMessage::PolyPressure { channel, note: key.as_int(), pressure: vel.as_int() },
        M::Controller { controller, value } => MidiMessage::ControlChange {
            channel,
            controller: controller.as_int(),
            value: value.as_int(),
        },
        M::ProgramChange { program } => MidiMessage::ProgramChange { channel, program: program.as_int() },
        M::ChannelAftertouch { vel } => MidiMessage::ChannelPressure { channel, pressure: vel.as_int() },
        M::PitchBend { bend } => MidiMessage::PitchBend { channel, value: bend.0.as_int() },
    }
}

fn decode_meta(meta: MetaMessage<'_>) -> Option<MetaEvent> {
    match meta {
        MetaMessage::Tempo(t) => Some(MetaEvent::Tempo(t.as_int())),
        MetaMessage::TrackName(name) => Some(MetaEvent::TrackName(String::from_utf8_lossy(name).into_owned())),
        MetaMessage::TimeSignature(numerator, denominator_pow2, clocks_per_click, notated_32nds) => {
            Some(MetaEvent::TimeSignature { numerator, denominator_pow2, clocks_per_click, notated_32nds })
        }
        MetaMessage::EndOfTrack => Some(MetaEvent::EndOfTrack),
        // Empty text only pads oversized gaps.
        MetaMessage::Text(data) if data.is_empty() => None,
        MetaMessage::Text(data) => Some(MetaEvent::Other { kind: META_TEXT, data: data.to_vec() }),
        MetaMessage::Unknown(kind, data) => Some(MetaEvent::Other { kind, data: data.to_vec() }),
        _ => None,
    }
}

// --- Writing ---

/// Encode `composition`'s MIDI tracks as a format 1 file.
pub fn export_smf(composition: &Composition) -> Result<Vec<u8>, FormatError> {
    let tpqn = composition.ticks_per_quarter_note();
    let tempo = composition.tempo();

    let conductor: Vec<MidiEvent> = tempo
        .markers()
        .iter()
        .map(|m| {
            let micros = bpm_to_micros_per_quarter(m.beats_per_minute).round() as u32;
            MidiEvent::meta(time_to_tick(m.time, tpqn, tempo), MetaEvent::Tempo(micros))
        })
        .collect();

    let mut owned: Vec<(&str, Vec<MidiEvent>)> = vec![(composition.name.as_str(), conductor)];
    for track in composition.midi_tracks() {
        let mut events = Vec::new();
        for segment in track.segments() {
            let offset = time_to_tick(segment.timeline_start(), tpqn, tempo);
            let sequence = segment.sequence();
            let from_tpqn = sequence.ticks_per_quarter_note();
            for event in sequence.snapshot_events() {
                if let EventKind::Meta(MetaEvent::Tempo(_) | MetaEvent::EndOfTrack | MetaEvent::TrackName(_)) =
                    event.kind
                {
                    continue;
                }
                let kind = match event.kind {
                    EventKind::SysEx(mut data) => {
                        if data.last() != Some(&0xF7) {
                            data.push(0xF7);
                        }
                        EventKind::SysEx(data)
                    }
                    kind => kind,
                };
                events.push(MidiEvent::new(offset + rescale(event.tick, from_tpqn, tpqn), kind));
            }
        }
        sort_events(&mut events);
        owned.push((track.name.as_str(), events));
    }

    let tracks = owned.iter().map(|(name, events)| encode_track(name, events)).collect();
    let smf = Smf { header: Header::new(Format::Parallel, Timing::Metrical(u15::from(tpqn))), tracks };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;
    info!("Exported {} tracks ({} bytes)", smf.tracks.len(), bytes.len());
    Ok(bytes)
}

/// Delta-encode one sorted track: name first, End-of-Track last. Gaps
/// longer than a delta can hold are bridged with empty text events.
fn encode_track<'a>(name: &'a str, events: &'a [MidiEvent]) -> Vec<TrackEvent<'a>> {
    let mut out = Vec::with_capacity(events.len() + 2);
    out.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
    });
    let mut previous = 0u64;
    for event in events {
        let Some(kind) = encode_kind(&event.kind) else { continue };
        let mut gap = event.tick - previous;
        while gap > MAX_DELTA {
            out.push(TrackEvent {
                delta: u28::from(MAX_DELTA as u32),
                kind: TrackEventKind::Meta(MetaMessage::Text(&[])),
            });
            gap -= MAX_DELTA;
        }
        out.push(TrackEvent { delta: u28::from(gap as u32), kind });
        previous = event.tick;
    }
    out.push(TrackEvent { delta: u28::from(0), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) });
    out
}

fn encode_kind(kind: &EventKind) -> Option<TrackEventKind<'_>> {
    match kind {
        EventKind::Channel(message) => {
            let (channel, message) = encode_message(message);
            Some(TrackEventKind::Midi { channel: u4::from(channel), message })
        }
        EventKind::SysEx(data) => Some(TrackEventKind::SysEx(data)),
        EventKind::Meta(meta) => {
            let meta = match meta {
                MetaEvent::Tempo(micros) => MetaMessage::Tempo(u24::from(*micros)),
                MetaEvent::TrackName(name) => MetaMessage::TrackName(name.as_bytes()),
                MetaEvent::TimeSignature { numerator, denominator_pow2, clocks_per_click, notated_32nds } => {
                    MetaMessage::TimeSignature(*numerator, *denominator_pow2, *clocks_per_click, *notated_32nds)
                }
                MetaEvent::EndOfTrack => return None,
                MetaEvent::Other { kind: META_TEXT, data } => MetaMessage::Text(data),
                MetaEvent::Other { kind, data } => MetaMessage::Unknown(*kind, data),
            };
            Some(TrackEventKind::Meta(meta))
        }
    }
}

fn encode_message(message: &MidiMessage) -> (u8, midly::MidiMessage) {
    use midly::MidiMessage as M;
    let m = match *message {
        MidiMessage::NoteOff { note, velocity, .. } => M::NoteOff { key: u7::from(note), vel: u7::from(velocity) },
        MidiMessage::NoteOn { note, velocity, .. } => M::NoteOn { key: u7::from(note), vel: u7::from(velocity) },
        MidiMessage::PolyPressure { note, pressure, .. } => {
            M::Aftertouch { key: u7::from(note), vel: u7::from(pressure) }
        }
        MidiMessage::ControlChange { controller, value, .. } => {
            M::Controller { controller: u7::from(controller), value: u7::from(value) }
        }
        MidiMessage::ProgramChange { program, .. } => M::ProgramChange { program: u7::from(program) },
        MidiMessage::ChannelPressure { pressure, .. } => M::ChannelAftertouch { vel: u7::from(pressure) },
        MidiMessage::PitchBend { value, .. } => M::PitchBend { bend: midly::PitchBend(u14::from(value)) },
    };
    (message.channel(), m)
}

/// Convert a tick between resolutions, rounding to nearest.
fn rescale(tick: u64, from_tpqn: u16, to_tpqn: u16) -> u64 {
    if from_tpqn == to_tpqn || from_tpqn == 0 {
        return tick;
    }
    let num = tick as u128 * to_tpqn as u128;
    let den = from_tpqn as u128;
    ((num + den / 2) / den) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_engine::CompositionConfig;
    use sf_ir::MidiNote;
    use std::time::Duration;

    fn composition() -> Composition {
        Composition::new("Song", CompositionConfig::default()).unwrap()
    }

    fn note_ticks(events: &[MidiEvent]) -> Vec<(u64, bool, u8)> {
        events
            .iter()
            .filter_map(|e| match e.message()? {
                MidiMessage::NoteOn { note, velocity, .. } if *velocity > 0 => Some((e.tick, true, *note)),
                m if m.is_note_off() => Some((e.tick, false, 0)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn export_writes_conductor_and_offsets_segments() {
        let mut comp = composition();
        let mut editor = comp.editor();
        let track = editor.add_midi_track("Bass");
        let mut seq = MidiSequence::new(480);
        seq.add_note(MidiNote::new(0, 240, 40, 100));
        seq.add_note(MidiNote::new(480, 240, 43, 90));
        editor.add_midi_segment(track, "Riff", seq, Duration::from_secs(1)).unwrap();
        editor.set_tempo_marker(Duration::from_secs(4), 60.0);

        let bytes = export_smf(&comp).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::from(480)));
        assert_eq!(smf.tracks.len(), 2);
        for track in &smf.tracks {
            assert_eq!(track.last().map(|e| e.kind), Some(TrackEventKind::Meta(MetaMessage::EndOfTrack)));
        }

        let file = read_smf(&bytes).unwrap();
        let conductor = &file.tracks[0];
        assert_eq!(conductor.name.as_deref(), Some("Song"));
        let tempos: Vec<(u64, u32)> = conductor
            .events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Meta(MetaEvent::Tempo(t)) => Some((e.tick, t)),
                _ => None,
            })
            .collect();
        // 4 s at 120 BPM is 8 quarters.
        assert_eq!(tempos, vec![(0, 500_000), (3840, 1_000_000)]);
        assert!(!conductor.has_content());

        let bass = &file.tracks[1];
        assert_eq!(bass.name.as_deref(), Some("Bass"));
        // 1 s at 120 BPM is 960 ticks.
        assert_eq!(
            note_ticks(&bass.events),
            vec![(960, true, 40), (1200, false, 0), (1440, true, 43), (1680, false, 0)]
        );
    }

    #[test]
    fn import_rebuilds_tracks_and_tempo() {
        let mut source = composition();
        let mut editor = source.editor();
        let a = editor.add_midi_track("Lead");
        let b = editor.add_midi_track("Pad");
        let mut seq = MidiSequence::new(480);
        seq.add_note(MidiNote::new(0, 480, 72, 100));
        editor.add_midi_segment(a, "A", seq.clone(), Duration::ZERO).unwrap();
        editor.add_midi_segment(b, "B", seq, Duration::from_secs(2)).unwrap();
        editor.set_tempo_marker(Duration::from_secs(2), 60.0);
        let bytes = export_smf(&source).unwrap();

        let mut target = composition();
        let ids = import_smf(&mut target, &bytes).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(target.midi_tracks()[0].name, "Lead");
        assert_eq!(target.midi_tracks()[1].name, "Pad");

        let markers = target.tempo().markers();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[1].beats_per_minute, 60.0);
        assert!((markers[1].time.as_secs_f64() - 2.0).abs() < 1e-6);

        let pad = &target.midi_tracks()[1].segments()[0];
        let note = pad.sequence().notes().next().unwrap();
        assert_eq!(note.start_tick, 1920);
        assert_eq!(note.duration_ticks, 480);
    }

    #[test]
    fn import_rescales_resolution() {
        let mut source = Composition::new(
            "Coarse",
            CompositionConfig { ticks_per_quarter_note: 96, ..CompositionConfig::default() },
        )
        .unwrap();
        let mut editor = source.editor();
        let track = editor.add_midi_track("Keys");
        let mut seq = MidiSequence::new(96);
        seq.add_note(MidiNote::new(96, 48, 60, 80));
        editor.add_midi_segment(track, "K", seq, Duration::ZERO).unwrap();
        let bytes = export_smf(&source).unwrap();

        let mut target = composition();
        import_smf(&mut target, &bytes).unwrap();
        let note = target.midi_tracks()[0].segments()[0].sequence().notes().next().copied().unwrap();
        assert_eq!((note.start_tick, note.duration_ticks), (480, 240));
    }

    #[test]
    fn sysex_keeps_payload_without_framing() {
        let mut comp = composition();
        let mut editor = comp.editor();
        let track = editor.add_midi_track("Dev");
        let mut seq = MidiSequence::new(480);
        seq.add_other_event(MidiEvent::new(10, EventKind::SysEx(vec![0x7E, 0x01, 0x02])));
        editor.add_midi_segment(track, "S", seq, Duration::ZERO).unwrap();

        let file = read_smf(&export_smf(&comp).unwrap()).unwrap();
        let sysex: Vec<&MidiEvent> =
            file.tracks[1].events.iter().filter(|e| matches!(e.kind, EventKind::SysEx(_))).collect();
        assert_eq!(sysex.len(), 1);
        assert_eq!(sysex[0].tick, 10);
        assert_eq!(sysex[0].kind, EventKind::SysEx(vec![0x7E, 0x01, 0x02]));
    }

    #[test]
    fn provider_and_sequence_from_file() {
        let mut comp = composition();
        let mut editor = comp.editor();
        let track = editor.add_midi_track("T");
        let mut seq = MidiSequence::new(480);
        seq.add_note(MidiNote::new(0, 960, 60, 100));
        editor.add_midi_segment(track, "S", seq, Duration::ZERO).unwrap();
        editor.set_tempo_marker(Duration::ZERO, 60.0);
        let bytes = export_smf(&comp).unwrap();

        let provider = provider_from_smf(&bytes).unwrap();
        assert_eq!(provider.length_ticks(), 960);
        // Two quarters at 60 BPM.
        assert_eq!(provider.duration(), Duration::from_secs(2));

        let sequence = sequence_from_smf(&bytes).unwrap();
        assert_eq!(sequence.note_count(), 1);
    }

    #[test]
    fn oversized_gap_is_padded_not_truncated() {
        let far = 2 * MAX_DELTA + 5;
        let events = vec![
            MidiEvent::channel(0, MidiMessage::NoteOn { channel: 0, note: 60, velocity: 100 }),
            MidiEvent::channel(far, MidiMessage::NoteOff { channel: 0, note: 60, velocity: 0 }),
        ];
        let encoded = encode_track("Long", &events);
        let total: u64 = encoded.iter().map(|e| e.delta.as_int() as u64).sum();
        assert_eq!(total, far);
        assert!(encoded.iter().all(|e| e.delta.as_int() as u64 <= MAX_DELTA));

        let decoded = decode_track(&encoded);
        assert_eq!(note_ticks(&decoded.events), vec![(0, true, 60), (far, false, 0)]);
        assert!(decoded.events.iter().all(|e| !matches!(e.kind, EventKind::Meta(MetaEvent::Other { .. }))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(read_smf(b"MThd").is_err());
        assert!(read_smf(b"RIFF....WAVE").is_err());
    }

    #[test]
    fn rescale_rounds() {
        assert_eq!(rescale(100, 480, 480), 100);
        assert_eq!(rescale(1, 3, 2), 1);
        assert_eq!(rescale(96, 96, 480), 480);
    }
}
