//! Integration tests: build compositions through the editor, render them,
//! and check the mixed output.

use std::time::Duration;

use sf_engine::modifiers::{create_modifier, OnePoleLowPass};
use sf_engine::{share_provider, AudioSegment, Composition, CompositionConfig, LoopMode, SoundModifier};
use sf_ir::{MidiNote, MidiSequence, RawDataProvider};
use uuid::Uuid;

const RATE: u32 = 44100;

fn composition() -> Composition {
    Composition::new("Test", CompositionConfig::default()).unwrap()
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

/// Stereo provider holding `samples` in both channels.
fn stereo(samples: &[f32]) -> RawDataProvider {
    let interleaved = samples.iter().flat_map(|&s| [s, s]).collect();
    RawDataProvider::new(interleaved, 2, RATE)
}

fn ramp(frames: usize, offset: f32) -> Vec<f32> {
    (0..frames).map(|i| offset + (i % 100) as f32 / 1000.0).collect()
}

fn add_audio(comp: &mut Composition, name: &str, provider: RawDataProvider, start: Duration) -> (Uuid, Uuid) {
    let mut editor = comp.editor();
    let track = editor.add_track(name);
    let segment = AudioSegment::from_provider(name, share_provider(provider), start, true);
    let seg = editor.add_segment(track, segment).unwrap();
    (track, seg)
}

fn render(comp: &mut Composition, start: Duration, duration: Duration) -> Vec<f32> {
    let frames = sf_ir::time_to_frames(duration, RATE) as usize;
    let mut out = vec![0.0f32; frames * 2];
    let written = comp.render(start, duration, &mut out);
    assert_eq!(written, out.len());
    out
}

#[test]
fn constant_track_with_muted_neighbour() {
    let mut comp = composition();
    add_audio(&mut comp, "One", RawDataProvider::constant(0.5, RATE as usize, 2, RATE), Duration::ZERO);
    let (muted, _) = add_audio(&mut comp, "Two", RawDataProvider::constant(0.9, RATE as usize, 2, RATE), Duration::ZERO);
    comp.track(muted).unwrap().settings.set_muted(true);

    let mut out = vec![1.0f32; 44100 * 2];
    let written = comp.render(Duration::ZERO, secs(1.0), &mut out);
    assert_eq!(written, 44100 * 2);
    let expected = (0.5 * comp.master_volume()).clamp(-1.0, 1.0);
    assert!(out.iter().all(|&s| s == expected));
}

#[test]
fn master_volume_scales_output() {
    let mut comp = composition();
    add_audio(&mut comp, "One", RawDataProvider::constant(0.5, 1000, 2, RATE), Duration::ZERO);
    comp.editor().set_master_volume(0.5);
    let out = render(&mut comp, Duration::ZERO, secs(0.01));
    assert!(out.iter().take(1000 * 2).all(|&s| s == 0.25));
}

#[test]
fn adjacent_segments_on_separate_tracks_do_not_bleed() {
    let a = ramp(RATE as usize, 0.1);
    let b = ramp(RATE as usize, -0.4);
    let mut comp = composition();
    add_audio(&mut comp, "A", stereo(&a), Duration::ZERO);
    add_audio(&mut comp, "B", stereo(&b), Duration::from_secs(1));

    let out = render(&mut comp, Duration::ZERO, Duration::from_secs(2));
    let expected: Vec<f32> = a.iter().chain(b.iter()).flat_map(|&s| [s, s]).collect();
    assert_eq!(out, expected);
}

#[test]
fn soloed_track_renders_alone() {
    let mut comp = composition();
    add_audio(&mut comp, "A", RawDataProvider::constant(0.1, 4410, 2, RATE), Duration::ZERO);
    let (solo, _) = add_audio(&mut comp, "B", stereo(&ramp(4410, 0.2)), Duration::ZERO);
    add_audio(&mut comp, "C", RawDataProvider::constant(0.3, 4410, 2, RATE), Duration::ZERO);
    comp.track(solo).unwrap().settings.set_soloed(true);
    let mixed = render(&mut comp, Duration::ZERO, secs(0.1));

    let mut alone = composition();
    add_audio(&mut alone, "B", stereo(&ramp(4410, 0.2)), Duration::ZERO);
    let reference = render(&mut alone, Duration::ZERO, secs(0.1));

    assert_eq!(mixed, reference);
}

#[test]
fn muted_solo_does_not_silence_others() {
    let mut comp = composition();
    let (a, _) = add_audio(&mut comp, "A", RawDataProvider::constant(0.1, 441, 2, RATE), Duration::ZERO);
    add_audio(&mut comp, "B", RawDataProvider::constant(0.2, 441, 2, RATE), Duration::ZERO);
    let flags = comp.track(a).unwrap().settings.flags_handle();
    flags.set_soloed(true);
    flags.set_muted(true);

    let out = render(&mut comp, Duration::ZERO, secs(0.01));
    assert!(out.iter().all(|&s| (s - 0.2).abs() < 1e-6));
}

#[test]
fn silencing_twice_leaves_one_silent_region() {
    let source = ramp(2 * RATE as usize, 0.05);
    let mut comp = composition();
    let (track, _) = add_audio(&mut comp, "A", stereo(&source), Duration::ZERO);
    let before = render(&mut comp, Duration::ZERO, Duration::from_secs(2));

    assert!(comp.editor().silence_segment(track, secs(0.5), secs(0.5)));
    assert!(comp.editor().silence_segment(track, secs(0.5), secs(0.5)));

    let segments = comp.track(track).unwrap().segments();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments.iter().filter(|s| s.is_silence()).count(), 1);
    for pair in segments.windows(2) {
        assert!(pair[0].timeline_end() <= pair[1].timeline_start());
    }

    let after = render(&mut comp, Duration::ZERO, Duration::from_secs(2));
    let (start, end) = (22050 * 2, 44100 * 2);
    assert_eq!(after[..start], before[..start]);
    assert!(after[start..end].iter().all(|&s| s == 0.0));
    assert_eq!(after[end..], before[end..]);
}

/// Ramp with no repeated values, so any misplaced frame shows up.
fn unique_ramp(frames: usize) -> Vec<f32> {
    (0..frames).map(|i| i as f32 / frames as f32).collect()
}

/// Silence `[start, start + len)` and check only that range changed.
fn assert_silence_is_local(comp: &mut Composition, track: Uuid, span: Duration, start: f64, len: f64) {
    let before = render(comp, Duration::ZERO, span);
    assert!(comp.editor().silence_segment(track, secs(start), secs(len)));
    let after = render(comp, Duration::ZERO, span);

    let first = (start * RATE as f64).round() as usize * 2;
    let last = ((start + len) * RATE as f64).round() as usize * 2;
    assert_eq!(after[..first], before[..first]);
    assert!(after[first..last].iter().all(|&s| s == 0.0));
    assert_eq!(after[last..], before[last..]);
}

#[test]
fn silencing_a_reversed_segment_keeps_the_rest() {
    let mut comp = composition();
    let (track, seg) = add_audio(&mut comp, "Rev", stereo(&unique_ramp(RATE as usize)), Duration::ZERO);
    comp.track_mut(track).unwrap().segment_mut(seg).unwrap().settings.reverse = true;
    assert_silence_is_local(&mut comp, track, Duration::from_secs(1), 0.25, 0.25);
}

#[test]
fn silencing_a_looped_segment_keeps_the_rest() {
    let mut comp = composition();
    let (track, seg) = add_audio(&mut comp, "Loop", stereo(&unique_ramp(RATE as usize * 3 / 10)), Duration::ZERO);
    comp.track_mut(track).unwrap().segment_mut(seg).unwrap().settings.loop_mode = LoopMode::Repetitions(3);
    assert_silence_is_local(&mut comp, track, secs(0.9), 0.4, 0.1);
}

#[test]
fn silencing_a_reversed_loop_keeps_the_rest() {
    let mut comp = composition();
    let (track, seg) = add_audio(&mut comp, "Both", stereo(&unique_ramp(RATE as usize / 4)), Duration::ZERO);
    let settings = &mut comp.track_mut(track).unwrap().segment_mut(seg).unwrap().settings;
    settings.reverse = true;
    settings.loop_mode = LoopMode::Duration(Duration::from_secs(1));
    assert_silence_is_local(&mut comp, track, Duration::from_secs(1), 0.3, 0.2);
}

#[test]
fn output_is_clamped() {
    let mut comp = composition();
    let (track, seg) = add_audio(&mut comp, "Hot", RawDataProvider::constant(0.9, 4410, 2, RATE), Duration::ZERO);
    add_audio(&mut comp, "Cold", RawDataProvider::constant(-0.95, 4410, 2, RATE), secs(0.05));
    comp.track_mut(track).unwrap().segment_mut(seg).unwrap().settings.volume = 4.0;
    comp.track_mut(track).unwrap().settings.volume = 2.0;

    let out = render(&mut comp, Duration::ZERO, secs(0.2));
    assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
    assert_eq!(out[0], 1.0);
}

#[test]
fn midi_track_sounds_until_muted() {
    let mut comp = composition();
    let mut editor = comp.editor();
    let track = editor.add_midi_track("Lead");
    let mut seq = MidiSequence::new(480);
    seq.add_note(MidiNote::new(0, 480, 69, 127));
    editor.add_midi_segment(track, "Riff", seq, Duration::ZERO).unwrap();

    let out = render(&mut comp, Duration::ZERO, secs(0.1));
    assert!(out.iter().any(|&s| s != 0.0));
    assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));

    comp.midi_track(track).unwrap().settings.set_muted(true);
    comp.seek(Duration::ZERO);
    let silent = render(&mut comp, Duration::ZERO, secs(0.1));
    assert!(silent.iter().all(|&s| s == 0.0));
}

#[test]
fn playback_reads_to_the_end() {
    let mut comp = composition();
    add_audio(&mut comp, "A", RawDataProvider::constant(0.5, 1000, 2, RATE), Duration::ZERO);
    assert!(comp.play());

    let mut block = vec![0.0f32; 512 * 2];
    let mut total = 0;
    loop {
        let n = comp.read_samples(&mut block);
        total += n;
        if n < block.len() {
            break;
        }
    }
    assert_eq!(total, 1000 * 2);
    assert_eq!(comp.transport().cursor(), 1000);
}

#[test]
fn looped_playback_wraps() {
    let mut comp = composition();
    add_audio(&mut comp, "A", stereo(&ramp(RATE as usize, 0.0)), Duration::ZERO);
    assert!(comp.set_loop(Duration::ZERO, secs(0.01)));
    comp.play();

    let mut first = vec![0.0f32; 441 * 2];
    let mut second = vec![0.0f32; 441 * 2];
    assert_eq!(comp.read_samples(&mut first), 441 * 2);
    assert_eq!(comp.read_samples(&mut second), 441 * 2);
    assert_eq!(first, second);
}

/// Stereo composition at 48 kHz with a 0.5 step on one track and a master
/// low-pass.
fn low_passed_48k() -> Composition {
    let config = CompositionConfig { sample_rate: 48000, ..CompositionConfig::default() };
    let mut comp = Composition::new("48k", config).unwrap();
    let mut editor = comp.editor();
    let track = editor.add_track("Step");
    let provider = share_provider(RawDataProvider::constant(0.5, 4800, 2, 48000));
    editor.add_segment(track, AudioSegment::from_provider("Step", provider, Duration::ZERO, true)).unwrap();
    editor.add_master_modifier(create_modifier("Low Pass").unwrap());
    comp
}

#[test]
fn master_low_pass_is_tuned_to_composition_rate() {
    let mut comp = low_passed_48k();
    let mut out = vec![0.0f32; 64 * 2];
    comp.render_frames(0, 64, &mut out);

    let mut expected = vec![0.5f32; 64 * 2];
    let mut filter = OnePoleLowPass::new(4410.0);
    filter.init(48000, 2);
    filter.process(&mut expected, 2);
    let volume = comp.master_volume();
    for (got, want) in out.iter().zip(&expected) {
        assert!((got - (want * volume).clamp(-1.0, 1.0)).abs() < 1e-6);
    }

    let mut untuned = vec![0.5f32; 2];
    OnePoleLowPass::new(4410.0).process(&mut untuned, 2);
    assert!((out[0] - untuned[0] * volume).abs() > 1e-3);
}

#[test]
fn seek_clears_modifier_state() {
    let mut comp = low_passed_48k();
    let mut first = vec![0.0f32; 64 * 2];
    comp.render_frames(0, 64, &mut first);

    comp.seek(Duration::ZERO);
    let mut again = vec![0.0f32; 64 * 2];
    comp.render_frames(0, 64, &mut again);
    assert_eq!(first, again);
}
