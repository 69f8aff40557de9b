use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sf_engine::{share_provider, AudioSegment, Composition, CompositionConfig};
use sf_ir::{MidiNote, MidiSequence, RawDataProvider};

const BLOCK_FRAMES: usize = 512;

fn build_composition() -> Composition {
    let config = CompositionConfig::default();
    let mut composition = Composition::new("bench", config).unwrap();
    let mut editor = composition.editor();

    for i in 0..4 {
        let track = editor.add_track(&format!("Audio {}", i + 1));
        let provider = share_provider(RawDataProvider::constant(0.1, 44100 * 4, 2, 44100));
        let segment = AudioSegment::from_provider("loop", provider, Duration::ZERO, true);
        editor.add_segment(track, segment).unwrap();
    }

    let midi = editor.add_midi_track("Lead");
    let mut sequence = MidiSequence::new(480);
    for beat in 0..32u64 {
        sequence.add_note(MidiNote::new(beat * 240, 200, 60 + (beat % 12) as u8, 100));
    }
    editor.add_midi_segment(midi, "Riff", sequence, Duration::ZERO).unwrap();
    composition
}

fn bench_render_block(c: &mut Criterion) {
    let mut composition = build_composition();
    let mut out = vec![0.0f32; BLOCK_FRAMES * 2];
    let mut frame = 0u64;

    c.bench_function("render_block_512", |b| {
        b.iter(|| {
            composition.render_frames(frame, BLOCK_FRAMES, &mut out);
            frame = (frame + BLOCK_FRAMES as u64) % (44100 * 4);
            black_box(&out);
        })
    });
}

criterion_group!(benches, bench_render_block);
criterion_main!(benches);
