//! Offline rendering.

use std::time::Duration;

use log::info;
use sf_engine::Composition;
use sf_ir::time_to_frames;

/// Frames rendered per call when bouncing.
pub const RENDER_BLOCK_FRAMES: usize = 1024;

/// Render `duration` from the start of `composition` into an interleaved
/// buffer. The transport is left untouched.
pub fn render_offline(composition: &mut Composition, duration: Duration) -> Vec<f32> {
    let channels = composition.channels() as usize;
    let frames = time_to_frames(duration, composition.sample_rate()) as usize;
    let mut out = vec![0.0f32; frames * channels];

    let mut frame = 0usize;
    while frame < frames {
        let block = RENDER_BLOCK_FRAMES.min(frames - frame);
        let region = &mut out[frame * channels..(frame + block) * channels];
        composition.render_frames(frame as u64, block, region);
        frame += block;
    }
    info!("Rendered {} frames of '{}'", frames, composition.name);
    out
}

/// Length to bounce when no explicit duration is given: the composition's
/// end, capped at `max`.
pub fn bounce_length(composition: &Composition, max: Duration) -> Duration {
    composition.duration().min(max)
}
