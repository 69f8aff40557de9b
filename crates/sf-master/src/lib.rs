//! Headless controller for soundflow.
//!
//! Provides a unified API for loading files, real-time playback, and
//! offline rendering that front ends (the CLI, tests) share.

mod cache;
mod render;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};
use sf_audio::{AudioError, AudioOutput, CpalOutput, RING_MILLIS};
use sf_engine::share_provider;

// Re-export common types so callers don't need sf-ir/sf-engine directly.
pub use sf_engine::{AudioSegment, Composition, CompositionConfig, CompositionError};
pub use sf_audio::{list_output_devices, OutputDeviceInfo};
pub use sf_formats::FormatError;
pub use sf_ir::Uuid;

pub use cache::ProviderCache;
pub use render::{bounce_length, render_offline, RENDER_BLOCK_FRAMES};

/// Frames handed to the audio output per lock of the composition.
pub const PLAYBACK_BLOCK_FRAMES: usize = 256;

/// Error type for controller operations.
#[derive(Debug)]
pub enum ControllerError {
    Format(FormatError),
    Composition(CompositionError),
    Audio(AudioError),
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerError::Format(e) => write!(f, "{}", e),
            ControllerError::Composition(e) => write!(f, "{}", e),
            ControllerError::Audio(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<FormatError> for ControllerError {
    fn from(e: FormatError) -> Self {
        ControllerError::Format(e)
    }
}

impl From<CompositionError> for ControllerError {
    fn from(e: CompositionError) -> Self {
        ControllerError::Composition(e)
    }
}

impl From<AudioError> for ControllerError {
    fn from(e: AudioError) -> Self {
        ControllerError::Audio(e)
    }
}

impl From<std::io::Error> for ControllerError {
    fn from(e: std::io::Error) -> Self {
        ControllerError::Format(e.into())
    }
}

/// Headless controller: owns a composition and manages playback.
pub struct Controller {
    composition: Arc<Mutex<Composition>>,
    providers: ProviderCache,
    cancel: Arc<AtomicBool>,
    output_device: Option<String>,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    current_frame: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(config: CompositionConfig) -> Result<Self, ControllerError> {
        Ok(Self::with_composition(Composition::new("Untitled", config)?))
    }

    pub fn with_composition(composition: Composition) -> Self {
        Self {
            composition: Arc::new(Mutex::new(composition)),
            providers: ProviderCache::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            output_device: None,
            playback: None,
        }
    }

    // --- Composition access ---

    /// Shared handle, e.g. for a [`sf_engine::CompositionSource`].
    pub fn composition(&self) -> Arc<Mutex<Composition>> {
        self.composition.clone()
    }

    /// Lock the composition. A poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, Composition> {
        lock(&self.composition)
    }

    pub fn providers(&self) -> &ProviderCache {
        &self.providers
    }

    // --- Loading ---

    /// Flag that aborts loads in progress. Cleared when a new load starts.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn cancel_loads(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Place a WAV file on `track` at `timeline_start`. Decoded data is
    /// cached per path.
    pub fn add_wav_segment(
        &mut self,
        track: Uuid,
        path: &Path,
        timeline_start: Duration,
    ) -> Result<Uuid, ControllerError> {
        self.cancel.store(false, Ordering::Relaxed);
        let provider = self.providers.get_or_load(path, &self.cancel)?;
        let name = path.file_stem().map_or_else(|| "Audio".to_string(), |s| s.to_string_lossy().into_owned());
        let segment = AudioSegment::from_provider(&name, share_provider(provider), timeline_start, true);
        let id = self.lock().editor().add_segment(track, segment)?;
        info!("Added '{}' at {:?}", name, timeline_start);
        Ok(id)
    }

    /// Import a Standard MIDI File's tracks into the composition.
    pub fn import_midi(&mut self, path: &Path) -> Result<Vec<Uuid>, ControllerError> {
        let data = std::fs::read(path)?;
        let ids = sf_formats::import_smf(&mut self.lock(), &data)?;
        Ok(ids)
    }

    pub fn export_midi(&self, path: &Path) -> Result<(), ControllerError> {
        let bytes = sf_formats::export_smf(&self.lock())?;
        std::fs::write(path, bytes)?;
        info!("Wrote {}", path.display());
        Ok(())
    }

    /// Append a built-in modifier to the master chain by name.
    pub fn add_master_modifier(&self, name: &str) -> Result<(), ControllerError> {
        let modifier = sf_engine::modifiers::create_modifier(name).ok_or_else(|| {
            CompositionError::InvalidArgument(format!(
                "unknown modifier '{}' (built in: {})",
                name,
                sf_engine::modifiers::BUILTIN_MODIFIERS.join(", ")
            ))
        })?;
        self.lock().editor().add_master_modifier(modifier);
        info!("Master modifier '{}'", name);
        Ok(())
    }

    // --- Real-time playback ---

    /// Output device for the next `play`, matched by name substring.
    /// `None` selects the host default.
    pub fn set_output_device(&mut self, name: Option<String>) {
        self.output_device = name;
    }

    pub fn play(&mut self) {
        self.stop();

        let composition = self.composition.clone();
        let device = self.output_device.clone();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let current_frame = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stop = stop_signal.clone();
        let frame = current_frame.clone();
        let done = finished.clone();

        let thread = std::thread::spawn(move || {
            audio_thread(composition, device, stop, frame, done);
        });

        self.playback = Some(PlaybackHandle {
            stop_signal,
            current_frame,
            finished,
            thread: Some(thread),
        });
    }

    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
            self.lock().stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    /// Playback position as last published by the audio thread.
    pub fn position(&self) -> Option<Duration> {
        let pb = self.playback.as_ref()?;
        if pb.finished.load(Ordering::Relaxed) {
            return None;
        }
        let frame = pb.current_frame.load(Ordering::Relaxed);
        Some(sf_ir::frames_to_time(frame, self.lock().sample_rate()))
    }

    // --- Offline rendering ---

    /// Render up to `max` (or the composition's end, if shorter).
    pub fn render(&self, max: Duration) -> Vec<f32> {
        let mut composition = self.lock();
        let length = bounce_length(&composition, max);
        render_offline(&mut composition, length)
    }

    /// Render to a 16-bit WAV file. Returns the frames written.
    pub fn render_to_wav(&self, path: &Path, max: Duration) -> Result<usize, ControllerError> {
        let samples = self.render(max);
        let (channels, sample_rate) = {
            let c = self.lock();
            (c.channels(), c.sample_rate())
        };
        sf_formats::write_wav_file(path, &samples, channels, sample_rate)?;
        Ok(samples.len() / channels as usize)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(composition: &Mutex<Composition>) -> MutexGuard<'_, Composition> {
    match composition.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn audio_thread(
    composition: Arc<Mutex<Composition>>,
    device: Option<String>,
    stop_signal: Arc<AtomicBool>,
    current_frame: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
) {
    let (channels, sample_rate) = {
        let mut c = lock(&composition);
        c.play();
        (c.channels(), c.sample_rate())
    };

    let mut output = match open_output(device.as_deref(), channels, sample_rate) {
        Ok(output) => output,
        Err(e) => {
            warn!("Playback unavailable: {}", e);
            finished.store(true, Ordering::Relaxed);
            return;
        }
    };

    let mut block = vec![0.0f32; PLAYBACK_BLOCK_FRAMES * channels as usize];
    while !stop_signal.load(Ordering::Relaxed) {
        let (written, cursor) = {
            let mut c = lock(&composition);
            let written = read_block(&mut c, &mut block);
            (written, c.transport().cursor())
        };
        output.write(&block[..written]);
        current_frame.store(cursor, Ordering::Relaxed);
        if written < block.len() {
            break;
        }
    }

    // Let the queued tail play out before the stream is dropped.
    if !stop_signal.load(Ordering::Relaxed) {
        for _ in 0..RING_MILLIS * 2 / 5 {
            if output.queued() == 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
    if let Err(e) = output.stop() {
        warn!("{}", e);
    }
    finished.store(true, Ordering::Relaxed);
}

fn open_output(device: Option<&str>, channels: u16, sample_rate: u32) -> Result<CpalOutput, AudioError> {
    let mut output = CpalOutput::open(device, channels, sample_rate)?;
    output.start()?;
    Ok(output)
}

#[cfg(not(feature = "alloc_check"))]
fn read_block(composition: &mut Composition, block: &mut [f32]) -> usize {
    composition.read_samples(block)
}

#[cfg(feature = "alloc_check")]
fn read_block(composition: &mut Composition, block: &mut [f32]) -> usize {
    assert_no_alloc::assert_no_alloc(|| composition.read_samples(block))
}
