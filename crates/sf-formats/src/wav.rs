//! WAV encoding and decoding for PCM audio.

use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};
use sf_engine::{share_provider, AudioSegment, MAX_CHANNELS};
use sf_ir::RawDataProvider;

use crate::FormatError;

/// Samples decoded between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 64 * 1024;

// --- Writing ---

/// Encode interleaved `f32` samples as 16-bit PCM. Samples are clamped to
/// [-1, 1] before quantizing.
pub fn write_wav<W: Write + Seek>(
    w: W,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<(), FormatError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::new(w, spec)?;
    for &sample in samples {
        writer.write_sample(quantize_i16(sample))?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn samples_to_wav(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Vec<u8>, FormatError> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav(&mut cursor, samples, channels, sample_rate)?;
    Ok(cursor.into_inner())
}

pub fn write_wav_file(
    path: &Path,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<(), FormatError> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_wav(file, samples, channels, sample_rate)?;
    info!(
        "Wrote {} frames to {}",
        samples.len() / channels.max(1) as usize,
        path.display()
    );
    Ok(())
}

fn quantize_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

// --- Reading ---

/// Decode a WAV file held in memory.
pub fn load_wav(data: &[u8]) -> Result<RawDataProvider, FormatError> {
    decode(Cursor::new(data), None)
}

/// Decode a WAV file from disk. `cancel` is checked before opening and
/// periodically while samples are read; a set flag aborts the load with
/// [`FormatError::Cancelled`] and nothing is returned.
pub fn load_wav_file(path: &Path, cancel: &AtomicBool) -> Result<RawDataProvider, FormatError> {
    if cancel.load(Ordering::Relaxed) {
        return Err(FormatError::Cancelled);
    }
    let file = std::io::BufReader::new(std::fs::File::open(path)?);
    let provider = decode(file, Some(cancel))?;
    info!("Loaded {}", path.display());
    Ok(provider)
}

/// Load a WAV file as a segment that owns its provider.
pub fn segment_from_wav_file(
    path: &Path,
    name: &str,
    timeline_start: Duration,
    cancel: &AtomicBool,
) -> Result<AudioSegment, FormatError> {
    let provider = load_wav_file(path, cancel)?;
    Ok(AudioSegment::from_provider(name, share_provider(provider), timeline_start, true))
}

fn decode<R: Read>(reader: R, cancel: Option<&AtomicBool>) -> Result<RawDataProvider, FormatError> {
    let reader = hound::WavReader::new(reader)?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.channels > MAX_CHANNELS {
        return Err(FormatError::UnsupportedVersion);
    }
    if spec.sample_rate == 0 {
        return Err(FormatError::InvalidHeader);
    }
    debug!(
        "WAV: {} ch, {} Hz, {} bit {:?}",
        spec.channels, spec.sample_rate, spec.bits_per_sample, spec.sample_format
    );

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => collect(reader.into_samples::<f32>(), cancel, |s| s)?,
        hound::SampleFormat::Int => {
            if !(8..=32).contains(&spec.bits_per_sample) {
                return Err(FormatError::UnsupportedVersion);
            }
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            collect(reader.into_samples::<i32>(), cancel, |s| s as f32 * scale)?
        }
    };

    Ok(RawDataProvider::new(samples, spec.channels, spec.sample_rate))
}

fn collect<T, I>(
    samples: I,
    cancel: Option<&AtomicBool>,
    convert: impl Fn(T) -> f32,
) -> Result<Vec<f32>, FormatError>
where
    I: Iterator<Item = hound::Result<T>>,
{
    let mut out = Vec::with_capacity(samples.size_hint().0);
    for (i, sample) in samples.enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Err(FormatError::Cancelled);
        }
        out.push(convert(sample?));
    }
    Ok(out)
}
