//! Device output through cpal.
//!
//! Rendered blocks are queued into a lock-free ring; the device callback
//! drains it, converting to whatever sample format the device runs at.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use log::{error, info, warn};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::traits::{AudioError, AudioOutput};

/// Ring length in milliseconds of audio.
pub const RING_MILLIS: usize = 100;

/// Wait between attempts while the ring is full.
const FULL_RING_BACKOFF: Duration = Duration::from_millis(1);

/// An output device as reported by the default host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Output devices of the default host. Devices without a name are skipped.
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let Ok(devices) = host.output_devices() else {
        return Vec::new();
    };
    devices
        .filter_map(|d| d.name().ok())
        .map(|name| OutputDeviceInfo { is_default: default_name.as_deref() == Some(name.as_str()), name })
        .collect()
}

/// State shared with the device callback.
#[derive(Default)]
struct CallbackState {
    running: AtomicBool,
    underruns: AtomicU64,
}

/// A cpal output stream fed with interleaved `f32` frames.
pub struct CpalOutput {
    stream: Stream,
    producer: HeapProd<f32>,
    channels: u16,
    sample_rate: u32,
    state: Arc<CallbackState>,
}

impl CpalOutput {
    /// Open `device_name` (or the default device) at the composition's
    /// channel count and rate. The stream stays silent until `start`.
    pub fn open(device_name: Option<&str>, channels: u16, sample_rate: u32) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = find_device(&host, device_name)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
        let format = supported.sample_format();

        let mut config: StreamConfig = supported.into();
        config.channels = channels.max(1);
        config.sample_rate = cpal::SampleRate(sample_rate);

        let capacity = (sample_rate as usize * RING_MILLIS / 1000).max(1) * config.channels as usize;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let state = Arc::new(CallbackState::default());

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, state.clone()),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, state.clone()),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, state.clone()),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, consumer, state.clone()),
            other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        info!(
            "Audio output '{}' at {} Hz, {} ch ({:?})",
            device.name().unwrap_or_default(),
            sample_rate,
            config.channels,
            format
        );

        Ok(Self { stream, producer, channels: config.channels, sample_rate, state })
    }

    /// Callbacks that found the ring short of samples.
    pub fn underruns(&self) -> u64 {
        self.state.underruns.load(Ordering::Relaxed)
    }

    /// Samples queued but not yet played.
    pub fn queued(&self) -> usize {
        self.producer.occupied_len()
    }
}

fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<Device, AudioError> {
    let Some(name) = name else {
        return host.default_output_device().ok_or(AudioError::NoDevice);
    };
    let mut devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
    devices
        .find(|d| d.name().is_ok_and(|n| n.contains(name)))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<f32>,
    state: Arc<CallbackState>,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !state.running.load(Ordering::Relaxed) {
                    data.fill(T::EQUILIBRIUM);
                    return;
                }
                let mut short = false;
                for out in data.iter_mut() {
                    *out = match consumer.try_pop() {
                        Some(s) => T::from_sample(s),
                        None => {
                            short = true;
                            T::EQUILIBRIUM
                        }
                    };
                }
                if short {
                    state.underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamCreate(e.to_string()))
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Relaxed)
    }

    fn write(&mut self, samples: &[f32]) -> usize {
        let mut offset = 0;
        while offset < samples.len() {
            let pushed = self.producer.push_slice(&samples[offset..]);
            if pushed == 0 {
                if !self.is_running() {
                    break;
                }
                std::thread::sleep(FULL_RING_BACKOFF);
            }
            offset += pushed;
        }
        offset
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.state.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.state.running.store(false, Ordering::Relaxed);
        let underruns = self.underruns();
        if underruns > 0 {
            warn!("{} buffer underrun(s) during playback", underruns);
        }
        self.stream.pause().map_err(|e| AudioError::Playback(e.to_string()))
    }
}
