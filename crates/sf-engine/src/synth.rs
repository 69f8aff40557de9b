//! ToneSynth: a small polyphonic oscillator synth used as the default
//! MIDI track target.
//!
//! Voices live in a pre-sized `SlotMap`; when it is full the synth steals
//! a voice (released voices first, then the oldest).

use slotmap::{new_key_type, SlotMap};

use sf_ir::{MidiMessage, PITCH_BEND_CENTER};

use crate::destination::MidiDestination;
use crate::frequency::{bend_to_semitones, note_to_hz, phase_increment, DEFAULT_BEND_RANGE};

/// Maximum number of simultaneous voices.
pub const MAX_VOICES: usize = 32;

/// Output level of one full-velocity voice.
const VOICE_GAIN: f32 = 0.2;

const CC_VOLUME: u8 = 7;
const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

new_key_type! {
    /// Identifier for a voice slot.
    pub struct VoiceKey;
}

/// Oscillator shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    #[default]
    Sine,
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    /// Sample at `phase` in cycles, [0, 1).
    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * std::f32::consts::TAU).sin(),
            Waveform::Saw => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// Voice lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VoiceState {
    Active,
    Released,
}

#[derive(Clone, Debug)]
struct ToneVoice {
    channel: u8,
    note: u8,
    velocity: f32,
    phase: f32,
    /// Envelope level, 0..1
    level: f32,
    state: VoiceState,
    /// Allocation order, for stealing
    serial: u64,
}

impl ToneVoice {
    fn finished(&self) -> bool {
        self.state == VoiceState::Released && self.level <= 0.0
    }
}

/// Polyphonic oscillator synth.
pub struct ToneSynth {
    name: String,
    voices: SlotMap<VoiceKey, ToneVoice>,
    waveform: Waveform,
    /// Envelope step per sample while attacking
    attack_step: f32,
    /// Envelope step per sample while releasing
    release_step: f32,
    attack_secs: f32,
    release_secs: f32,
    sample_rate: u32,
    bend: [f32; 16],
    volume: [f32; 16],
    next_serial: u64,
}

impl ToneSynth {
    pub fn new(name: &str) -> Self {
        let mut synth = Self {
            name: name.to_string(),
            voices: SlotMap::with_capacity_and_key(MAX_VOICES),
            waveform: Waveform::Sine,
            attack_step: 1.0,
            release_step: 1.0,
            attack_secs: 0.005,
            release_secs: 0.05,
            sample_rate: 0,
            bend: [0.0; 16],
            volume: [1.0; 16],
            next_serial: 0,
        };
        synth.update_envelope(44100);
        synth
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    /// Attack and release times in seconds.
    pub fn with_envelope(mut self, attack_secs: f32, release_secs: f32) -> Self {
        self.attack_secs = attack_secs.max(0.0);
        self.release_secs = release_secs.max(0.0);
        let rate = self.sample_rate;
        self.sample_rate = 0;
        self.update_envelope(rate.max(1));
        self
    }

    /// Count of sounding voices.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn update_envelope(&mut self, sample_rate: u32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        let step = |secs: f32| {
            let samples = secs * sample_rate as f32;
            if samples < 1.0 {
                1.0
            } else {
                1.0 / samples
            }
        };
        self.attack_step = step(self.attack_secs);
        self.release_step = step(self.release_secs);
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        // Retrigger: release any voice already playing this key.
        self.note_off(channel, note);
        if self.voices.len() >= MAX_VOICES {
            if let Some(victim) = self.steal_candidate() {
                self.voices.remove(victim);
            }
        }
        let serial = self.next_serial;
        self.next_serial += 1;
        self.voices.insert(ToneVoice {
            channel,
            note,
            velocity: velocity as f32 / 127.0,
            phase: 0.0,
            level: 0.0,
            state: VoiceState::Active,
            serial,
        });
    }

    /// Released voices first, then the oldest.
    fn steal_candidate(&self) -> Option<VoiceKey> {
        self.voices
            .iter()
            .min_by_key(|(_, v)| (v.state == VoiceState::Active, v.serial))
            .map(|(k, _)| k)
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        for (_, voice) in self.voices.iter_mut() {
            if voice.channel == channel && voice.note == note && voice.state == VoiceState::Active {
                voice.state = VoiceState::Released;
            }
        }
    }

    fn all_notes_off(&mut self, channel: u8) {
        for (_, voice) in self.voices.iter_mut() {
            if voice.channel == channel {
                voice.state = VoiceState::Released;
            }
        }
    }
}

impl MidiDestination for ToneSynth {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_message(&mut self, message: &MidiMessage) {
        match *message {
            MidiMessage::NoteOn { channel, note, velocity } if velocity > 0 => {
                self.note_on(channel & 0x0F, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, .. } | MidiMessage::NoteOff { channel, note, .. } => {
                self.note_off(channel & 0x0F, note)
            }
            MidiMessage::PitchBend { channel, value } => {
                self.bend[(channel & 0x0F) as usize] = bend_to_semitones(value, DEFAULT_BEND_RANGE);
            }
            MidiMessage::ControlChange { channel, controller, value } => match controller {
                CC_VOLUME => self.volume[(channel & 0x0F) as usize] = value as f32 / 127.0,
                CC_ALL_SOUND_OFF => self.voices.retain(|_, v| v.channel != (channel & 0x0F)),
                CC_ALL_NOTES_OFF => self.all_notes_off(channel & 0x0F),
                _ => {}
            },
            _ => {}
        }
    }

    fn produces_audio(&self) -> bool {
        true
    }

    fn render(&mut self, out: &mut [f32], channels: u16, sample_rate: u32) {
        self.update_envelope(sample_rate);
        let channels = channels.max(1) as usize;
        let waveform = self.waveform;
        let (attack, release) = (self.attack_step, self.release_step);

        for (_, voice) in self.voices.iter_mut() {
            let ch = voice.channel as usize;
            let hz = note_to_hz(voice.note as f32 + self.bend[ch]);
            let inc = phase_increment(hz, sample_rate);
            let gain = voice.velocity * self.volume[ch] * VOICE_GAIN;

            for frame in out.chunks_exact_mut(channels) {
                match voice.state {
                    VoiceState::Active => voice.level = (voice.level + attack).min(1.0),
                    VoiceState::Released => voice.level = (voice.level - release).max(0.0),
                }
                if voice.finished() {
                    break;
                }
                let s = waveform.sample(voice.phase) * voice.level * gain;
                for sample in frame.iter_mut() {
                    *sample += s;
                }
                voice.phase += inc;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }
            }
        }
        self.voices.retain(|_, v| !v.finished());
    }

    fn reset(&mut self) {
        self.voices.clear();
        self.bend = [0.0; 16];
        self.volume = [1.0; 16];
    }
}

impl Default for ToneSynth {
    fn default() -> Self {
        Self::new("Tone Synth")
    }
}
