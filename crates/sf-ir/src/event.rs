//! MIDI event types shared by sequences, providers, and the renderer.

use alloc::string::String;
use alloc::vec::Vec;
use arrayvec::ArrayVec;

/// Center value of a 14-bit pitch bend.
pub const PITCH_BEND_CENTER: u16 = 8192;

/// Largest 14-bit pitch bend value.
pub const PITCH_BEND_MAX: u16 = 16383;

/// A channel voice message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// 14-bit bend, 0..=16383 with 8192 = center
    PitchBend { channel: u8, value: u16 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
}

impl MidiMessage {
    /// Parse a raw channel message. Running status and system messages
    /// are not handled.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;
        let channel = status & 0x0F;
        let byte = |i: usize| data.get(i).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(Self::NoteOff { channel, note: byte(1)?, velocity: byte(2)? }),
            0x90 => Some(Self::NoteOn { channel, note: byte(1)?, velocity: byte(2)? }),
            0xA0 => Some(Self::PolyPressure { channel, note: byte(1)?, pressure: byte(2)? }),
            0xB0 => Some(Self::ControlChange { channel, controller: byte(1)?, value: byte(2)? }),
            0xC0 => Some(Self::ProgramChange { channel, program: byte(1)? }),
            0xD0 => Some(Self::ChannelPressure { channel, pressure: byte(1)? }),
            0xE0 => {
                let lsb = byte(1)? as u16;
                let msb = byte(2)? as u16;
                Some(Self::PitchBend { channel, value: (msb << 7) | lsb })
            }
            _ => None,
        }
    }

    /// Encode as raw bytes (status first).
    pub fn to_bytes(&self) -> ArrayVec<u8, 3> {
        let mut out = ArrayVec::new();
        let status = |kind: u8, channel: u8| kind | (channel & 0x0F);
        match *self {
            Self::NoteOff { channel, note, velocity } => {
                out.extend([status(0x80, channel), note & 0x7F, velocity & 0x7F]);
            }
            Self::NoteOn { channel, note, velocity } => {
                out.extend([status(0x90, channel), note & 0x7F, velocity & 0x7F]);
            }
            Self::PolyPressure { channel, note, pressure } => {
                out.extend([status(0xA0, channel), note & 0x7F, pressure & 0x7F]);
            }
            Self::ControlChange { channel, controller, value } => {
                out.extend([status(0xB0, channel), controller & 0x7F, value & 0x7F]);
            }
            Self::ProgramChange { channel, program } => {
                out.extend([status(0xC0, channel), program & 0x7F]);
            }
            Self::ChannelPressure { channel, pressure } => {
                out.extend([status(0xD0, channel), pressure & 0x7F]);
            }
            Self::PitchBend { channel, value } => {
                let value = value.min(PITCH_BEND_MAX);
                out.extend([status(0xE0, channel), (value & 0x7F) as u8, (value >> 7) as u8]);
            }
        }
        out
    }

    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::PitchBend { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::ChannelPressure { channel, .. }
            | Self::PolyPressure { channel, .. } => channel,
        }
    }

    /// True for Note-On with non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// True for Note-Off, and for Note-On with velocity zero.
    pub fn is_note_off(&self) -> bool {
        matches!(self, Self::NoteOff { .. } | Self::NoteOn { velocity: 0, .. })
    }
}

/// A meta event carried in a sequence or file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetaEvent {
    /// Microseconds per quarter note (24-bit)
    Tempo(u32),
    TrackName(String),
    TimeSignature { numerator: u8, denominator_pow2: u8, clocks_per_click: u8, notated_32nds: u8 },
    EndOfTrack,
    /// Any other meta type, kept opaque
    Other { kind: u8, data: Vec<u8> },
}

impl MetaEvent {
    /// Decode a tempo from its big-endian byte triplet.
    pub fn tempo_from_be_bytes(bytes: [u8; 3]) -> Self {
        Self::Tempo(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// Big-endian byte triplet for a tempo event.
    pub fn tempo_be_bytes(micros_per_quarter: u32) -> [u8; 3] {
        let b = micros_per_quarter.min(0x00FF_FFFF).to_be_bytes();
        [b[1], b[2], b[3]]
    }
}

/// Payload of a timed MIDI event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Channel(MidiMessage),
    Meta(MetaEvent),
    /// System-Exclusive payload without the leading 0xF0
    SysEx(Vec<u8>),
}

/// A MIDI event at an absolute tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    pub tick: u64,
    pub kind: EventKind,
}

impl MidiEvent {
    pub fn new(tick: u64, kind: EventKind) -> Self {
        Self { tick, kind }
    }

    pub fn channel(tick: u64, message: MidiMessage) -> Self {
        Self::new(tick, EventKind::Channel(message))
    }

    pub fn meta(tick: u64, meta: MetaEvent) -> Self {
        Self::new(tick, EventKind::Meta(meta))
    }

    /// The channel message, if this is one.
    pub fn message(&self) -> Option<&MidiMessage> {
        match &self.kind {
            EventKind::Channel(m) => Some(m),
            _ => None,
        }
    }

    /// Ordering rank among events sharing a tick: note-offs first so a
    /// re-struck pitch is released before it sounds again.
    pub fn order_rank(&self) -> u8 {
        match &self.kind {
            EventKind::Meta(_) => 0,
            EventKind::Channel(m) if m.is_note_off() => 1,
            EventKind::Channel(MidiMessage::NoteOn { .. }) => 3,
            _ => 2,
        }
    }
}

/// Sort events ascending by tick, stable within equal (tick, rank).
pub fn sort_events(events: &mut [MidiEvent]) {
    events.sort_by_key(|e| (e.tick, e.order_rank()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_note_on_velocity_zero_is_note_off() {
        let m = MidiMessage::from_bytes(&[0x93, 60, 0]).unwrap();
        assert_eq!(m, MidiMessage::NoteOn { channel: 3, note: 60, velocity: 0 });
        assert!(m.is_note_off());
        assert!(!m.is_note_on());
    }

    #[test]
    fn parse_pitch_bend_center() {
        let m = MidiMessage::from_bytes(&[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(m, MidiMessage::PitchBend { channel: 0, value: PITCH_BEND_CENTER });
    }

    #[test]
    fn short_messages_rejected() {
        assert!(MidiMessage::from_bytes(&[]).is_none());
        assert!(MidiMessage::from_bytes(&[0x90, 60]).is_none());
        assert!(MidiMessage::from_bytes(&[0xF0, 1, 2]).is_none());
    }

    #[test]
    fn bytes_round_trip() {
        let msgs = [
            MidiMessage::NoteOn { channel: 1, note: 64, velocity: 100 },
            MidiMessage::ControlChange { channel: 15, controller: 7, value: 90 },
            MidiMessage::PitchBend { channel: 2, value: 12000 },
            MidiMessage::ProgramChange { channel: 0, program: 5 },
        ];
        for m in msgs {
            assert_eq!(MidiMessage::from_bytes(&m.to_bytes()), Some(m));
        }
    }

    #[test]
    fn tempo_triplet() {
        assert_eq!(MetaEvent::tempo_be_bytes(500_000), [0x07, 0xA1, 0x20]);
        assert_eq!(MetaEvent::tempo_from_be_bytes([0x07, 0xA1, 0x20]), MetaEvent::Tempo(500_000));
    }

    #[test]
    fn sort_puts_note_off_before_note_on() {
        let mut events = alloc::vec![
            MidiEvent::channel(10, MidiMessage::NoteOn { channel: 0, note: 60, velocity: 90 }),
            MidiEvent::channel(10, MidiMessage::NoteOff { channel: 0, note: 60, velocity: 0 }),
            MidiEvent::channel(5, MidiMessage::NoteOn { channel: 0, note: 60, velocity: 90 }),
        ];
        sort_events(&mut events);
        assert_eq!(events[0].tick, 5);
        assert!(events[1].message().unwrap().is_note_off());
        assert!(events[2].message().unwrap().is_note_on());
    }
}
