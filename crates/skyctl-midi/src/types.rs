//! Logical MIDI message model
//!
//! Raw bytes from the device are parsed with midly into a [`MidiMessage`],
//! which is what the profile dispatches on. Mappings are indexed by a textual
//! key built from channel, data-1 type and data-1, see [`mapping_key`].

use midly::live::LiveEvent;
use midly::MidiMessage as WireMessage;

/// Lowest MIDI data-2 value
pub const MIDI_DATA_2_MIN: u8 = 0;

/// Highest MIDI data-2 value
pub const MIDI_DATA_2_MAX: u8 = 127;

/// Centre value of relative encoders
pub const MIDI_DATA_2_CENTER: u8 = 64;

/// Channel used when a mapping doesn't specify one
pub const DEFAULT_CHANNEL: u8 = 11;

/// Highest valid MIDI channel number
pub const MIDI_CHANNEL_MAX: u8 = 15;

/// What data-1 of a mapping refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Data1Type {
    #[default]
    None,
    ControlChange,
    Note,
    PitchBend,
    ProgramChange,
}

impl Data1Type {
    /// Short code used in mapping keys
    pub fn code(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::ControlChange => "CC",
            Self::Note => "NOTE",
            Self::PitchBend => "PB",
            Self::ProgramChange => "PC",
        }
    }

    /// Configuration key that selects this type
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::ControlChange => "cc",
            Self::Note => "note",
            Self::PitchBend => "pitch_bend",
            Self::ProgramChange => "program_change",
        }
    }
}

/// Build the dispatch key `"{channel}|{type_code}|{data_1}"`
pub fn mapping_key(channel: u8, data_1_type: Data1Type, data_1: u8) -> String {
    format!("{}|{}|{}", channel, data_1_type.code(), data_1)
}

/// Type of a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MidiMessageType {
    ControlChange,
    NoteOn,
    NoteOff,
    PitchBend,
    ProgramChange,
}

impl MidiMessageType {
    /// Data-1 type used to look up mappings for this message
    pub fn data_1_type(&self) -> Data1Type {
        match self {
            Self::ControlChange => Data1Type::ControlChange,
            Self::NoteOn | Self::NoteOff => Data1Type::Note,
            Self::PitchBend => Data1Type::PitchBend,
            Self::ProgramChange => Data1Type::ProgramChange,
        }
    }
}

/// One received MIDI message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    pub message_type: MidiMessageType,
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Controller, note or program number (0 for pitch bend)
    pub data_1: u8,
    /// Value or velocity (MSB of the bend for pitch bend, 0 for program change)
    pub data_2: u8,
}

impl MidiMessage {
    pub fn new(message_type: MidiMessageType, channel: u8, data_1: u8, data_2: u8) -> Self {
        Self {
            message_type,
            channel,
            data_1,
            data_2,
        }
    }

    /// Parse raw MIDI bytes
    ///
    /// Only channel voice messages the mappings can react to are returned.
    /// Note On with velocity 0 is treated as Note Off.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let LiveEvent::Midi { channel, message } = LiveEvent::parse(data).ok()? else {
            return None;
        };
        let channel = channel.as_int();

        let parsed = match message {
            WireMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                Self::new(MidiMessageType::NoteOff, channel, key.as_int(), 0)
            }
            WireMessage::NoteOn { key, vel } => {
                Self::new(MidiMessageType::NoteOn, channel, key.as_int(), vel.as_int())
            }
            WireMessage::NoteOff { key, vel } => {
                Self::new(MidiMessageType::NoteOff, channel, key.as_int(), vel.as_int())
            }
            WireMessage::Controller { controller, value } => Self::new(
                MidiMessageType::ControlChange,
                channel,
                controller.as_int(),
                value.as_int(),
            ),
            WireMessage::PitchBend { bend } => Self::new(
                MidiMessageType::PitchBend,
                channel,
                0,
                (bend.0.as_int() >> 7) as u8,
            ),
            WireMessage::ProgramChange { program } => Self::new(
                MidiMessageType::ProgramChange,
                channel,
                program.as_int(),
                0,
            ),
            _ => return None,
        };

        Some(parsed)
    }

    pub fn data_1_type(&self) -> Data1Type {
        self.message_type.data_1_type()
    }

    /// Key of the mappings this message is dispatched to
    pub fn key(&self) -> String {
        mapping_key(self.channel, self.data_1_type(), self.data_1)
    }

    /// Button went down (Note On, or a CC with a non-zero value)
    pub fn is_press(&self) -> bool {
        match self.message_type {
            MidiMessageType::NoteOn => true,
            MidiMessageType::ControlChange => self.data_2 > MIDI_DATA_2_MIN,
            _ => false,
        }
    }

    /// Button came up (Note Off, or a CC with value 0)
    pub fn is_release(&self) -> bool {
        match self.message_type {
            MidiMessageType::NoteOff => true,
            MidiMessageType::ControlChange => self.data_2 == MIDI_DATA_2_MIN,
            _ => false,
        }
    }
}
