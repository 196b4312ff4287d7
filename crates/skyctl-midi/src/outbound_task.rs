//! Outbound tasks: one MIDI message for a device LED or display
//!
//! Produced by outbound mappings each tick (or on reset) and handed straight
//! to the device output. Nothing keeps them around afterwards.

use crate::types::{Data1Type, MIDI_DATA_2_MAX};

/// Wire message type of an outbound task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutboundMessageType {
    #[default]
    None,
    ControlChange,
    NoteOn,
    NoteOff,
    PitchBend,
    ProgramChange,
}

impl OutboundMessageType {
    /// Message type for a mapping's data-1 type in the on or off state
    ///
    /// Only notes distinguish on from off, every other type has one shape.
    pub fn for_state(data_1_type: Data1Type, on: bool) -> Self {
        match data_1_type {
            Data1Type::None => Self::None,
            Data1Type::ControlChange => Self::ControlChange,
            Data1Type::Note if on => Self::NoteOn,
            Data1Type::Note => Self::NoteOff,
            Data1Type::PitchBend => Self::PitchBend,
            Data1Type::ProgramChange => Self::ProgramChange,
        }
    }
}

/// One MIDI message to transmit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundTask {
    pub message_type: OutboundMessageType,
    pub channel: u8,
    pub data_1: u8,
    pub data_2: u8,
    /// A watched value changed this tick
    pub changed: bool,
}

impl OutboundTask {
    /// Serialize to MIDI bytes, `None` for [`OutboundMessageType::None`]
    ///
    /// Pitch bend sends `data_2` as MSB with a zero LSB.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let channel = self.channel & 0x0F;
        let data_1 = self.data_1.min(MIDI_DATA_2_MAX);
        let data_2 = self.data_2.min(MIDI_DATA_2_MAX);

        let bytes = match self.message_type {
            OutboundMessageType::None => return None,
            OutboundMessageType::NoteOn => vec![0x90 | channel, data_1, data_2],
            OutboundMessageType::NoteOff => vec![0x80 | channel, data_1, data_2],
            OutboundMessageType::ControlChange => vec![0xB0 | channel, data_1, data_2],
            OutboundMessageType::ProgramChange => vec![0xC0 | channel, data_2],
            OutboundMessageType::PitchBend => vec![0xE0 | channel, 0x00, data_2],
        };

        Some(bytes)
    }
}
