//! Mapping engine
//!
//! A mapping ties one MIDI control (channel + data-1) to simulator behaviour.
//! Inbound mappings react to received messages, outbound mappings watch the
//! simulator and produce [`OutboundTask`](crate::OutboundTask)s for LEDs and
//! displays. Both families share [`MappingCommon`].
//!
//! Every mapping is built from one profile table, validated once with
//! `check`, and only then becomes part of the active profile.

pub mod inbound;
pub mod outbound;

use serde_yaml::{Mapping, Value};
use skyctl_core::TextLogger;
use std::sync::OnceLock;

use crate::config_table::ConfigTable;
use crate::types::{mapping_key, Data1Type, DEFAULT_CHANNEL, MIDI_CHANNEL_MAX};

pub use inbound::{ExecuteStatus, InboundMapping};
pub use outbound::{OutboundMapping, SendMode};

/// Profile key of the channel
pub const CFG_KEY_CHANNEL: &str = "ch";
/// Profile key of the sublayer
pub const CFG_KEY_SUBLAYER: &str = "sl";
/// Profile key of the mapping type tag
pub const CFG_KEY_TYPE: &str = "type";

/// Data-1 selectors in the order they are looked up
const DATA_1_SELECTORS: [Data1Type; 4] = [
    Data1Type::ControlChange,
    Data1Type::Note,
    Data1Type::PitchBend,
    Data1Type::ProgramChange,
];

/// Fields shared by all mappings
#[derive(Debug, Default)]
pub struct MappingCommon {
    channel: Option<u8>,
    data_1_type: Data1Type,
    data_1: Option<u8>,
    sublayer: Option<String>,
    source_line: String,
    text_short: OnceLock<String>,
    text_long: OnceLock<String>,
}

impl MappingCommon {
    /// Build directly from values
    pub fn new(channel: u8, data_1_type: Data1Type, data_1: u8) -> Self {
        let data_1 = match data_1_type {
            Data1Type::PitchBend => 0,
            _ => data_1,
        };
        Self {
            channel: Some(channel),
            data_1_type,
            data_1: Some(data_1),
            ..Self::default()
        }
    }

    pub fn with_sublayer(mut self, sublayer: &str) -> Self {
        self.sublayer = (!sublayer.is_empty()).then(|| sublayer.to_string());
        self
    }

    /// Read channel, data-1 and (optionally) the sublayer
    ///
    /// A missing channel falls back to channel 11. A missing data-1 selector
    /// is logged as an error and leaves the type at `None`, which makes
    /// [`check`](Self::check) fail.
    pub fn read_common_config(log: &TextLogger, table: &ConfigTable, read_sublayer: bool) -> Self {
        let mut common = Self {
            source_line: table.location().to_string(),
            ..Self::default()
        };

        common.read_channel(log, table);
        common.read_data_1(log, table);

        if read_sublayer {
            common.sublayer = table
                .read_string(log, CFG_KEY_SUBLAYER, false)
                .filter(|sl| !sl.is_empty());
            if let Some(ref sl) = common.sublayer {
                log.debug_at(table.location(), format!("Parameter '{}' = '{}'", CFG_KEY_SUBLAYER, sl));
            }
        }

        common
    }

    fn read_channel(&mut self, log: &TextLogger, table: &ConfigTable) {
        if table.contains(CFG_KEY_CHANNEL) {
            self.channel = table.read_ranged(
                log,
                CFG_KEY_CHANNEL,
                true,
                0,
                i64::from(MIDI_CHANNEL_MAX),
            );
            if let Some(ch) = self.channel {
                log.debug_at(table.location(), format!("Parameter '{}' = '{}'", CFG_KEY_CHANNEL, ch));
            }
        } else {
            self.channel = Some(DEFAULT_CHANNEL);
            log.info(format!(
                " --> {} :: Parameter '{}' is missing, will use default channel '{}'",
                table.location(),
                CFG_KEY_CHANNEL,
                DEFAULT_CHANNEL
            ));
        }
    }

    fn read_data_1(&mut self, log: &TextLogger, table: &ConfigTable) {
        let Some(data_1_type) = DATA_1_SELECTORS
            .into_iter()
            .find(|t| table.contains(t.config_key()))
        else {
            log.error_at(table.location(), "Parameter for MIDI type is missing");
            return;
        };

        self.data_1_type = data_1_type;
        self.data_1 = match data_1_type {
            // Pitch bend has no data-1, the key only marks the type
            Data1Type::PitchBend => Some(0),
            _ => table.read_midi_value(log, data_1_type.config_key(), true),
        };

        if let Some(data_1) = self.data_1 {
            log.debug_at(
                table.location(),
                format!("Parameter '{}' = '{}'", data_1_type.config_key(), data_1),
            );
        }
    }

    /// Minimum requirements of every mapping
    pub fn check(&self, _log: &TextLogger) -> bool {
        self.channel.is_some() && self.data_1.is_some() && self.data_1_type != Data1Type::None
    }

    /// Whether the mapping is active for the given sublayer
    pub fn check_sublayer(&self, active_sublayer: &str) -> bool {
        match self.sublayer {
            Some(ref sl) => sl == active_sublayer,
            None => true,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel.unwrap_or(DEFAULT_CHANNEL)
    }

    pub fn data_1_type(&self) -> Data1Type {
        self.data_1_type
    }

    pub fn data_1(&self) -> u8 {
        self.data_1.unwrap_or_default()
    }

    pub fn sublayer(&self) -> Option<&str> {
        self.sublayer.as_deref()
    }

    /// Where the mapping was defined
    pub fn source_line(&self) -> &str {
        &self.source_line
    }

    /// Dispatch key, see [`mapping_key`]
    pub fn key(&self) -> String {
        mapping_key(self.channel(), self.data_1_type, self.data_1())
    }

    /// Cached description, built on first use
    pub fn map_text(&self, short: bool, build: impl FnOnce() -> String) -> &str {
        let cell = if short {
            &self.text_short
        } else {
            &self.text_long
        };
        cell.get_or_init(build)
    }

    /// Write channel, data-1 and sublayer back into a profile table
    pub fn write_config(&self, table: &mut Mapping) {
        table.insert(CFG_KEY_CHANNEL.into(), Value::from(self.channel()));
        if self.data_1_type != Data1Type::None {
            table.insert(
                self.data_1_type.config_key().into(),
                Value::from(self.data_1()),
            );
        }
        if let Some(ref sl) = self.sublayer {
            table.insert(CFG_KEY_SUBLAYER.into(), Value::from(sl.as_str()));
        }
    }
}

/// Builder for mapping descriptions
///
/// The short form is a single comma separated line. The long form starts
/// with a title and the sublayer and puts every entry on its own line.
pub(crate) struct MapText {
    short: bool,
    parts: Vec<String>,
}

impl MapText {
    pub(crate) fn new(short: bool, title: &str, common: &MappingCommon) -> Self {
        let mut parts = Vec::new();
        if !short {
            parts.push(format!(" ====== {} ======", title));
            if let Some(sl) = common.sublayer() {
                parts.push(format!("Sublayer = '{}'", sl));
            }
        }
        Self { short, parts }
    }

    pub(crate) fn push(&mut self, part: impl Into<String>) -> &mut Self {
        self.parts.push(part.into());
        self
    }

    pub(crate) fn finish(&mut self) -> String {
        let sep = if self.short { ", " } else { "\n" };
        self.parts.join(sep)
    }
}
