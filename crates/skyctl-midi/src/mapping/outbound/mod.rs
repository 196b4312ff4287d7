//! Outbound mappings: simulator state → device LEDs and displays
//!
//! Evaluated once per flight-loop tick. Each evaluation yields at most one
//! [`OutboundTask`]; `reset` yields the rest state sent when the profile is
//! unloaded.

mod command;
mod dataref;

pub use command::CommandStateMapping;
pub use dataref::DatarefOutMapping;

use skyctl_core::{Environment, TextLogger};

use super::{MappingCommon, CFG_KEY_TYPE};
use crate::config::OutboundSendMode;
use crate::config_table::ConfigTable;
use crate::outbound_task::{OutboundMessageType, OutboundTask};
use crate::types::{MIDI_DATA_2_MAX, MIDI_DATA_2_MIN};

pub const CFG_KEY_DATA_2_ON: &str = "data_2_on";
pub const CFG_KEY_DATA_2_OFF: &str = "data_2_off";

/// How many watched values must agree before a state is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Every value must match
    All,
    /// At least one value must match
    One,
}

impl SendMode {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "all" => Some(Self::All),
            "one" => Some(Self::One),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::One => "one",
        }
    }

    /// Whether `matching` out of `total` values satisfy this mode
    pub fn is_satisfied(&self, matching: usize, total: usize) -> bool {
        match self {
            Self::All => total > 0 && matching == total,
            Self::One => matching > 0,
        }
    }
}

/// Closed set of outbound mapping variants
#[derive(Debug)]
pub enum OutboundMapping {
    Dataref(DatarefOutMapping),
    CommandState(CommandStateMapping),
}

impl OutboundMapping {
    /// Build a mapping from a profile table according to its `type` tag
    pub fn from_config(log: &TextLogger, table: &ConfigTable) -> Option<Self> {
        let tag = table.read_string(log, CFG_KEY_TYPE, true)?;

        match tag.as_str() {
            "drf" => Some(Self::Dataref(DatarefOutMapping::read_config(log, table))),
            "cmd" => Some(Self::CommandState(CommandStateMapping::read_config(log, table))),
            other => {
                log.error_at(
                    table.location(),
                    format!("Invalid mapping type '{}' for outbound mapping", other),
                );
                None
            }
        }
    }

    pub fn common(&self) -> &MappingCommon {
        match self {
            Self::Dataref(m) => &m.common,
            Self::CommandState(m) => &m.common,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Dataref(_) => "drf",
            Self::CommandState(_) => "cmd",
        }
    }

    pub fn check(&self, log: &TextLogger, env: &dyn Environment) -> bool {
        match self {
            Self::Dataref(m) => m.check(log, env),
            Self::CommandState(m) => m.check(log),
        }
    }

    /// Evaluate the mapping for this tick
    pub fn execute(
        &mut self,
        log: &TextLogger,
        env: &dyn Environment,
        mode: OutboundSendMode,
        sublayer: &str,
    ) -> Option<OutboundTask> {
        match self {
            Self::Dataref(m) => m.execute(log, env, mode, sublayer),
            Self::CommandState(m) => m.execute(env, mode, sublayer),
        }
    }

    /// Rest state of the control
    pub fn reset(&self) -> Option<OutboundTask> {
        rest_task(self.common())
    }

    pub fn map_text(&self, short: bool) -> &str {
        match self {
            Self::Dataref(m) => m.map_text(short),
            Self::CommandState(m) => m.map_text(short),
        }
    }
}

/// On/off data-2 pair shared by both outbound variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Data2Values {
    /// `None` if the configured value was unusable
    pub on: Option<u8>,
    pub off: Option<u8>,
}

impl Default for Data2Values {
    fn default() -> Self {
        Self {
            on: Some(MIDI_DATA_2_MAX),
            off: Some(MIDI_DATA_2_MIN),
        }
    }
}

impl Data2Values {
    pub(crate) fn read_config(log: &TextLogger, table: &ConfigTable) -> Self {
        let read = |key, default| {
            if table.contains(key) {
                table.read_midi_value(log, key, true)
            } else {
                Some(default)
            }
        };
        Self {
            on: read(CFG_KEY_DATA_2_ON, MIDI_DATA_2_MAX),
            off: read(CFG_KEY_DATA_2_OFF, MIDI_DATA_2_MIN),
        }
    }

    pub(crate) fn check(&self, log: &TextLogger, common: &MappingCommon) -> bool {
        let mut valid = true;
        for (key, value) in [(CFG_KEY_DATA_2_ON, self.on), (CFG_KEY_DATA_2_OFF, self.off)] {
            if value.is_none() {
                log.error_at(
                    common.source_line(),
                    format!(
                        "Parameter '{}' must be between {} and {}",
                        key, MIDI_DATA_2_MIN, MIDI_DATA_2_MAX
                    ),
                );
                valid = false;
            }
        }
        valid
    }
}

/// Task for the on or off state of a mapping
pub(crate) fn state_task(common: &MappingCommon, on: bool, data_2: u8, changed: bool) -> Option<OutboundTask> {
    let message_type = OutboundMessageType::for_state(common.data_1_type(), on);
    if message_type == OutboundMessageType::None {
        return None;
    }
    Some(OutboundTask {
        message_type,
        channel: common.channel(),
        data_1: common.data_1(),
        data_2,
        changed,
    })
}

fn rest_task(common: &MappingCommon) -> Option<OutboundTask> {
    state_task(common, false, MIDI_DATA_2_MIN, true)
}
