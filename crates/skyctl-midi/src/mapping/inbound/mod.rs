//! Inbound mappings: MIDI message → simulator
//!
//! | tag   | variant                 | effect                                   |
//! |-------|-------------------------|------------------------------------------|
//! | `cmd` | [`CommandMapping`]      | execute a command on every message       |
//! | `sld` | [`SliderMapping`]       | scale data-2 into a dataref range        |
//! | `enc` | [`EncoderMapping`]      | step a dataref or fire up/down commands  |
//! | `pnp` | [`PushPullMapping`]     | short press = push, long press = pull    |
//! | `int` | [`InternalMapping`]     | host specific action                     |

mod command;
mod encoder;
mod internal;
mod push_pull;
mod slider;

pub use command::CommandMapping;
pub use encoder::{EncoderDirection, EncoderMapping};
pub use internal::InternalMapping;
pub use push_pull::{PressRouter, PushPullMapping, PushPullTimer, PUSH_PULL_THRESHOLD_MICROS};
pub use slider::SliderMapping;

use skyctl_core::{Environment, TextLogger};
use std::sync::Arc;

use super::{MappingCommon, CFG_KEY_TYPE};
use crate::clock::Clock;
use crate::config::EncoderMode;
use crate::config_table::ConfigTable;
use crate::types::MidiMessage;

pub const CFG_KEY_COMMAND: &str = "command";
pub const CFG_KEY_COMMAND_UP: &str = "command_up";
pub const CFG_KEY_COMMAND_DOWN: &str = "command_down";
pub const CFG_KEY_COMMAND_FAST_UP: &str = "command_fast_up";
pub const CFG_KEY_COMMAND_FAST_DOWN: &str = "command_fast_down";
pub const CFG_KEY_DATAREF: &str = "dataref";
pub const CFG_KEY_VALUE_MIN: &str = "value_min";
pub const CFG_KEY_VALUE_MAX: &str = "value_max";

/// Outcome of executing an inbound mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteStatus {
    /// The message was handled (including "nothing to do")
    Completed,
    /// Not decided yet, execute again on the next flight-loop tick
    Deferred,
}

/// Everything a mapping needs from its device while being built
#[derive(Clone)]
pub struct InboundContext {
    /// Encoder mode used when a mapping doesn't set `mode`
    pub default_encoder_mode: EncoderMode,
    /// Time source for push-and-pull timers
    pub clock: Arc<dyn Clock>,
}

/// Closed set of inbound mapping variants
#[derive(Debug)]
pub enum InboundMapping {
    Command(CommandMapping),
    Slider(SliderMapping),
    Encoder(EncoderMapping),
    PushPull(PushPullMapping),
    Internal(InternalMapping),
}

impl InboundMapping {
    /// Build a mapping from a profile table according to its `type` tag
    ///
    /// Returns `None` (with an error logged) if the tag is missing or unknown.
    pub fn from_config(log: &TextLogger, table: &ConfigTable, ctx: &InboundContext) -> Option<Self> {
        let tag = table.read_string(log, CFG_KEY_TYPE, true)?;

        let mapping = match tag.as_str() {
            "cmd" => Self::Command(CommandMapping::read_config(log, table)),
            "sld" => Self::Slider(SliderMapping::read_config(log, table)),
            "enc" => Self::Encoder(EncoderMapping::read_config(
                log,
                table,
                ctx.default_encoder_mode,
            )),
            "pnp" => Self::PushPull(PushPullMapping::read_config(log, table, ctx.clock.clone())),
            "int" => Self::Internal(InternalMapping::read_config(log, table)),
            other => {
                log.error_at(
                    table.location(),
                    format!("Invalid mapping type '{}' for inbound mapping", other),
                );
                return None;
            }
        };

        Some(mapping)
    }

    pub fn common(&self) -> &MappingCommon {
        match self {
            Self::Command(m) => &m.common,
            Self::Slider(m) => &m.common,
            Self::Encoder(m) => &m.common,
            Self::PushPull(m) => &m.common,
            Self::Internal(m) => &m.common,
        }
    }

    /// Type tag as used in profiles
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Command(_) => "cmd",
            Self::Slider(_) => "sld",
            Self::Encoder(_) => "enc",
            Self::PushPull(_) => "pnp",
            Self::Internal(_) => "int",
        }
    }

    /// Validate the mapping, logging every problem found
    pub fn check(&self, log: &TextLogger, env: &dyn Environment) -> bool {
        match self {
            Self::Command(m) => m.check(log),
            Self::Slider(m) => m.check(log, env),
            Self::Encoder(m) => m.check(log, env),
            Self::PushPull(m) => m.check(log),
            Self::Internal(m) => m.check(log),
        }
    }

    /// Execute the mapping for one received message
    pub fn execute(
        &mut self,
        log: &TextLogger,
        env: &dyn Environment,
        msg: &MidiMessage,
        sublayer: &str,
    ) -> ExecuteStatus {
        match self {
            Self::Command(m) => m.execute(log, env, sublayer),
            Self::Slider(m) => m.execute(log, env, msg, sublayer),
            Self::Encoder(m) => m.execute(log, env, msg, sublayer),
            Self::PushPull(m) => m.execute(log, env, sublayer),
            Self::Internal(m) => m.execute(log, env, sublayer),
        }
    }

    pub fn map_text(&self, short: bool) -> &str {
        match self {
            Self::Command(m) => m.map_text(short),
            Self::Slider(m) => m.map_text(short),
            Self::Encoder(m) => m.map_text(short),
            Self::PushPull(m) => m.map_text(short),
            Self::Internal(m) => m.map_text(short),
        }
    }

    /// Press timer shared with the MIDI input thread (push-and-pull only)
    pub fn push_pull_timer(&self) -> Option<Arc<PushPullTimer>> {
        match self {
            Self::PushPull(m) => Some(m.timer()),
            _ => None,
        }
    }
}

/// Log an error if a required command is empty
pub(crate) fn check_command(log: &TextLogger, common: &MappingCommon, key: &str, command: &str) -> bool {
    if command.is_empty() {
        log.error_at(common.source_line(), format!("Parameter '{}' is not defined", key));
        return false;
    }
    true
}

/// Log an error if a dataref is missing or unknown to the simulator
pub(crate) fn check_dataref(
    log: &TextLogger,
    env: &dyn Environment,
    common: &MappingCommon,
    dataref: &str,
) -> bool {
    if dataref.is_empty() {
        log.error_at(
            common.source_line(),
            format!("Parameter '{}' is not defined", CFG_KEY_DATAREF),
        );
        return false;
    }
    if !env.check(dataref) {
        log.error_at(common.source_line(), format!("Dataref '{}' not found", dataref));
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_yaml::Value;
    use skyctl_core::{DataValue, MemoryEnvironment};

    fn context() -> InboundContext {
        InboundContext {
            default_encoder_mode: EncoderMode::Relative,
            clock: ManualClock::new(),
        }
    }

    fn build(yaml: &str, log: &TextLogger) -> Option<InboundMapping> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let table = ConfigTable::from_value(&value, "test").unwrap();
        InboundMapping::from_config(log, &table, &context())
    }

    #[test]
    fn test_type_tags() {
        let log = TextLogger::new();
        let cases = [
            ("{ type: cmd, cc: 1, command: a }", "cmd"),
            ("{ type: sld, cc: 1, dataref: a }", "sld"),
            ("{ type: enc, cc: 1, command_up: a, command_down: b }", "enc"),
            ("{ type: pnp, cc: 1, command_push: a, command_pull: b }", "pnp"),
            ("{ type: int, cc: 1, command: a }", "int"),
        ];
        for (yaml, tag) in cases {
            let mapping = build(yaml, &log).unwrap();
            assert_eq!(mapping.type_tag(), tag);
            assert_eq!(mapping.common().key(), "11|CC|1");
        }
        assert!(!log.has_errors());
    }

    #[test]
    fn test_unknown_or_missing_type() {
        let log = TextLogger::new();
        assert!(build("{ type: xyz, cc: 1 }", &log).is_none());
        assert!(build("{ cc: 1, command: a }", &log).is_none());
        assert_eq!(log.error_count(), 2);
    }

    #[test]
    fn test_only_push_pull_has_timer() {
        let log = TextLogger::new();
        let pnp = build("{ type: pnp, cc: 1, command_push: a }", &log).unwrap();
        let cmd = build("{ type: cmd, cc: 1, command: a }", &log).unwrap();
        assert!(pnp.push_pull_timer().is_some());
        assert!(cmd.push_pull_timer().is_none());
    }

    #[test]
    fn test_check_uses_environment() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        let slider = build("{ type: sld, cc: 1, dataref: sim/throttle }", &log).unwrap();

        assert!(!slider.check(&log, &env));
        env.insert("sim/throttle", DataValue::Float(0.0));
        assert!(slider.check(&log, &env));
    }
}
