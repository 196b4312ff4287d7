//! Slider mapping: absolute controls (faders, pots)
//!
//! In dataref mode the 0-127 position is scaled linearly into
//! `value_min..=value_max`. Without a dataref the slider acts as a three
//! position switch: bottom fires `command_down`, top fires `command_up`,
//! the centre band fires `command_middle`.

use skyctl_core::{Environment, TextLogger};

use super::{
    check_command, check_dataref, ExecuteStatus, CFG_KEY_COMMAND_DOWN, CFG_KEY_COMMAND_UP,
    CFG_KEY_DATAREF, CFG_KEY_VALUE_MAX, CFG_KEY_VALUE_MIN,
};
use crate::config_table::ConfigTable;
use crate::mapping::{MapText, MappingCommon};
use crate::types::{MidiMessage, MIDI_DATA_2_MAX};

pub const CFG_KEY_COMMAND_MIDDLE: &str = "command_middle";

/// Positions at or below this fire `command_down`
const SLIDER_DOWN_MAX: u8 = 10;
/// Positions at or above this fire `command_up`
const SLIDER_UP_MIN: u8 = 117;
/// Centre band firing `command_middle`
const SLIDER_MIDDLE: std::ops::RangeInclusive<u8> = 54..=74;

#[derive(Debug)]
pub struct SliderMapping {
    pub(crate) common: MappingCommon,
    dataref: Option<String>,
    value_min: f32,
    value_max: f32,
    command_up: String,
    command_middle: String,
    command_down: String,
}

impl SliderMapping {
    /// Slider writing a dataref
    pub fn with_dataref(common: MappingCommon, dataref: &str, value_min: f32, value_max: f32) -> Self {
        Self {
            common,
            dataref: Some(dataref.to_string()),
            value_min,
            value_max,
            command_up: String::new(),
            command_middle: String::new(),
            command_down: String::new(),
        }
    }

    /// Slider firing commands
    pub fn with_commands(common: MappingCommon, up: &str, middle: &str, down: &str) -> Self {
        Self {
            common,
            dataref: None,
            value_min: 0.0,
            value_max: 1.0,
            command_up: up.to_string(),
            command_middle: middle.to_string(),
            command_down: down.to_string(),
        }
    }

    pub fn read_config(log: &TextLogger, table: &ConfigTable) -> Self {
        log.debug_at(table.location(), "Read settings for type 'sld'");
        let common = MappingCommon::read_common_config(log, table, true);

        if table.contains(CFG_KEY_DATAREF) {
            let dataref = table
                .read_string(log, CFG_KEY_DATAREF, true)
                .unwrap_or_default();
            let value_min = table.read_float(log, CFG_KEY_VALUE_MIN, false).unwrap_or(0.0);
            let value_max = table.read_float(log, CFG_KEY_VALUE_MAX, false).unwrap_or(1.0);
            Self::with_dataref(common, &dataref, value_min, value_max)
        } else {
            let read = |key| table.read_string(log, key, false).unwrap_or_default();
            Self::with_commands(
                common,
                &read(CFG_KEY_COMMAND_UP),
                &read(CFG_KEY_COMMAND_MIDDLE),
                &read(CFG_KEY_COMMAND_DOWN),
            )
        }
    }

    pub fn check(&self, log: &TextLogger, env: &dyn Environment) -> bool {
        let mut valid = self.common.check(log);

        match self.dataref {
            Some(ref dataref) => {
                valid &= check_dataref(log, env, &self.common, dataref);
                if self.value_min == self.value_max {
                    log.error_at(
                        self.common.source_line(),
                        format!(
                            "Parameters '{}' and '{}' must not be equal",
                            CFG_KEY_VALUE_MIN, CFG_KEY_VALUE_MAX
                        ),
                    );
                    valid = false;
                }
            }
            None => {
                valid &= check_command(log, &self.common, CFG_KEY_COMMAND_UP, &self.command_up);
                valid &= check_command(log, &self.common, CFG_KEY_COMMAND_DOWN, &self.command_down);
            }
        }

        valid
    }

    pub fn execute(
        &self,
        log: &TextLogger,
        env: &dyn Environment,
        msg: &MidiMessage,
        sublayer: &str,
    ) -> ExecuteStatus {
        if !self.common.check_sublayer(sublayer) {
            return ExecuteStatus::Completed;
        }

        match self.dataref {
            Some(ref dataref) => {
                let value = self.scaled_value(msg.data_2);
                log.debug(format!(" --> Set dataref '{}' to value '{}'", dataref, value));
                if !env.write_float(log, dataref, value) {
                    log.error(format!("Error writing dataref '{}'", dataref));
                }
            }
            None => {
                if let Some(command) = self.command_for(msg.data_2) {
                    log.debug(format!(" --> Execute command '{}'", command));
                    env.execute(log, command);
                }
            }
        }

        ExecuteStatus::Completed
    }

    /// Dataref value for a slider position
    pub fn scaled_value(&self, data_2: u8) -> f32 {
        let position = f32::from(data_2.min(MIDI_DATA_2_MAX)) / f32::from(MIDI_DATA_2_MAX);
        self.value_min + position * (self.value_max - self.value_min)
    }

    fn command_for(&self, data_2: u8) -> Option<&str> {
        let command = if data_2 <= SLIDER_DOWN_MAX {
            &self.command_down
        } else if data_2 >= SLIDER_UP_MIN {
            &self.command_up
        } else if SLIDER_MIDDLE.contains(&data_2) {
            &self.command_middle
        } else {
            return None;
        };
        (!command.is_empty()).then_some(command.as_str())
    }

    pub fn map_text(&self, short: bool) -> &str {
        self.common.map_text(short, || {
            let mut text = MapText::new(short, "Slider", &self.common);
            match self.dataref {
                Some(ref dataref) => {
                    text.push(format!("Dataref = '{}'", dataref))
                        .push(format!("Value min = {}", self.value_min))
                        .push(format!("Value max = {}", self.value_max));
                }
                None => {
                    text.push(format!("Command up = '{}'", self.command_up));
                    if !self.command_middle.is_empty() {
                        text.push(format!("Command middle = '{}'", self.command_middle));
                    }
                    text.push(format!("Command down = '{}'", self.command_down));
                }
            }
            text.finish()
        })
    }
}
