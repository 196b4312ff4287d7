//! Encoder mapping: rotary controls
//!
//! Relative encoders send 64 ± delta, absolute ("range") encoders send their
//! position and the direction is derived from the previous position. The
//! resulting direction either steps a dataref by a modifier or fires one of
//! the up/down commands. Fast variants default to the normal ones.

use skyctl_core::{Environment, TextLogger};

use super::{
    check_dataref, ExecuteStatus, CFG_KEY_COMMAND_DOWN, CFG_KEY_COMMAND_FAST_DOWN,
    CFG_KEY_COMMAND_FAST_UP, CFG_KEY_COMMAND_UP, CFG_KEY_DATAREF, CFG_KEY_VALUE_MAX,
    CFG_KEY_VALUE_MIN,
};
use crate::config::EncoderMode;
use crate::config_table::ConfigTable;
use crate::mapping::{MapText, MappingCommon};
use crate::types::{MidiMessage, MIDI_DATA_2_CENTER, MIDI_DATA_2_MAX, MIDI_DATA_2_MIN};

pub const CFG_KEY_MODE: &str = "mode";
pub const CFG_KEY_DELAY: &str = "delay";
pub const CFG_KEY_MODIFIER_UP: &str = "modifier_up";
pub const CFG_KEY_MODIFIER_DOWN: &str = "modifier_down";
pub const CFG_KEY_MODIFIER_FAST_UP: &str = "modifier_fast_up";
pub const CFG_KEY_MODIFIER_FAST_DOWN: &str = "modifier_fast_down";

/// Relative values below this are a fast turn down
const RELATIVE_FAST_DOWN_BELOW: u8 = 61;
/// Relative values above this are a fast turn up
const RELATIVE_FAST_UP_ABOVE: u8 = 68;

/// Direction resolved from one encoder message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderDirection {
    Up,
    FastUp,
    Down,
    FastDown,
}

#[derive(Debug, Clone, PartialEq)]
enum EncoderAction {
    Dataref {
        dataref: String,
        modifier_up: f32,
        modifier_down: f32,
        modifier_fast_up: f32,
        modifier_fast_down: f32,
        value_min: Option<f32>,
        value_max: Option<f32>,
    },
    Command {
        command_up: String,
        command_down: String,
        command_fast_up: String,
        command_fast_down: String,
    },
}

#[derive(Debug)]
pub struct EncoderMapping {
    pub(crate) common: MappingCommon,
    action: EncoderAction,
    mode: EncoderMode,
    delay: Option<u32>,
    /// Set when the configured delay was out of range
    delay_invalid: bool,
    delay_counter: u32,
    previous_data_2: Option<u8>,
}

impl EncoderMapping {
    /// Encoder stepping a dataref, fast modifiers equal to the normal ones
    pub fn with_dataref(
        common: MappingCommon,
        mode: EncoderMode,
        dataref: &str,
        modifier_up: f32,
        modifier_down: f32,
    ) -> Self {
        Self::new(
            common,
            mode,
            EncoderAction::Dataref {
                dataref: dataref.to_string(),
                modifier_up,
                modifier_down,
                modifier_fast_up: modifier_up,
                modifier_fast_down: modifier_down,
                value_min: None,
                value_max: None,
            },
        )
    }

    /// Encoder firing commands
    pub fn with_commands(
        common: MappingCommon,
        mode: EncoderMode,
        up: &str,
        down: &str,
        fast_up: &str,
        fast_down: &str,
    ) -> Self {
        Self::new(
            common,
            mode,
            EncoderAction::Command {
                command_up: up.to_string(),
                command_down: down.to_string(),
                command_fast_up: fast_up.to_string(),
                command_fast_down: fast_down.to_string(),
            },
        )
    }

    fn new(common: MappingCommon, mode: EncoderMode, action: EncoderAction) -> Self {
        Self {
            common,
            action,
            mode,
            delay: None,
            delay_invalid: false,
            delay_counter: 0,
            previous_data_2: None,
        }
    }

    /// Limit the dataref range (dataref mode only)
    pub fn with_limits(mut self, min: Option<f32>, max: Option<f32>) -> Self {
        if let EncoderAction::Dataref {
            ref mut value_min,
            ref mut value_max,
            ..
        } = self.action
        {
            *value_min = min;
            *value_max = max;
        }
        self
    }

    /// Only act on every `delay + 1`-th message
    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn read_config(log: &TextLogger, table: &ConfigTable, default_mode: EncoderMode) -> Self {
        log.debug_at(table.location(), "Read settings for type 'enc'");
        let common = MappingCommon::read_common_config(log, table, true);

        let mode = match table.read_string(log, CFG_KEY_MODE, false) {
            Some(text) => EncoderMode::parse(&text).unwrap_or_else(|| {
                log.error_at(
                    table.location(),
                    format!(
                        "Invalid encoder mode '{}', will use '{}'",
                        text,
                        default_mode.as_str()
                    ),
                );
                default_mode
            }),
            None => default_mode,
        };

        let mut delay_invalid = false;
        let delay = table
            .read_int(log, CFG_KEY_DELAY, false)
            .and_then(|d| match u32::try_from(d) {
                Ok(delay) => Some(delay),
                Err(_) => {
                    log.error_at(
                        table.location(),
                        format!("Parameter '{}' value '{}' is out of range", CFG_KEY_DELAY, d),
                    );
                    delay_invalid = true;
                    None
                }
            });

        let action = if table.contains(CFG_KEY_DATAREF) {
            log.debug_at(table.location(), "Use 'dataref' mode for encoder mapping");
            let float = |key| table.read_float(log, key, false);
            let modifier_up = float(CFG_KEY_MODIFIER_UP).unwrap_or(0.0);
            let modifier_down = float(CFG_KEY_MODIFIER_DOWN).unwrap_or(0.0);

            EncoderAction::Dataref {
                dataref: table
                    .read_string(log, CFG_KEY_DATAREF, true)
                    .unwrap_or_default(),
                modifier_up,
                modifier_down,
                modifier_fast_up: float(CFG_KEY_MODIFIER_FAST_UP).unwrap_or(modifier_up),
                modifier_fast_down: float(CFG_KEY_MODIFIER_FAST_DOWN).unwrap_or(modifier_down),
                value_min: float(CFG_KEY_VALUE_MIN),
                value_max: float(CFG_KEY_VALUE_MAX),
            }
        } else {
            log.debug_at(table.location(), "Use 'command' mode for encoder mapping");
            let command = |key| table.read_string(log, key, false);
            let command_up = command(CFG_KEY_COMMAND_UP).unwrap_or_default();
            let command_down = command(CFG_KEY_COMMAND_DOWN).unwrap_or_default();

            EncoderAction::Command {
                command_fast_up: command(CFG_KEY_COMMAND_FAST_UP).unwrap_or_else(|| command_up.clone()),
                command_fast_down: command(CFG_KEY_COMMAND_FAST_DOWN)
                    .unwrap_or_else(|| command_down.clone()),
                command_up,
                command_down,
            }
        };

        Self {
            delay,
            delay_invalid,
            ..Self::new(common, mode, action)
        }
    }

    pub fn check(&self, log: &TextLogger, env: &dyn Environment) -> bool {
        // An invalid delay was already logged while reading
        let mut valid = self.common.check(log) && !self.delay_invalid;
        let source = self.common.source_line();

        match self.action {
            EncoderAction::Dataref {
                ref dataref,
                modifier_up,
                modifier_down,
                modifier_fast_up,
                modifier_fast_down,
                value_min,
                value_max,
            } => {
                valid &= check_dataref(log, env, &self.common, dataref);

                if [modifier_up, modifier_down, modifier_fast_up, modifier_fast_down]
                    .iter()
                    .all(|m| *m == 0.0)
                {
                    log.error_at(source, "Modifiers (up/down) are not defined");
                    valid = false;
                }

                if let (Some(min), Some(max)) = (value_min, value_max) {
                    if min >= max {
                        log.error_at(
                            source,
                            format!(
                                "Parameter '{}' is expected to be less than parameter '{}'",
                                CFG_KEY_VALUE_MIN, CFG_KEY_VALUE_MAX
                            ),
                        );
                        valid = false;
                    }
                }
            }
            EncoderAction::Command {
                ref command_up,
                ref command_down,
                ref command_fast_up,
                ref command_fast_down,
            } => {
                if [command_up, command_down, command_fast_up, command_fast_down]
                    .iter()
                    .all(|c| c.is_empty())
                {
                    log.error_at(source, "Commands (up/down) are not defined");
                    valid = false;
                }
            }
        }

        valid
    }

    pub fn execute(
        &mut self,
        log: &TextLogger,
        env: &dyn Environment,
        msg: &MidiMessage,
        sublayer: &str,
    ) -> ExecuteStatus {
        if !self.common.check_sublayer(sublayer) {
            return ExecuteStatus::Completed;
        }

        if let Some(delay) = self.delay {
            if self.delay_counter < delay {
                self.delay_counter += 1;
                return ExecuteStatus::Completed;
            }
            self.delay_counter = 0;
        }

        let direction = match self.mode {
            EncoderMode::Relative => relative_direction(msg.data_2),
            EncoderMode::Range => {
                let direction = self
                    .previous_data_2
                    .map(|previous| range_direction(previous, msg.data_2));
                self.previous_data_2 = Some(msg.data_2);
                direction
            }
        };

        let Some(direction) = direction else {
            return ExecuteStatus::Completed;
        };

        match self.action {
            EncoderAction::Dataref {
                ref dataref,
                modifier_up,
                modifier_down,
                modifier_fast_up,
                modifier_fast_down,
                value_min,
                value_max,
            } => {
                let modifier = match direction {
                    EncoderDirection::Up => modifier_up,
                    EncoderDirection::FastUp => modifier_fast_up,
                    EncoderDirection::Down => modifier_down,
                    EncoderDirection::FastDown => modifier_fast_down,
                };
                modify_dataref(log, env, dataref, modifier, value_min, value_max);
            }
            EncoderAction::Command {
                ref command_up,
                ref command_down,
                ref command_fast_up,
                ref command_fast_down,
            } => {
                let command = match direction {
                    EncoderDirection::Up => command_up,
                    EncoderDirection::FastUp => command_fast_up,
                    EncoderDirection::Down => command_down,
                    EncoderDirection::FastDown => command_fast_down,
                };
                if !command.is_empty() {
                    log.debug(format!(" --> Execute command '{}' ({:?})", command, direction));
                    env.execute(log, command);
                }
            }
        }

        ExecuteStatus::Completed
    }

    pub fn mode(&self) -> EncoderMode {
        self.mode
    }

    pub fn map_text(&self, short: bool) -> &str {
        self.common.map_text(short, || {
            let mut text = MapText::new(short, "Encoder", &self.common);
            match self.action {
                EncoderAction::Dataref {
                    ref dataref,
                    modifier_up,
                    modifier_down,
                    modifier_fast_up,
                    modifier_fast_down,
                    ..
                } => {
                    text.push(format!("Dataref = '{}'", dataref))
                        .push(format!("Modifier up = {}", modifier_up));
                    if modifier_fast_up != modifier_up {
                        text.push(format!("Modifier up (fast) = {}", modifier_fast_up));
                    }
                    text.push(format!("Modifier down = {}", modifier_down));
                    if modifier_fast_down != modifier_down {
                        text.push(format!("Modifier down (fast) = {}", modifier_fast_down));
                    }
                }
                EncoderAction::Command {
                    ref command_up,
                    ref command_down,
                    ref command_fast_up,
                    ref command_fast_down,
                } => {
                    text.push(format!("Command up = '{}'", command_up));
                    if command_fast_up != command_up {
                        text.push(format!("Command up (fast) = '{}'", command_fast_up));
                    }
                    text.push(format!("Command down = '{}'", command_down));
                    if command_fast_down != command_down {
                        text.push(format!("Command down (fast) = '{}'", command_fast_down));
                    }
                }
            }
            text.push(format!("Mode = '{}'", self.mode.as_str()));
            text.finish()
        })
    }
}

/// Direction of a relative encoder message, `None` at the centre
pub fn relative_direction(data_2: u8) -> Option<EncoderDirection> {
    if data_2 < MIDI_DATA_2_CENTER {
        if data_2 < RELATIVE_FAST_DOWN_BELOW {
            Some(EncoderDirection::FastDown)
        } else {
            Some(EncoderDirection::Down)
        }
    } else if data_2 > MIDI_DATA_2_CENTER {
        if data_2 > RELATIVE_FAST_UP_ABOVE {
            Some(EncoderDirection::FastUp)
        } else {
            Some(EncoderDirection::Up)
        }
    } else {
        None
    }
}

/// Direction of an absolute encoder moving from `previous` to `current`
///
/// The end stops always count as down/up even if the value didn't change.
pub fn range_direction(previous: u8, current: u8) -> EncoderDirection {
    if current == MIDI_DATA_2_MIN {
        EncoderDirection::Down
    } else if current == MIDI_DATA_2_MAX || current > previous {
        EncoderDirection::Up
    } else {
        EncoderDirection::Down
    }
}

fn modify_dataref(
    log: &TextLogger,
    env: &dyn Environment,
    dataref: &str,
    modifier: f32,
    value_min: Option<f32>,
    value_max: Option<f32>,
) {
    let Some(value) = env.read_float(log, dataref) else {
        return;
    };

    let mut new_value = value + modifier;
    if modifier < 0.0 {
        if let Some(min) = value_min {
            new_value = new_value.max(min);
        }
    } else if modifier > 0.0 {
        if let Some(max) = value_max {
            new_value = new_value.min(max);
        }
    }

    log.debug(format!(
        " --> Change dataref '{}' from {} to {}",
        dataref, value, new_value
    ));
    if !env.write_float(log, dataref, new_value) {
        log.error(format!("Error changing dataref '{}' to value '{}'", dataref, new_value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Data1Type, MidiMessageType};
    use serde_yaml::Value;
    use skyctl_core::{DataValue, MemoryEnvironment};

    fn cc(data_2: u8) -> MidiMessage {
        MidiMessage::new(MidiMessageType::ControlChange, 11, 1, data_2)
    }

    fn command_encoder(mode: EncoderMode) -> EncoderMapping {
        EncoderMapping::with_commands(
            MappingCommon::new(11, Data1Type::ControlChange, 1),
            mode,
            "up",
            "down",
            "fast_up",
            "fast_down",
        )
    }

    #[test]
    fn test_relative_directions() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        let mut encoder = command_encoder(EncoderMode::Relative);
        assert!(encoder.check(&log, &env));

        for data_2 in [60, 63, 64, 65, 70] {
            encoder.execute(&log, &env, &cc(data_2), "");
        }
        assert_eq!(
            env.executed_commands(),
            vec!["fast_down", "down", "up", "fast_up"]
        );
    }

    #[test]
    fn test_range_sequence() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        let mut encoder = command_encoder(EncoderMode::Range);

        for data_2 in [64, 70, 65, 0, 127, 3] {
            encoder.execute(&log, &env, &cc(data_2), "");
        }
        // First message only seeds the previous position
        assert_eq!(
            env.executed_commands(),
            vec!["up", "down", "down", "up", "down"]
        );
    }

    #[test]
    fn test_range_end_stops() {
        assert_eq!(range_direction(0, 0), EncoderDirection::Down);
        assert_eq!(range_direction(127, 127), EncoderDirection::Up);
        assert_eq!(range_direction(50, 50), EncoderDirection::Down);
        assert_eq!(range_direction(50, 51), EncoderDirection::Up);
    }

    #[test]
    fn test_dataref_mode_with_limits() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("sim/heading", DataValue::Float(1.0));

        let mut encoder = EncoderMapping::with_dataref(
            MappingCommon::new(11, Data1Type::ControlChange, 1),
            EncoderMode::Relative,
            "sim/heading",
            1.0,
            -1.0,
        )
        .with_limits(Some(0.0), Some(3.0));
        assert!(encoder.check(&log, &env));

        encoder.execute(&log, &env, &cc(65), "");
        assert_eq!(env.value("sim/heading"), Some(DataValue::Float(2.0)));
        encoder.execute(&log, &env, &cc(65), "");
        encoder.execute(&log, &env, &cc(65), "");
        assert_eq!(env.value("sim/heading"), Some(DataValue::Float(3.0)));

        for _ in 0..5 {
            encoder.execute(&log, &env, &cc(63), "");
        }
        assert_eq!(env.value("sim/heading"), Some(DataValue::Float(0.0)));
    }

    #[test]
    fn test_clamp_only_in_modifier_direction() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        // Already above the maximum: stepping down must not snap to the max
        env.insert("sim/value", DataValue::Float(10.0));

        let mut encoder = EncoderMapping::with_dataref(
            MappingCommon::new(11, Data1Type::ControlChange, 1),
            EncoderMode::Relative,
            "sim/value",
            1.0,
            -1.0,
        )
        .with_limits(Some(0.0), Some(5.0));

        encoder.execute(&log, &env, &cc(63), "");
        assert_eq!(env.value("sim/value"), Some(DataValue::Float(9.0)));
    }

    #[test]
    fn test_failed_read_still_tracks_position() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        let mut encoder = EncoderMapping::with_dataref(
            MappingCommon::new(11, Data1Type::ControlChange, 1),
            EncoderMode::Range,
            "sim/value",
            1.0,
            -1.0,
        );

        encoder.execute(&log, &env, &cc(10), "");
        encoder.execute(&log, &env, &cc(20), "");
        assert!(log.has_errors());

        // Dataref appears, next message compares against 20
        env.insert("sim/value", DataValue::Float(0.0));
        encoder.execute(&log, &env, &cc(15), "");
        assert_eq!(env.value("sim/value"), Some(DataValue::Float(-1.0)));
    }

    #[test]
    fn test_delay() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        let mut encoder = command_encoder(EncoderMode::Relative).with_delay(2);

        for _ in 0..6 {
            encoder.execute(&log, &env, &cc(65), "");
        }
        assert_eq!(env.executed_commands(), vec!["up", "up"]);
    }

    #[test]
    fn test_sublayer_mismatch_keeps_state() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        let mut encoder = EncoderMapping::with_commands(
            MappingCommon::new(11, Data1Type::ControlChange, 1).with_sublayer("nav"),
            EncoderMode::Range,
            "up",
            "down",
            "up",
            "down",
        );

        encoder.execute(&log, &env, &cc(50), "com");
        encoder.execute(&log, &env, &cc(60), "nav");
        encoder.execute(&log, &env, &cc(70), "nav");
        assert_eq!(env.executed_commands(), vec!["up"]);
    }

    #[test]
    fn test_read_config_defaults() {
        let yaml = "{ ch: 11, cc: 1, type: enc, dataref: sim/a, modifier_up: 0.5, modifier_down: -0.5, mode: range }";
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let table = ConfigTable::from_value(&value, "test").unwrap();
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("sim/a", DataValue::Float(0.0));

        let encoder = EncoderMapping::read_config(&log, &table, EncoderMode::Relative);
        assert_eq!(encoder.mode(), EncoderMode::Range);
        assert!(encoder.check(&log, &env));
        assert_eq!(
            encoder.map_text(true),
            "Dataref = 'sim/a', Modifier up = 0.5, Modifier down = -0.5, Mode = 'range'"
        );
    }

    #[test]
    fn test_check_errors() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("sim/a", DataValue::Float(0.0));

        let no_modifiers = EncoderMapping::with_dataref(
            MappingCommon::new(11, Data1Type::ControlChange, 1),
            EncoderMode::Relative,
            "sim/a",
            0.0,
            0.0,
        )
        .with_limits(Some(5.0), Some(1.0));
        assert!(!no_modifiers.check(&log, &env));
        assert_eq!(log.error_count(), 2);

        let commands = command_encoder(EncoderMode::Relative);
        assert!(commands.check(&log, &env));

        let empty = EncoderMapping::with_commands(
            MappingCommon::new(11, Data1Type::ControlChange, 1),
            EncoderMode::Relative,
            "",
            "",
            "",
            "",
        );
        assert!(!empty.check(&log, &env));
    }

    fn read(yaml: &str, log: &TextLogger) -> EncoderMapping {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let table = ConfigTable::from_value(&value, "test").unwrap();
        EncoderMapping::read_config(log, &table, EncoderMode::Relative)
    }

    #[test]
    fn test_negative_delay_is_rejected() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        let encoder = read(
            "{ ch: 11, cc: 1, type: enc, command_up: up, command_down: down, delay: -1 }",
            &log,
        );

        assert_eq!(log.error_count(), 1);
        assert!(log
            .messages_as_text()
            .contains("Parameter 'delay' value '-1' is out of range"));
        assert!(!encoder.check(&log, &env));
    }

    #[test]
    fn test_fast_modifiers_default_to_normal() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("sim/a", DataValue::Float(0.0));

        let mut encoder = read(
            "{ ch: 11, cc: 1, type: enc, dataref: sim/a, modifier_up: 2, modifier_down: -1 }",
            &log,
        );
        assert!(encoder.check(&log, &env));

        // 70 is a fast turn up, 60 a fast turn down
        encoder.execute(&log, &env, &cc(70), "");
        assert_eq!(env.value("sim/a"), Some(DataValue::Float(2.0)));
        encoder.execute(&log, &env, &cc(60), "");
        assert_eq!(env.value("sim/a"), Some(DataValue::Float(1.0)));

        let mut commands = read(
            "{ ch: 11, cc: 1, type: enc, command_up: up, command_down: down, command_fast_up: turbo }",
            &log,
        );
        for data_2 in [70, 60] {
            commands.execute(&log, &env, &cc(data_2), "");
        }
        assert_eq!(env.executed_commands(), vec!["turbo", "down"]);
    }
}
