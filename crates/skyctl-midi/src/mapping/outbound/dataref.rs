//! Dataref outbound mapping: LED on/off from one or more datarefs

use serde_yaml::{Mapping, Value};
use skyctl_core::{Environment, TextLogger};
use std::collections::BTreeSet;

use super::{state_task, Data2Values, SendMode, CFG_KEY_DATA_2_OFF, CFG_KEY_DATA_2_ON};
use crate::config::OutboundSendMode;
use crate::config_table::ConfigTable;
use crate::mapping::inbound::{check_dataref, CFG_KEY_DATAREF};
use crate::mapping::{MapText, MappingCommon, CFG_KEY_TYPE};
use crate::outbound_task::OutboundTask;
use crate::types::{MIDI_DATA_2_MAX, MIDI_DATA_2_MIN};

pub const CFG_KEY_VALUE_ON: &str = "value_on";
pub const CFG_KEY_VALUE_OFF: &str = "value_off";
pub const CFG_KEY_SEND_ON: &str = "send_on";
pub const CFG_KEY_SEND_OFF: &str = "send_off";

/// State a single watched value stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueState {
    On,
    Off,
    Undecided,
}

#[derive(Debug)]
pub struct DatarefOutMapping {
    pub(crate) common: MappingCommon,
    /// Watched datarefs in profile order, duplicates included
    datarefs: Vec<String>,
    /// Last value seen per position
    last_values: Vec<Option<String>>,
    values_on: BTreeSet<String>,
    values_off: BTreeSet<String>,
    send_on: SendMode,
    send_off: SendMode,
    data_2: Data2Values,
}

impl DatarefOutMapping {
    pub fn new(common: MappingCommon, datarefs: Vec<String>) -> Self {
        let last_values = vec![None; datarefs.len()];
        Self {
            common,
            datarefs,
            last_values,
            values_on: BTreeSet::new(),
            values_off: BTreeSet::new(),
            send_on: SendMode::One,
            send_off: SendMode::All,
            data_2: Data2Values::default(),
        }
    }

    pub fn with_values<I, J>(mut self, on: I, off: J) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        self.values_on = on.into_iter().map(Into::into).collect();
        self.values_off = off.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_send_modes(mut self, send_on: SendMode, send_off: SendMode) -> Self {
        self.send_on = send_on;
        self.send_off = send_off;
        self
    }

    pub fn with_data_2(mut self, on: u8, off: u8) -> Self {
        self.data_2 = Data2Values {
            on: Some(on),
            off: Some(off),
        };
        self
    }

    pub fn read_config(log: &TextLogger, table: &ConfigTable) -> Self {
        log.debug_at(table.location(), "Read settings for type 'drf'");
        let common = MappingCommon::read_common_config(log, table, true);
        let datarefs = table.read_string_list(log, CFG_KEY_DATAREF, true);

        let mut mapping = Self::new(common, datarefs);
        mapping.values_on = table.read_string_set(log, CFG_KEY_VALUE_ON, false);
        mapping.values_off = table.read_string_set(log, CFG_KEY_VALUE_OFF, false);
        mapping.send_on = read_send_mode(log, table, CFG_KEY_SEND_ON, SendMode::One);
        mapping.send_off = read_send_mode(log, table, CFG_KEY_SEND_OFF, SendMode::All);
        mapping.data_2 = Data2Values::read_config(log, table);
        mapping
    }

    pub fn check(&self, log: &TextLogger, env: &dyn Environment) -> bool {
        let mut valid = self.common.check(log);

        if self.datarefs.is_empty() {
            log.error_at(
                self.common.source_line(),
                format!("Parameter '{}' is not defined", CFG_KEY_DATAREF),
            );
            valid = false;
        }
        for dataref in &self.datarefs {
            valid &= check_dataref(log, env, &self.common, dataref);
        }

        if self.values_on.is_empty() && self.values_off.is_empty() {
            log.error_at(
                self.common.source_line(),
                format!(
                    "Parameters '{}' and '{}' are not defined",
                    CFG_KEY_VALUE_ON, CFG_KEY_VALUE_OFF
                ),
            );
            valid = false;
        }

        valid &= self.data_2.check(log, &self.common);
        valid
    }

    /// Evaluate the watched datarefs for this tick
    pub fn execute(
        &mut self,
        log: &TextLogger,
        env: &dyn Environment,
        mode: OutboundSendMode,
        sublayer: &str,
    ) -> Option<OutboundTask> {
        if !self.common.check_sublayer(sublayer) {
            return None;
        }

        let changed = self.refresh(log, env);
        if mode == OutboundSendMode::OnChange && !changed {
            return None;
        }

        let states: Vec<ValueState> = self
            .last_values
            .iter()
            .flatten()
            .map(|value| self.classify(value))
            .collect();
        let total = self.datarefs.len();
        let count = |wanted: ValueState| states.iter().filter(|s| **s == wanted).count();

        let (on, data_2) = if self.send_on.is_satisfied(count(ValueState::On), total) {
            (true, self.data_2.on.unwrap_or(MIDI_DATA_2_MAX))
        } else if self.send_off.is_satisfied(count(ValueState::Off), total) {
            (false, self.data_2.off.unwrap_or(MIDI_DATA_2_MIN))
        } else {
            return None;
        };

        state_task(&self.common, on, data_2, changed)
    }

    /// Read every dataref, returns whether any position changed
    ///
    /// The first value seen at a position only seeds the cache.
    fn refresh(&mut self, log: &TextLogger, env: &dyn Environment) -> bool {
        let mut changed = false;
        for (dataref, last) in self.datarefs.iter().zip(self.last_values.iter_mut()) {
            let Some(value) = env.read(log, dataref) else {
                continue;
            };
            match last {
                Some(previous) if *previous == value => {}
                Some(previous) => {
                    *previous = value;
                    changed = true;
                }
                None => *last = Some(value),
            }
        }
        changed
    }

    fn classify(&self, value: &str) -> ValueState {
        if !self.values_on.is_empty() {
            if self.values_on.contains(value) {
                ValueState::On
            } else if self.values_off.is_empty() || self.values_off.contains(value) {
                ValueState::Off
            } else {
                ValueState::Undecided
            }
        } else if self.values_off.contains(value) {
            ValueState::Off
        } else {
            ValueState::On
        }
    }

    /// Render the mapping back into a profile table
    pub fn to_config(&self) -> Mapping {
        let mut table = Mapping::new();
        table.insert(CFG_KEY_TYPE.into(), Value::from("drf"));
        self.common.write_config(&mut table);

        let dataref = match self.datarefs.as_slice() {
            [single] => Value::from(single.as_str()),
            many => Value::Sequence(many.iter().map(|d| Value::from(d.as_str())).collect()),
        };
        table.insert(CFG_KEY_DATAREF.into(), dataref);

        for (key, values) in [
            (CFG_KEY_VALUE_ON, &self.values_on),
            (CFG_KEY_VALUE_OFF, &self.values_off),
        ] {
            if !values.is_empty() {
                let list = values.iter().map(|v| Value::from(v.as_str())).collect();
                table.insert(key.into(), Value::Sequence(list));
            }
        }

        table.insert(CFG_KEY_SEND_ON.into(), Value::from(self.send_on.as_str()));
        table.insert(CFG_KEY_SEND_OFF.into(), Value::from(self.send_off.as_str()));
        if let Some(on) = self.data_2.on {
            table.insert(CFG_KEY_DATA_2_ON.into(), Value::from(on));
        }
        if let Some(off) = self.data_2.off {
            table.insert(CFG_KEY_DATA_2_OFF.into(), Value::from(off));
        }
        table
    }

    pub fn map_text(&self, short: bool) -> &str {
        self.common.map_text(short, || {
            let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
            MapText::new(short, "Dataref", &self.common)
                .push(format!("Dataref = '{}'", self.datarefs.join(", ")))
                .push(format!("Value on = '{}'", join(&self.values_on)))
                .push(format!("Value off = '{}'", join(&self.values_off)))
                .push(format!(
                    "Send on = '{}', Send off = '{}'",
                    self.send_on.as_str(),
                    self.send_off.as_str()
                ))
                .finish()
        })
    }
}

fn read_send_mode(log: &TextLogger, table: &ConfigTable, key: &str, default: SendMode) -> SendMode {
    let Some(text) = table.read_string(log, key, false) else {
        return default;
    };
    match SendMode::parse(&text) {
        Some(mode) => mode,
        None => {
            log.error_at(
                table.location(),
                format!("Parameter '{}' value '{}' is invalid, expected 'all' or 'one'", key, text),
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound_task::OutboundMessageType;
    use crate::types::Data1Type;
    use skyctl_core::{DataValue, MemoryEnvironment};

    const ON_CHANGE: OutboundSendMode = OutboundSendMode::OnChange;

    fn led(datarefs: &[&str]) -> DatarefOutMapping {
        DatarefOutMapping::new(
            MappingCommon::new(11, Data1Type::Note, 8),
            datarefs.iter().map(|d| d.to_string()).collect(),
        )
        .with_values(["1"], ["0"])
    }

    fn parse(yaml: &str, log: &TextLogger) -> DatarefOutMapping {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let table = ConfigTable::from_value(&value, "test").unwrap();
        DatarefOutMapping::read_config(log, &table)
    }

    #[test]
    fn test_on_off_transitions() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("sim/gear", DataValue::Int(0));
        let mut mapping = led(&["sim/gear"]);

        // First observation seeds the cache
        assert_eq!(mapping.execute(&log, &env, ON_CHANGE, ""), None);

        env.set("sim/gear", DataValue::Int(1));
        let task = mapping.execute(&log, &env, ON_CHANGE, "").unwrap();
        assert_eq!(task.message_type, OutboundMessageType::NoteOn);
        assert_eq!(task.data_2, 127);
        assert!(task.changed);

        // Unchanged value sends nothing
        assert_eq!(mapping.execute(&log, &env, ON_CHANGE, ""), None);

        env.set("sim/gear", DataValue::Int(0));
        let task = mapping.execute(&log, &env, ON_CHANGE, "").unwrap();
        assert_eq!(task.message_type, OutboundMessageType::NoteOff);
        assert_eq!(task.data_2, 0);
    }

    #[test]
    fn test_permanent_mode_sends_every_tick() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("sim/gear", DataValue::Int(1));
        let mut mapping = led(&["sim/gear"]);

        for _ in 0..3 {
            let task = mapping
                .execute(&log, &env, OutboundSendMode::Permanent, "")
                .unwrap();
            assert_eq!(task.message_type, OutboundMessageType::NoteOn);
            assert!(!task.changed);
        }
    }

    #[test]
    fn test_send_on_all_vs_one() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("a", DataValue::Int(0));
        env.insert("b", DataValue::Int(0));

        let mut one = led(&["a", "b"]);
        let mut all = led(&["a", "b"]).with_send_modes(SendMode::All, SendMode::All);
        one.execute(&log, &env, ON_CHANGE, "");
        all.execute(&log, &env, ON_CHANGE, "");

        env.set("a", DataValue::Int(1));
        let task = one.execute(&log, &env, ON_CHANGE, "").unwrap();
        assert_eq!(task.message_type, OutboundMessageType::NoteOn);
        // One on, one off: neither "all" rule holds
        assert_eq!(all.execute(&log, &env, ON_CHANGE, ""), None);

        env.set("b", DataValue::Int(1));
        let task = all.execute(&log, &env, ON_CHANGE, "").unwrap();
        assert_eq!(task.message_type, OutboundMessageType::NoteOn);
    }

    #[test]
    fn test_send_off_one() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("a", DataValue::Int(1));
        env.insert("b", DataValue::Int(1));
        let mut mapping = led(&["a", "b"]).with_send_modes(SendMode::All, SendMode::One);
        mapping.execute(&log, &env, ON_CHANGE, "");

        env.set("b", DataValue::Int(0));
        let task = mapping.execute(&log, &env, ON_CHANGE, "").unwrap();
        assert_eq!(task.message_type, OutboundMessageType::NoteOff);
    }

    #[test]
    fn test_duplicate_datarefs_count_per_position() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("a", DataValue::Int(1));
        let mut mapping = led(&["a", "a"]).with_send_modes(SendMode::All, SendMode::All);

        let task = mapping
            .execute(&log, &env, OutboundSendMode::Permanent, "")
            .unwrap();
        assert_eq!(task.message_type, OutboundMessageType::NoteOn);
    }

    #[test]
    fn test_classification() {
        let on_only = led(&["a"]).with_values(["1"], Vec::<String>::new());
        assert_eq!(on_only.classify("1"), ValueState::On);
        assert_eq!(on_only.classify("5"), ValueState::Off);

        let off_only = led(&["a"]).with_values(Vec::<String>::new(), ["0"]);
        assert_eq!(off_only.classify("0"), ValueState::Off);
        assert_eq!(off_only.classify("5"), ValueState::On);

        let both = led(&["a"]);
        assert_eq!(both.classify("1"), ValueState::On);
        assert_eq!(both.classify("0"), ValueState::Off);
        assert_eq!(both.classify("5"), ValueState::Undecided);
    }

    #[test]
    fn test_sublayer_mismatch_sends_nothing() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("a", DataValue::Int(1));
        let mut mapping = DatarefOutMapping::new(
            MappingCommon::new(11, Data1Type::Note, 8).with_sublayer("nav"),
            vec!["a".into()],
        )
        .with_values(["1"], ["0"]);

        assert_eq!(mapping.execute(&log, &env, OutboundSendMode::Permanent, "com"), None);
        assert!(mapping.execute(&log, &env, OutboundSendMode::Permanent, "nav").is_some());
    }

    #[test]
    fn test_read_failure_skips_position() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("a", DataValue::Int(0));
        let mut mapping = led(&["a"]);
        mapping.execute(&log, &env, ON_CHANGE, "");

        env.remove("a");
        assert_eq!(mapping.execute(&log, &env, ON_CHANGE, ""), None);
        assert!(log.has_errors());

        env.insert("a", DataValue::Int(1));
        assert!(mapping.execute(&log, &env, ON_CHANGE, "").is_some());
    }

    #[test]
    fn test_custom_data_2() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("a", DataValue::Int(1));
        let mut mapping = DatarefOutMapping::new(
            MappingCommon::new(2, Data1Type::ControlChange, 30),
            vec!["a".into()],
        )
        .with_values(["1"], ["0"])
        .with_data_2(64, 10);

        let task = mapping
            .execute(&log, &env, OutboundSendMode::Permanent, "")
            .unwrap();
        assert_eq!(task.message_type, OutboundMessageType::ControlChange);
        assert_eq!((task.channel, task.data_1, task.data_2), (2, 30, 64));
    }

    #[test]
    fn test_check() {
        let log = TextLogger::new();
        let env = MemoryEnvironment::new();
        env.insert("a", DataValue::Int(0));

        let mapping = parse("{ note: 1, dataref: a, value_on: 1 }", &log);
        assert!(mapping.check(&log, &env));

        let no_values = parse("{ note: 1, dataref: a }", &log);
        assert!(!no_values.check(&log, &env));

        let unknown = parse("{ note: 1, dataref: [a, b], value_on: 1 }", &log);
        assert!(!unknown.check(&log, &env));

        let bad_data_2 = parse("{ note: 1, dataref: a, value_on: 1, data_2_on: 200 }", &log);
        assert!(!bad_data_2.check(&log, &env));
    }

    #[test]
    fn test_invalid_send_mode_keeps_default() {
        let log = TextLogger::new();
        let mapping = parse("{ note: 1, dataref: a, value_on: 1, send_on: some }", &log);
        assert_eq!(mapping.send_on, SendMode::One);
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn test_config_round_trip() {
        let log = TextLogger::new();
        let original = parse(
            "{ ch: 3, cc: 12, sl: nav, dataref: [a, b, a], value_on: [1, 2], \
             value_off: 0, send_on: all, send_off: one, data_2_on: 100, data_2_off: 5 }",
            &log,
        );
        assert!(!log.has_errors());

        let value = Value::Mapping(original.to_config());
        let table = ConfigTable::from_value(&value, "roundtrip").unwrap();
        let reread = DatarefOutMapping::read_config(&log, &table);

        assert!(!log.has_errors());
        assert_eq!(reread.common.key(), "3|CC|12");
        assert_eq!(reread.common.sublayer(), Some("nav"));
        assert_eq!(reread.datarefs, vec!["a", "b", "a"]);
        assert_eq!(reread.values_on, original.values_on);
        assert_eq!(reread.values_off, original.values_off);
        assert_eq!(reread.send_on, SendMode::All);
        assert_eq!(reread.send_off, SendMode::One);
        assert_eq!(reread.data_2, original.data_2);
    }
}
