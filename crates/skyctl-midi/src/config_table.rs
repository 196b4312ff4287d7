//! Field-by-field access to one mapping entry of a profile
//!
//! Profiles are parsed into an untyped YAML document first so that a bad
//! field in one mapping never prevents the others from loading. Each reader
//! logs what went wrong (with the entry's location) and returns `None`,
//! which callers treat as "field absent".

use serde_yaml::{Mapping, Value};
use skyctl_core::TextLogger;
use std::collections::BTreeSet;

use crate::types::MIDI_DATA_2_MAX;

/// One YAML mapping table plus a description of where it came from
#[derive(Debug, Clone)]
pub struct ConfigTable<'a> {
    table: &'a Mapping,
    location: String,
}

impl<'a> ConfigTable<'a> {
    /// Wrap a YAML value, `None` if it is not a table
    pub fn from_value(value: &'a Value, location: impl Into<String>) -> Option<Self> {
        value.as_mapping().map(|table| Self {
            table,
            location: location.into(),
        })
    }

    /// Where this table lives, e.g. `device 'X-Touch', mapping_in #3`
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Whether `key` holds a sequence
    pub fn is_array(&self, key: &str) -> bool {
        matches!(self.table.get(key), Some(Value::Sequence(_)))
    }

    fn get(&self, log: &TextLogger, key: &str, mandatory: bool) -> Option<&'a Value> {
        match self.table.get(key) {
            Some(Value::Null) | None => {
                if mandatory {
                    log.error_at(&self.location, format!("Parameter '{}' is missing", key));
                }
                None
            }
            Some(value) => Some(value),
        }
    }

    /// Read a scalar as text (numbers and booleans are converted)
    pub fn read_string(&self, log: &TextLogger, key: &str, mandatory: bool) -> Option<String> {
        let value = self.get(log, key, mandatory)?;
        let text = scalar_to_string(value);
        if text.is_none() {
            self.type_error(log, key, "text");
        }
        text
    }

    pub fn read_int(&self, log: &TextLogger, key: &str, mandatory: bool) -> Option<i64> {
        match self.get(log, key, mandatory)? {
            Value::Number(n) if n.is_i64() => n.as_i64(),
            Value::Number(n) if n.is_u64() => {
                self.range_error(log, key, &n.to_string());
                None
            }
            _ => {
                self.type_error(log, key, "an integer");
                None
            }
        }
    }

    /// Read a number (integers are accepted)
    pub fn read_float(&self, log: &TextLogger, key: &str, mandatory: bool) -> Option<f32> {
        match self.get(log, key, mandatory)? {
            Value::Number(n) => n.as_f64().map(|v| v as f32),
            _ => {
                self.type_error(log, key, "a number");
                None
            }
        }
    }

    /// Read an integer within `min..=max`
    pub fn read_ranged(
        &self,
        log: &TextLogger,
        key: &str,
        mandatory: bool,
        min: i64,
        max: i64,
    ) -> Option<u8> {
        let value = self.read_int(log, key, mandatory)?;
        if (min..=max).contains(&value) {
            Some(value as u8)
        } else {
            self.range_error(log, key, &value.to_string());
            None
        }
    }

    /// Read a MIDI data value (0-127)
    pub fn read_midi_value(&self, log: &TextLogger, key: &str, mandatory: bool) -> Option<u8> {
        self.read_ranged(log, key, mandatory, 0, i64::from(MIDI_DATA_2_MAX))
    }

    /// Read a scalar or a sequence of scalars, keeping order and duplicates
    pub fn read_string_list(&self, log: &TextLogger, key: &str, mandatory: bool) -> Vec<String> {
        let Some(value) = self.get(log, key, mandatory) else {
            return Vec::new();
        };

        match value {
            Value::Sequence(items) => items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| {
                    let text = scalar_to_string(item);
                    if text.is_none() {
                        log.error_at(
                            &self.location,
                            format!("Parameter '{}' entry {} is not a value", key, index + 1),
                        );
                    }
                    text
                })
                .collect(),
            scalar => match scalar_to_string(scalar) {
                Some(text) => vec![text],
                None => {
                    self.type_error(log, key, "a value or a list of values");
                    Vec::new()
                }
            },
        }
    }

    /// Read a scalar or a sequence of scalars as a set
    pub fn read_string_set(
        &self,
        log: &TextLogger,
        key: &str,
        mandatory: bool,
    ) -> BTreeSet<String> {
        self.read_string_list(log, key, mandatory)
            .into_iter()
            .collect()
    }

    /// Read a sequence of tables, e.g. the mapping list of a device
    ///
    /// Entries are located as `<location>, <key> #<n>` (1-based). Entries
    /// that are not tables are logged and skipped.
    pub fn read_table_list(&self, log: &TextLogger, key: &str, mandatory: bool) -> Vec<ConfigTable<'a>> {
        let Some(value) = self.get(log, key, mandatory) else {
            return Vec::new();
        };
        let Value::Sequence(items) = value else {
            self.type_error(log, key, "a list of tables");
            return Vec::new();
        };

        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let location = format!("{}, {} #{}", self.location, key, index + 1);
                let table = ConfigTable::from_value(item, location.as_str());
                if table.is_none() {
                    log.error_at(&location, "Entry is not a table");
                }
                table
            })
            .collect()
    }

    /// Same table under a different location text
    pub fn with_location(self, location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..self
        }
    }

    fn type_error(&self, log: &TextLogger, key: &str, expected: &str) {
        log.error_at(
            &self.location,
            format!("Parameter '{}' is invalid, expected {}", key, expected),
        );
    }

    fn range_error(&self, log: &TextLogger, key: &str, value: &str) {
        log.error_at(
            &self.location,
            format!("Parameter '{}' value '{}' is out of range", key, value),
        );
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
