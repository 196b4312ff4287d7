//! Simulator environment seen by the mapping engine
//!
//! The engine never talks to the simulator SDK directly. Datarefs and commands
//! are reached through the [`Environment`] trait, and values always cross the
//! boundary as strings. Hosts implement the trait on top of their SDK;
//! [`MemoryEnvironment`] is a complete in-memory implementation used by tests
//! and the offline tools.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

use crate::TextLogger;

/// Access to simulator datarefs and commands
///
/// Failures are reported to `log` and signalled through the return value,
/// never by panicking.
pub trait Environment {
    /// Whether a dataref with this name exists
    fn check(&self, name: &str) -> bool;

    /// Read a dataref as text, `None` if it can't be read
    fn read(&self, log: &TextLogger, name: &str) -> Option<String>;

    /// Write a dataref from text, `false` if the write failed
    fn write(&self, log: &TextLogger, name: &str, value: &str) -> bool;

    /// Execute a simulator command once
    fn execute(&self, log: &TextLogger, command: &str);

    /// Execute a host-specific internal action
    fn execute_internal(&self, log: &TextLogger, command: &str) {
        log.warn(format!(
            "Internal command '{}' is not supported by this host",
            command
        ));
    }

    /// Whether a command is currently held active by the simulator
    fn is_command_active(&self, _command: &str) -> bool {
        false
    }

    /// Read a dataref and parse it as a number
    fn read_float(&self, log: &TextLogger, name: &str) -> Option<f32> {
        let text = self.read(log, name)?;
        match text.trim().parse::<f32>() {
            Ok(value) => Some(value),
            Err(e) => {
                log.error(format!(
                    "Dataref '{}' value '{}' is not numeric: {}",
                    name, text, e
                ));
                None
            }
        }
    }

    /// Write a number to a dataref
    fn write_float(&self, log: &TextLogger, name: &str, value: f32) -> bool {
        self.write(log, name, &value.to_string())
    }
}

/// Typed dataref value
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Int(i32),
    Float(f32),
    Double(f64),
    Bytes(String),
}

impl DataValue {
    /// Parse text into a value of the same type as `self`
    ///
    /// Integers accept decimal text and truncate it.
    pub fn parse_same(&self, text: &str) -> Option<DataValue> {
        let text = text.trim();
        match self {
            Self::Int(_) => text
                .parse::<i32>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|v| v as i32))
                .map(Self::Int),
            Self::Float(_) => text.parse::<f32>().ok().map(Self::Float),
            Self::Double(_) => text.parse::<f64>().ok().map(Self::Double),
            Self::Bytes(_) => Some(Self::Bytes(text.to_string())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Bytes(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone)]
struct DataItem {
    value: DataValue,
    writeable: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    data: HashMap<String, DataItem>,
    executed: Vec<String>,
    internal: Vec<String>,
    active: HashSet<String>,
}

/// In-memory simulator
///
/// Executed commands are recorded in order so callers can inspect them.
#[derive(Debug, Default)]
pub struct MemoryEnvironment {
    state: Mutex<MemoryState>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a writeable dataref
    pub fn insert(&self, name: &str, value: DataValue) {
        self.insert_item(name, value, true);
    }

    /// Add or replace a read-only dataref
    pub fn insert_readonly(&self, name: &str, value: DataValue) {
        self.insert_item(name, value, false);
    }

    fn insert_item(&self, name: &str, value: DataValue, writeable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state
                .data
                .insert(name.to_string(), DataItem { value, writeable });
        }
    }

    /// Change a dataref value from the simulator side (ignores the writeable flag)
    pub fn set(&self, name: &str, value: DataValue) {
        if let Ok(mut state) = self.state.lock() {
            match state.data.get_mut(name) {
                Some(item) => item.value = value,
                None => {
                    state.data.insert(
                        name.to_string(),
                        DataItem {
                            value,
                            writeable: true,
                        },
                    );
                }
            }
        }
    }

    pub fn remove(&self, name: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.data.remove(name);
        }
    }

    pub fn value(&self, name: &str) -> Option<DataValue> {
        let state = self.state.lock().ok()?;
        state.data.get(name).map(|item| item.value.clone())
    }

    /// Commands executed so far, oldest first
    pub fn executed_commands(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.executed.clone())
            .unwrap_or_default()
    }

    /// Drain the executed command list
    pub fn take_executed_commands(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|mut s| std::mem::take(&mut s.executed))
            .unwrap_or_default()
    }

    /// Internal actions executed so far, oldest first
    pub fn internal_commands(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.internal.clone())
            .unwrap_or_default()
    }

    pub fn set_command_active(&self, command: &str, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            if active {
                state.active.insert(command.to_string());
            } else {
                state.active.remove(command);
            }
        }
    }
}

impl Environment for MemoryEnvironment {
    fn check(&self, name: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.data.contains_key(name))
            .unwrap_or(false)
    }

    fn read(&self, log: &TextLogger, name: &str) -> Option<String> {
        match self.value(name) {
            Some(value) => Some(value.to_string()),
            None => {
                log.error(format!("Dataref '{}' not found", name));
                None
            }
        }
    }

    fn write(&self, log: &TextLogger, name: &str, value: &str) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        let Some(item) = state.data.get_mut(name) else {
            log.error(format!("Dataref '{}' not found", name));
            return false;
        };

        if !item.writeable {
            log.error(format!("Dataref '{}' is not writeable", name));
            return false;
        }

        match item.value.parse_same(value) {
            Some(parsed) => {
                item.value = parsed;
                true
            }
            None => {
                log.error(format!(
                    "Value '{}' is not valid for {} dataref '{}'",
                    value,
                    item.value.type_name(),
                    name
                ));
                false
            }
        }
    }

    fn execute(&self, log: &TextLogger, command: &str) {
        log.debug(format!("Execute command '{}'", command));
        if let Ok(mut state) = self.state.lock() {
            state.executed.push(command.to_string());
        }
    }

    fn execute_internal(&self, log: &TextLogger, command: &str) {
        log.debug(format!("Execute internal command '{}'", command));
        if let Ok(mut state) = self.state.lock() {
            state.internal.push(command.to_string());
        }
    }

    fn is_command_active(&self, command: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.active.contains(command))
            .unwrap_or(false)
    }
}
