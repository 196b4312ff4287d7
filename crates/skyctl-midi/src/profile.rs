//! Profile: the devices of one setup and their mappings
//!
//! A profile is loaded from a YAML file (see [`PROFILE_FILE_NAME`]):
//!
//! ```yaml
//! sl_dataref: "sim/custom/sublayer"   # optional
//! devices:
//!   - name: "X-Touch Mini"
//!     port_in: "X-TOUCH MINI"
//!     port_out: "X-TOUCH MINI"
//!     mode_out: on_change
//!     default_enc_mode: relative
//!     mapping_in:
//!       - { ch: 11, cc: 1, type: enc, dataref: "sim/hdg", modifier_up: 1, modifier_down: -1 }
//!     mapping_out:
//!       - { ch: 11, note: 8, type: drf, dataref: "sim/gear", value_on: 1 }
//! ```
//!
//! Every mapping is validated while loading. Invalid mappings are logged and
//! left out, the rest of the profile still works. The profile keeps its own
//! [`TextLogger`] (a child of the controller's) so its error count tells
//! whether the file loaded cleanly.
//!
//! [`PROFILE_FILE_NAME`]: crate::config::PROFILE_FILE_NAME

use serde_yaml::Value;
use skyctl_core::config::{load_document, DocumentError};
use skyctl_core::{Environment, TextLogger};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{EncoderMode, OutboundSendMode, Settings};
use crate::config_table::ConfigTable;
use crate::mapping::inbound::{InboundContext, PressRouter};
use crate::mapping::{ExecuteStatus, InboundMapping, OutboundMapping};
use crate::outbound_task::OutboundTask;
use crate::types::MidiMessage;

pub const CFG_KEY_SL_DATAREF: &str = "sl_dataref";
pub const CFG_KEY_DEVICES: &str = "devices";
pub const CFG_KEY_NAME: &str = "name";
pub const CFG_KEY_PORT_IN: &str = "port_in";
pub const CFG_KEY_PORT_OUT: &str = "port_out";
pub const CFG_KEY_MODE_OUT: &str = "mode_out";
pub const CFG_KEY_DEFAULT_ENC_MODE: &str = "default_enc_mode";
pub const CFG_KEY_MAPPING_IN: &str = "mapping_in";
pub const CFG_KEY_MAPPING_OUT: &str = "mapping_out";

/// Errors that prevent a profile from loading at all
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Invalid profile format: {0}")]
    InvalidFormat(String),
}

/// One configured device with its mappings
#[derive(Debug)]
pub struct DeviceProfile {
    name: String,
    port_in: String,
    port_out: Option<String>,
    mode_out: OutboundSendMode,
    mapping_in: Vec<InboundMapping>,
    mapping_out: Vec<OutboundMapping>,
    /// Inbound mapping indices by key, in profile order
    index_in: HashMap<String, Vec<usize>>,
}

impl DeviceProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input port pattern (case-insensitive substring)
    pub fn port_in(&self) -> &str {
        &self.port_in
    }

    /// Output port pattern, `None` if the device has no LEDs to drive
    pub fn port_out(&self) -> Option<&str> {
        self.port_out.as_deref()
    }

    pub fn mode_out(&self) -> OutboundSendMode {
        self.mode_out
    }

    pub fn mapping_in(&self) -> &[InboundMapping] {
        &self.mapping_in
    }

    pub fn mapping_out(&self) -> &[OutboundMapping] {
        &self.mapping_out
    }

    /// Inbound mappings registered for a key
    pub fn mappings_for(&self, key: &str) -> impl Iterator<Item = &InboundMapping> {
        self.index_in
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|&index| self.mapping_in.get(index))
    }

    fn add_inbound(&mut self, mapping: InboundMapping) {
        self.index_in
            .entry(mapping.common().key())
            .or_default()
            .push(self.mapping_in.len());
        self.mapping_in.push(mapping);
    }
}

/// Push-and-pull press waiting for its release or the failsafe
#[derive(Debug, Clone, Copy)]
struct PendingMessage {
    device: usize,
    mapping: usize,
    message: MidiMessage,
}

/// Loaded profile
pub struct Profile {
    log: TextLogger,
    source: String,
    sl_dataref: Option<String>,
    devices: Vec<DeviceProfile>,
    pending: Vec<PendingMessage>,
    valid: bool,
}

impl Profile {
    /// Load a profile file
    pub fn load(
        path: &Path,
        settings: &Settings,
        parent: Arc<TextLogger>,
        env: &dyn Environment,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProfileError> {
        log::info!("MIDI: Loading profile from {:?}", path);
        let document = load_document(path)?;
        Self::from_value(&document, &path.display().to_string(), settings, parent, env, clock)
    }

    /// Build a profile from an already parsed document
    ///
    /// `source` names the document in diagnostics.
    pub fn from_value(
        document: &Value,
        source: &str,
        settings: &Settings,
        parent: Arc<TextLogger>,
        env: &dyn Environment,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProfileError> {
        let root = ConfigTable::from_value(document, source).ok_or_else(|| {
            ProfileError::InvalidFormat(format!("{} does not contain a table", source))
        })?;

        let log = TextLogger::with_parent(parent);
        log.info(format!("Load profile '{}'", source));

        let sl_dataref = root
            .read_string(&log, CFG_KEY_SL_DATAREF, false)
            .filter(|sl| !sl.is_empty());
        if let Some(ref sl) = sl_dataref {
            if !env.check(sl) {
                log.error_at(source, format!("Sublayer dataref '{}' not found", sl));
            }
        }

        let devices = root
            .read_table_list(&log, CFG_KEY_DEVICES, true)
            .into_iter()
            .enumerate()
            .map(|(index, table)| read_device(&log, table, index, settings, env, &clock))
            .collect::<Vec<_>>();

        let valid = !log.has_errors();
        if valid {
            log.info(format!("Profile '{}' loaded with {} device(s)", source, devices.len()));
        } else {
            log.error(format!(
                "Profile '{}' loaded with {} error(s), invalid mappings are ignored",
                source,
                log.error_count()
            ));
        }

        Ok(Self {
            log,
            source: source.to_string(),
            sl_dataref,
            devices,
            pending: Vec::new(),
            valid,
        })
    }

    /// No errors while loading
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn log(&self) -> &TextLogger {
        &self.log
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn devices(&self) -> &[DeviceProfile] {
        &self.devices
    }

    /// Number of push-and-pull presses still undecided
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Active sublayer, empty if no sublayer dataref is configured
    pub fn current_sublayer(&self, env: &dyn Environment) -> String {
        match self.sl_dataref {
            Some(ref sl) if env.check(sl) => env.read(&self.log, sl).unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Execute every inbound mapping of `device` registered for the message
    pub fn handle_message(&mut self, env: &dyn Environment, device: usize, msg: &MidiMessage) {
        let sublayer = self.current_sublayer(env);
        let Some(dev) = self.devices.get_mut(device) else {
            log::warn!("MIDI: Message for unknown device #{}", device);
            return;
        };

        let key = msg.key();
        self.log.debug(format!(
            "[MIDI IN] {} :: {:?} ch={} data_1={} data_2={}",
            dev.name, msg.message_type, msg.channel, msg.data_1, msg.data_2
        ));

        let Some(indices) = dev.index_in.get(&key) else {
            self.log.debug(format!(" --> No mapping found for '{}'", key));
            return;
        };

        for &index in indices {
            let Some(mapping) = dev.mapping_in.get_mut(index) else {
                continue;
            };
            if mapping.execute(&self.log, env, msg, &sublayer) == ExecuteStatus::Deferred {
                let queued = self
                    .pending
                    .iter()
                    .any(|p| p.device == device && p.mapping == index);
                if !queued {
                    self.pending.push(PendingMessage {
                        device,
                        mapping: index,
                        message: *msg,
                    });
                }
            }
        }
    }

    /// Retry deferred push-and-pull presses
    pub fn process_pending(&mut self, env: &dyn Environment) {
        if self.pending.is_empty() {
            return;
        }

        let sublayer = self.current_sublayer(env);
        let pending = std::mem::take(&mut self.pending);
        for entry in pending {
            let Some(mapping) = self
                .devices
                .get_mut(entry.device)
                .and_then(|dev| dev.mapping_in.get_mut(entry.mapping))
            else {
                continue;
            };
            if mapping.execute(&self.log, env, &entry.message, &sublayer) == ExecuteStatus::Deferred {
                self.pending.push(entry);
            }
        }
    }

    /// Evaluate the outbound mappings of `device` for this tick
    pub fn outbound_tasks(&mut self, env: &dyn Environment, device: usize) -> Vec<OutboundTask> {
        let sublayer = self.current_sublayer(env);
        let Some(dev) = self.devices.get_mut(device) else {
            return Vec::new();
        };

        let mode = dev.mode_out;
        dev.mapping_out
            .iter_mut()
            .filter_map(|mapping| mapping.execute(&self.log, env, mode, &sublayer))
            .collect()
    }

    /// Rest state of every outbound control of `device`
    pub fn reset_tasks(&self, device: usize) -> Vec<OutboundTask> {
        self.devices
            .get(device)
            .map(|dev| dev.mapping_out.iter().filter_map(|m| m.reset()).collect())
            .unwrap_or_default()
    }

    /// Router for the push-and-pull timers of `device`
    pub fn press_router(&self, device: usize) -> PressRouter {
        self.devices
            .get(device)
            .map(|dev| PressRouter::from_mappings(&dev.mapping_in))
            .unwrap_or_default()
    }
}

fn read_device(
    log: &TextLogger,
    table: ConfigTable,
    index: usize,
    settings: &Settings,
    env: &dyn Environment,
    clock: &Arc<dyn Clock>,
) -> DeviceProfile {
    let name = table
        .read_string(log, CFG_KEY_NAME, false)
        .unwrap_or_else(|| format!("device #{}", index + 1));
    let table = table.with_location(format!("device '{}'", name));
    log.info(format!("Read device '{}'", name));

    let port_in = table
        .read_string(log, CFG_KEY_PORT_IN, true)
        .unwrap_or_default();
    let port_out = table
        .read_string(log, CFG_KEY_PORT_OUT, false)
        .filter(|port| !port.is_empty());

    let mode_out = read_mode(log, &table, CFG_KEY_MODE_OUT, settings.default_outbound_mode, OutboundSendMode::parse);
    let default_encoder_mode = read_mode(
        log,
        &table,
        CFG_KEY_DEFAULT_ENC_MODE,
        settings.default_encoder_mode,
        EncoderMode::parse,
    );

    let mut device = DeviceProfile {
        name,
        port_in,
        port_out,
        mode_out,
        mapping_in: Vec::new(),
        mapping_out: Vec::new(),
        index_in: HashMap::new(),
    };

    let ctx = InboundContext {
        default_encoder_mode,
        clock: Arc::clone(clock),
    };
    for entry in table.read_table_list(log, CFG_KEY_MAPPING_IN, false) {
        match InboundMapping::from_config(log, &entry, &ctx) {
            Some(mapping) if mapping.check(log, env) => {
                log.debug(mapping.map_text(false));
                device.add_inbound(mapping);
            }
            _ => log.error_at(entry.location(), "Inbound mapping is invalid and will be ignored"),
        }
    }

    for entry in table.read_table_list(log, CFG_KEY_MAPPING_OUT, false) {
        match OutboundMapping::from_config(log, &entry) {
            Some(mapping) if mapping.check(log, env) => {
                log.debug(mapping.map_text(false));
                device.mapping_out.push(mapping);
            }
            _ => log.error_at(entry.location(), "Outbound mapping is invalid and will be ignored"),
        }
    }

    log.info(format!(
        "Device '{}': {} inbound and {} outbound mapping(s)",
        device.name,
        device.mapping_in.len(),
        device.mapping_out.len()
    ));
    device
}

fn read_mode<T: Copy>(
    log: &TextLogger,
    table: &ConfigTable,
    key: &str,
    default: T,
    parse: fn(&str) -> Option<T>,
) -> T {
    let Some(text) = table.read_string(log, key, false) else {
        return default;
    };
    parse(&text).unwrap_or_else(|| {
        log.error_at(
            table.location(),
            format!("Parameter '{}' value '{}' is invalid", key, text),
        );
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::outbound_task::OutboundMessageType;
    use crate::types::MidiMessageType;
    use skyctl_core::{DataValue, MemoryEnvironment};

    const PROFILE: &str = r#"
sl_dataref: sim/sublayer
devices:
  - name: Panel
    port_in: "X-TOUCH"
    port_out: "X-TOUCH"
    mapping_in:
      - { ch: 11, note: 1, type: cmd, command: sim/first }
      - { ch: 11, note: 1, type: cmd, command: sim/second }
      - { ch: 11, note: 2, type: cmd, command: sim/nav, sl: nav }
      - { ch: 11, note: 5, type: pnp, command_push: sim/push, command_pull: sim/pull }
      - { ch: 11, cc: 10, type: sld, dataref: sim/throttle }
    mapping_out:
      - { ch: 11, note: 8, type: drf, dataref: sim/gear, value_on: 1, value_off: 0 }
  - port_in: "Second"
    mode_out: permanent
"#;

    fn env() -> MemoryEnvironment {
        let env = MemoryEnvironment::new();
        env.insert("sim/sublayer", DataValue::Bytes(String::new()));
        env.insert("sim/throttle", DataValue::Float(0.0));
        env.insert("sim/gear", DataValue::Int(0));
        env
    }

    fn load(yaml: &str, env: &MemoryEnvironment, clock: Arc<ManualClock>) -> Profile {
        let document: Value = serde_yaml::from_str(yaml).unwrap();
        Profile::from_value(
            &document,
            "test",
            &Settings::default(),
            Arc::new(TextLogger::new()),
            env,
            clock,
        )
        .unwrap()
    }

    fn note_on(note: u8) -> MidiMessage {
        MidiMessage::new(MidiMessageType::NoteOn, 11, note, 127)
    }

    #[test]
    fn test_load_devices() {
        let env = env();
        let profile = load(PROFILE, &env, ManualClock::new());

        assert!(profile.is_valid(), "{}", profile.log().messages_as_text());
        assert_eq!(profile.devices().len(), 2);

        let panel = &profile.devices()[0];
        assert_eq!(panel.name(), "Panel");
        assert_eq!(panel.port_out(), Some("X-TOUCH"));
        assert_eq!(panel.mode_out(), OutboundSendMode::OnChange);
        assert_eq!(panel.mapping_in().len(), 5);
        assert_eq!(panel.mapping_out().len(), 1);
        assert_eq!(panel.mappings_for("11|NOTE|1").count(), 2);

        let second = &profile.devices()[1];
        assert_eq!(second.name(), "device #2");
        assert_eq!(second.port_out(), None);
        assert_eq!(second.mode_out(), OutboundSendMode::Permanent);
    }

    #[test]
    fn test_invalid_mappings_are_skipped() {
        let env = env();
        let yaml = r#"
devices:
  - name: Panel
    port_in: "X"
    mapping_in:
      - { ch: 11, note: 1, type: cmd, command: sim/ok }
      - { ch: 11, note: 2, type: cmd }
      - { ch: 11, note: 3, type: sld, dataref: sim/unknown }
      - { ch: 11, type: cmd, command: sim/no_data_1 }
"#;
        let profile = load(yaml, &env, ManualClock::new());

        assert!(!profile.is_valid());
        assert_eq!(profile.devices()[0].mapping_in().len(), 1);
        assert!(profile
            .log()
            .messages_as_text()
            .contains("device 'Panel', mapping_in #3 :: Dataref 'sim/unknown' not found"));
    }

    #[test]
    fn test_negative_encoder_delay_counts_as_error() {
        let env = env();
        let yaml = r#"
devices:
  - name: Panel
    port_in: "X"
    mapping_in:
      - { ch: 11, cc: 1, type: enc, command_up: up, command_down: down, delay: -1 }
"#;
        let profile = load(yaml, &env, ManualClock::new());

        assert!(!profile.is_valid());
        // Range error, rejected mapping and the load summary
        assert_eq!(profile.log().error_count(), 3);
        assert!(profile.devices()[0].mapping_in().is_empty());
    }

    #[test]
    fn test_device_encoder_mode_override() {
        let env = env();
        let yaml = r#"
devices:
  - name: Range
    port_in: "X"
    default_enc_mode: range
    mapping_in:
      - { ch: 11, cc: 1, type: enc, command_up: up, command_down: down }
      - { ch: 11, cc: 2, type: enc, command_up: up, command_down: down, mode: relative }
  - name: Plain
    port_in: "Y"
    mapping_in:
      - { ch: 11, cc: 1, type: enc, command_up: up, command_down: down }
"#;
        let profile = load(yaml, &env, ManualClock::new());
        assert!(profile.is_valid(), "{}", profile.log().messages_as_text());

        let modes = |device: usize| -> Vec<bool> {
            profile.devices()[device]
                .mapping_in()
                .iter()
                .map(|m| m.map_text(true).ends_with("Mode = 'range'"))
                .collect()
        };
        assert_eq!(modes(0), vec![true, false]);
        assert_eq!(modes(1), vec![false]);
    }

    #[test]
    fn test_root_must_be_table() {
        let env = env();
        let document: Value = serde_yaml::from_str("[1, 2]").unwrap();
        let result = Profile::from_value(
            &document,
            "test",
            &Settings::default(),
            Arc::new(TextLogger::new()),
            &env,
            ManualClock::new(),
        );
        assert!(matches!(result, Err(ProfileError::InvalidFormat(_))));
    }

    #[test]
    fn test_message_fans_out_to_all_mappings() {
        let env = env();
        let mut profile = load(PROFILE, &env, ManualClock::new());

        profile.handle_message(&env, 0, &note_on(1));
        assert_eq!(env.take_executed_commands(), vec!["sim/first", "sim/second"]);

        // Other device, unknown key: nothing happens
        profile.handle_message(&env, 1, &note_on(1));
        profile.handle_message(&env, 0, &note_on(99));
        assert!(env.executed_commands().is_empty());
    }

    #[test]
    fn test_sublayer_from_dataref() {
        let env = env();
        let mut profile = load(PROFILE, &env, ManualClock::new());

        profile.handle_message(&env, 0, &note_on(2));
        assert!(env.take_executed_commands().is_empty());

        env.set("sim/sublayer", DataValue::Bytes("nav".into()));
        assert_eq!(profile.current_sublayer(&env), "nav");
        profile.handle_message(&env, 0, &note_on(2));
        assert_eq!(env.take_executed_commands(), vec!["sim/nav"]);
    }

    #[test]
    fn test_slider_writes_dataref() {
        let env = env();
        let mut profile = load(PROFILE, &env, ManualClock::new());

        let msg = MidiMessage::new(MidiMessageType::ControlChange, 11, 10, 127);
        profile.handle_message(&env, 0, &msg);
        assert_eq!(env.value("sim/throttle"), Some(DataValue::Float(1.0)));
    }

    #[test]
    fn test_push_pull_is_deferred_until_failsafe() {
        let env = env();
        let clock = ManualClock::new();
        let mut profile = load(PROFILE, &env, clock.clone());
        let router = profile.press_router(0);
        assert!(!router.is_empty());

        let press = note_on(5);
        router.mark(&press);
        profile.handle_message(&env, 0, &press);
        assert_eq!(profile.pending_count(), 1);

        clock.set_secs(0.2);
        profile.process_pending(&env);
        assert_eq!(profile.pending_count(), 1);
        assert!(env.executed_commands().is_empty());

        clock.set_secs(0.6);
        profile.process_pending(&env);
        assert_eq!(profile.pending_count(), 0);
        assert_eq!(env.take_executed_commands(), vec!["sim/pull"]);
    }

    #[test]
    fn test_push_pull_short_press() {
        let env = env();
        let clock = ManualClock::new();
        let mut profile = load(PROFILE, &env, clock.clone());
        let router = profile.press_router(0);

        let press = note_on(5);
        let release = MidiMessage::new(MidiMessageType::NoteOff, 11, 5, 0);

        router.mark(&press);
        profile.handle_message(&env, 0, &press);
        clock.set_secs(0.2);
        router.mark(&release);
        profile.handle_message(&env, 0, &release);
        profile.process_pending(&env);

        assert_eq!(env.take_executed_commands(), vec!["sim/push"]);
        assert_eq!(profile.pending_count(), 0);
    }

    #[test]
    fn test_outbound_and_reset_tasks() {
        let env = env();
        let mut profile = load(PROFILE, &env, ManualClock::new());

        assert!(profile.outbound_tasks(&env, 0).is_empty());
        env.set("sim/gear", DataValue::Int(1));
        let tasks = profile.outbound_tasks(&env, 0);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].message_type, OutboundMessageType::NoteOn);

        let reset = profile.reset_tasks(0);
        assert_eq!(reset.len(), 1);
        assert_eq!(reset[0].message_type, OutboundMessageType::NoteOff);
        assert_eq!(reset[0].data_2, 0);

        assert!(profile.outbound_tasks(&env, 7).is_empty());
        assert!(profile.reset_tasks(7).is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skyctl_profile.yaml");
        std::fs::write(&path, PROFILE).unwrap();
        let env = env();

        let profile = Profile::load(
            &path,
            &Settings::default(),
            Arc::new(TextLogger::new()),
            &env,
            ManualClock::new(),
        )
        .unwrap();
        assert_eq!(profile.devices().len(), 2);

        let missing = Profile::load(
            &dir.path().join("missing.yaml"),
            &Settings::default(),
            Arc::new(TextLogger::new()),
            &env,
            ManualClock::new(),
        );
        assert!(matches!(
            missing,
            Err(ProfileError::Document(DocumentError::NotFound(_)))
        ));
    }

    #[test]
    fn test_errors_reach_parent_logger() {
        let env = env();
        let parent = Arc::new(TextLogger::new());
        let document: Value =
            serde_yaml::from_str("{ devices: [{ name: X, mapping_in: [{ note: 1, type: cmd }] }] }").unwrap();
        let profile = Profile::from_value(
            &document,
            "test",
            &Settings::default(),
            parent.clone(),
            &env,
            ManualClock::new(),
        )
        .unwrap();

        assert!(!profile.is_valid());
        assert!(parent.has_errors());
    }
}
