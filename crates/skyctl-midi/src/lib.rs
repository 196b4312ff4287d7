//! MIDI controller support for flight simulator hosts
//!
//! This crate provides:
//! - Profile loading: devices and their inbound/outbound mappings from YAML
//! - The mapping engine: commands, sliders, encoders, push-and-pull buttons
//!   and internal actions inbound; dataref and command-state LEDs outbound
//! - MIDI device connection and input handling via midir
//! - MIDI message parsing via midly
//! - A [`Controller`] the host calls once per flight-loop tick
//!
//! # Architecture
//!
//! ```text
//! MIDI Device → midir callback → flume channel → Controller::flight_loop() → Profile → Environment
//!                     │                                       │
//!                     └─ push-and-pull timers                 └─ OutboundTask → MIDI Device
//! ```
//!
//! The midir callback only parses and stamps press timers. Mappings always
//! execute on the thread that calls [`Controller::flight_loop`].

pub mod clock;
pub mod config;
pub mod config_table;
pub mod connection;
pub mod device;
pub mod mapping;
pub mod outbound_task;
pub mod profile;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    default_settings_path, load_settings, save_settings, EncoderMode, OutboundSendMode, Settings,
};
pub use connection::{list_input_ports, list_output_ports, MidiConnectionError};
pub use device::{InboundEvent, MidiDevice};
pub use mapping::{ExecuteStatus, InboundMapping, MappingCommon, OutboundMapping, SendMode};
pub use outbound_task::{OutboundMessageType, OutboundTask};
pub use profile::{DeviceProfile, Profile, ProfileError};
pub use types::{Data1Type, MidiMessage, MidiMessageType};

use flume::{Receiver, Sender};
use skyctl_core::config::default_config_dir;
use skyctl_core::{Environment, TextLogger};
use std::path::Path;
use std::sync::Arc;

use device::{forward_message, INBOUND_CHANNEL_CAPACITY};
use mapping::inbound::PressRouter;

/// Error type for controller operations
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Failed to load profile: {0}")]
    Profile(#[from] ProfileError),

    #[error("MIDI connection error: {0}")]
    Connection(#[from] MidiConnectionError),
}

/// Main MIDI controller manager
///
/// Owns the settings, the loaded profile and the device connections.
/// Works without any connected device: messages can be fed through
/// [`inject`](Self::inject) and outbound tasks are returned from every tick.
pub struct Controller<E: Environment> {
    settings: Settings,
    log: Arc<TextLogger>,
    env: E,
    clock: Arc<dyn Clock>,
    profile: Option<Profile>,
    devices: Vec<MidiDevice>,
    /// Press routers by profile device index
    routers: Vec<PressRouter>,
    event_tx: Sender<InboundEvent>,
    event_rx: Receiver<InboundEvent>,
}

impl<E: Environment> Controller<E> {
    /// Create a controller measuring press durations with the system clock
    pub fn new(settings: Settings, env: E) -> Self {
        Self::with_clock(settings, env, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(settings: Settings, env: E, clock: Arc<dyn Clock>) -> Self {
        let log = Arc::new(TextLogger::new());
        settings.apply_to_logger(&log);
        if settings.log_to_file {
            if let Err(e) = log.enable_file_logging(&default_config_dir()) {
                log::warn!("MIDI: File logging disabled: {}", e);
            }
        }

        let (event_tx, event_rx) = flume::bounded(INBOUND_CHANNEL_CAPACITY);

        Self {
            settings,
            log,
            env,
            clock,
            profile: None,
            devices: Vec::new(),
            routers: Vec::new(),
            event_tx,
            event_rx,
        }
    }

    /// Load the configured profile and connect its devices
    pub fn start(&mut self) -> Result<(), ControllerError> {
        let path = self.settings.profile_path();
        self.load_profile_from(&path)?;
        self.connect_devices();
        Ok(())
    }

    /// Tear everything down and start again from the profile file
    pub fn reload(&mut self) -> Result<(), ControllerError> {
        self.log.info("Reload profile");
        self.start()
    }

    /// Replace the active profile without connecting devices
    pub fn load_profile_from(&mut self, path: &Path) -> Result<(), ControllerError> {
        self.teardown();

        let profile = Profile::load(
            path,
            &self.settings,
            Arc::clone(&self.log),
            &self.env,
            Arc::clone(&self.clock),
        )?;

        self.routers = (0..profile.devices().len())
            .map(|index| profile.press_router(index))
            .collect();
        self.profile = Some(profile);
        Ok(())
    }

    /// Connect every device of the active profile
    ///
    /// Devices that can't be connected are logged and skipped. Returns the
    /// number of connected devices.
    pub fn connect_devices(&mut self) -> usize {
        let Some(ref profile) = self.profile else {
            return 0;
        };

        for (index, device) in profile.devices().iter().enumerate() {
            let router = self.routers.get(index).cloned().unwrap_or_default();
            match MidiDevice::connect(index, device, self.event_tx.clone(), router) {
                Ok(connected) => {
                    log::info!("MIDI: Connected to device '{}'", device.name());
                    self.devices.push(connected);
                }
                Err(e) => {
                    self.log.warn(format!(
                        "Device '{}' not connected (port_in '{}'): {}",
                        device.name(),
                        device.port_in(),
                        e
                    ));
                }
            }
        }

        if self.devices.is_empty() {
            log::info!("MIDI: No matching devices found, running without MIDI input");
        }
        self.devices.len()
    }

    /// Queue a message as if profile device `device` had sent it
    pub fn inject(&self, device: usize, message: MidiMessage) -> bool {
        let Some(router) = self.routers.get(device) else {
            log::warn!("MIDI: Message for unknown device #{}", device);
            return false;
        };
        forward_message(&self.event_tx, router, device, message)
    }

    /// One flight-loop tick
    ///
    /// Executes queued inbound messages, retries deferred push-and-pull
    /// presses, then evaluates the outbound mappings. Tasks are sent to the
    /// connected devices and also returned (with their device index).
    pub fn flight_loop(&mut self) -> Vec<(usize, OutboundTask)> {
        let Some(profile) = self.profile.as_mut() else {
            // Nobody to deliver to
            self.event_rx.drain().for_each(drop);
            return Vec::new();
        };

        while let Ok(event) = self.event_rx.try_recv() {
            profile.handle_message(&self.env, event.device, &event.message);
        }
        profile.process_pending(&self.env);

        let mut sent = Vec::new();
        for index in 0..profile.devices().len() {
            let tasks = profile.outbound_tasks(&self.env, index);
            if tasks.is_empty() {
                continue;
            }
            if let Some(device) = self.devices.iter_mut().find(|d| d.index() == index) {
                device.send_tasks(&tasks);
            }
            sent.extend(tasks.into_iter().map(|task| (index, task)));
        }
        sent
    }

    /// Send the rest state to every device, close the connections and drop
    /// the profile
    ///
    /// Returns the reset tasks. Safe to call repeatedly.
    pub fn teardown(&mut self) -> Vec<(usize, OutboundTask)> {
        let mut reset = Vec::new();
        if let Some(profile) = self.profile.take() {
            for index in 0..profile.devices().len() {
                let tasks = profile.reset_tasks(index);
                if let Some(device) = self.devices.iter_mut().find(|d| d.index() == index) {
                    device.send_tasks(&tasks);
                }
                reset.extend(tasks.into_iter().map(|task| (index, task)));
            }
            log::info!("MIDI: Profile '{}' unloaded", profile.source());
        }

        for device in self.devices.drain(..) {
            device.close();
        }
        self.routers.clear();
        self.event_rx.drain().for_each(drop);
        reset
    }

    /// Check if a profile is loaded
    pub fn is_loaded(&self) -> bool {
        self.profile.is_some()
    }

    /// Number of connected devices
    pub fn connected_devices(&self) -> usize {
        self.devices.len()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Messages of the controller and the profile
    pub fn log(&self) -> &Arc<TextLogger> {
        &self.log
    }

    pub fn env(&self) -> &E {
        &self.env
    }
}

impl<E: Environment> Drop for Controller<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyctl_core::{DataValue, MemoryEnvironment};
    use std::path::PathBuf;

    const PROFILE: &str = r#"
devices:
  - name: Panel
    port_in: "skyctl test port that does not exist"
    mapping_in:
      - { ch: 11, note: 1, type: cmd, command: sim/lights }
      - { ch: 11, note: 5, type: pnp, command_push: sim/push, command_pull: sim/pull }
      - { ch: 11, cc: 1, type: enc, dataref: sim/hdg, modifier_up: 1, modifier_down: -1 }
    mapping_out:
      - { ch: 11, note: 8, type: drf, dataref: sim/gear, value_on: 1 }
"#;

    fn write_profile(dir: &Path, yaml: &str) -> PathBuf {
        let path = dir.join("skyctl_profile.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn controller(path: &Path) -> (Controller<MemoryEnvironment>, Arc<ManualClock>) {
        let env = MemoryEnvironment::new();
        env.insert("sim/hdg", DataValue::Float(10.0));
        env.insert("sim/gear", DataValue::Int(0));

        let settings = Settings {
            profile_path: Some(path.to_path_buf()),
            ..Settings::default()
        };
        let clock = ManualClock::new();
        let mut controller = Controller::with_clock(settings, env, clock.clone());
        controller.load_profile_from(path).unwrap();
        (controller, clock)
    }

    fn note(message_type: MidiMessageType, note: u8) -> MidiMessage {
        let data_2 = if message_type == MidiMessageType::NoteOn { 127 } else { 0 };
        MidiMessage::new(message_type, 11, note, data_2)
    }

    #[test]
    fn test_inbound_messages_run_on_flight_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, _) = controller(&write_profile(dir.path(), PROFILE));
        assert!(controller.profile().unwrap().is_valid());

        assert!(controller.inject(0, note(MidiMessageType::NoteOn, 1)));
        assert!(controller.env().executed_commands().is_empty());

        controller.flight_loop();
        assert_eq!(controller.env().executed_commands(), vec!["sim/lights"]);

        assert!(controller.inject(0, MidiMessage::new(MidiMessageType::ControlChange, 11, 1, 65)));
        controller.flight_loop();
        assert_eq!(controller.env().value("sim/hdg"), Some(DataValue::Float(11.0)));
    }

    #[test]
    fn test_push_pull_across_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, clock) = controller(&write_profile(dir.path(), PROFILE));

        controller.inject(0, note(MidiMessageType::NoteOn, 5));
        controller.flight_loop();
        clock.set_secs(0.3);
        controller.flight_loop();
        assert!(controller.env().executed_commands().is_empty());

        clock.set_secs(0.6);
        controller.flight_loop();
        assert_eq!(controller.env().take_executed_commands(), vec!["sim/pull"]);

        // Short press
        clock.set_secs(1.0);
        controller.inject(0, note(MidiMessageType::NoteOn, 5));
        controller.flight_loop();
        clock.set_secs(1.2);
        controller.inject(0, note(MidiMessageType::NoteOff, 5));
        controller.flight_loop();
        assert_eq!(controller.env().take_executed_commands(), vec!["sim/push"]);
    }

    #[test]
    fn test_outbound_tasks_and_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, _) = controller(&write_profile(dir.path(), PROFILE));

        assert!(controller.flight_loop().is_empty());
        controller.env().set("sim/gear", DataValue::Int(1));
        let tasks = controller.flight_loop();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].0, 0);
        assert_eq!(tasks[0].1.message_type, OutboundMessageType::NoteOn);

        let reset = controller.teardown();
        assert_eq!(reset.len(), 1);
        assert_eq!(reset[0].1.message_type, OutboundMessageType::NoteOff);
        assert!(!controller.is_loaded());
        assert!(controller.teardown().is_empty());
        assert!(!controller.inject(0, note(MidiMessageType::NoteOn, 1)));
    }

    #[test]
    fn test_start_without_devices() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_profile(dir.path(), PROFILE);
        let (mut controller, _) = controller(&path);

        controller.start().unwrap();
        assert!(controller.is_loaded());
        assert_eq!(controller.connected_devices(), 0);
        assert!(controller.log().has_warnings());
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_profile(dir.path(), PROFILE);
        let (mut controller, _) = controller(&path);

        let changed = PROFILE.replace("sim/lights", "sim/beacon");
        std::fs::write(&path, changed).unwrap();
        controller.reload().unwrap();

        controller.inject(0, note(MidiMessageType::NoteOn, 1));
        controller.flight_loop();
        assert_eq!(controller.env().executed_commands(), vec!["sim/beacon"]);
    }

    #[test]
    fn test_missing_profile() {
        let dir = tempfile::tempdir().unwrap();
        let env = MemoryEnvironment::new();
        let mut controller = Controller::with_clock(Settings::default(), env, ManualClock::new());

        let result = controller.load_profile_from(&dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(ControllerError::Profile(_))));
        assert!(!controller.is_loaded());
        assert!(controller.flight_loop().is_empty());
    }
}
