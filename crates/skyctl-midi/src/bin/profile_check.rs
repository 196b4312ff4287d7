//! Offline profile validation
//!
//! Usage: `skyctl-profile-check [PROFILE] [--list-ports] [--short]`
//!
//! Loads a profile without a simulator (every dataref is assumed to exist),
//! prints the mappings of each device and exits with status 1 if the
//! profile has errors. Without a path the configured profile is checked.

use skyctl_core::{Environment, TextLogger};
use skyctl_midi::{
    default_settings_path, list_input_ports, list_output_ports, load_settings, ManualClock, Profile,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Simulator stand-in that accepts every dataref and command
struct OfflineEnvironment;

impl Environment for OfflineEnvironment {
    fn check(&self, _name: &str) -> bool {
        true
    }

    fn read(&self, _log: &TextLogger, _name: &str) -> Option<String> {
        Some("0".to_string())
    }

    fn write(&self, _log: &TextLogger, _name: &str, _value: &str) -> bool {
        true
    }

    fn execute(&self, log: &TextLogger, command: &str) {
        log.debug(format!("Command '{}' not executed (offline)", command));
    }
}

fn print_ports() {
    match list_input_ports() {
        Ok(ports) => {
            println!("MIDI input ports:");
            ports.iter().for_each(|p| println!("  {}", p));
        }
        Err(e) => eprintln!("{}", e),
    }
    match list_output_ports() {
        Ok(ports) => {
            println!("MIDI output ports:");
            ports.iter().for_each(|p| println!("  {}", p));
        }
        Err(e) => eprintln!("{}", e),
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let list_ports = args.iter().any(|arg| arg == "--list-ports");
    let short = args.iter().any(|arg| arg == "--short");

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if list_ports {
        print_ports();
    }

    let settings = load_settings(&default_settings_path());
    let path = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .map(PathBuf::from)
        .unwrap_or_else(|| settings.profile_path());

    let log = Arc::new(TextLogger::new());
    settings.apply_to_logger(&log);

    let profile = match Profile::load(&path, &settings, log.clone(), &OfflineEnvironment, ManualClock::new()) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    for device in profile.devices() {
        println!("Device '{}' (in: '{}', out: '{}')", device.name(), device.port_in(), device.port_out().unwrap_or("-"));
        for mapping in device.mapping_in() {
            println!("{}", mapping.map_text(short));
        }
        for mapping in device.mapping_out() {
            println!("{}", mapping.map_text(short));
        }
    }

    if profile.is_valid() {
        println!("Profile '{}' is valid", profile.source());
        ExitCode::SUCCESS
    } else {
        println!("{}", log.messages_as_text());
        println!(
            "Profile '{}' has {} error(s)",
            profile.source(),
            profile.log().error_count()
        );
        ExitCode::FAILURE
    }
}
