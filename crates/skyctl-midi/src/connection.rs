//! MIDI port discovery and connection
//!
//! Uses midir for cross-platform MIDI I/O (ALSA on Linux, CoreMIDI on macOS, WinMM on Windows).

use midir::{MidiInput, MidiInputPort, MidiOutput, MidiOutputConnection};

/// Error type for MIDI connection operations
#[derive(Debug, thiserror::Error)]
pub enum MidiConnectionError {
    #[error("Failed to initialize MIDI input: {0}")]
    InputInitError(String),

    #[error("Failed to initialize MIDI output: {0}")]
    OutputInitError(String),

    #[error("No MIDI input ports available")]
    NoInputPorts,

    #[error("No MIDI port found matching pattern: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    ConnectionError(String),

    #[error("Failed to get port info: {0}")]
    PortInfoError(String),
}

/// Strip platform decorations from a port name
///
/// ALSA appends a hardware ID (`"[hw:3,0,0]"`) or a sequencer
/// `client:port` pair (`"28:0"`) that changes between sessions.
pub fn normalize_port_name(name: &str) -> String {
    let mut result = name.trim();

    if let Some(bracket_pos) = result.rfind('[') {
        result = result[..bracket_pos].trim();
    }

    if let Some(last_space) = result.rfind(' ') {
        let suffix = &result[last_space + 1..];
        if let Some((client, port)) = suffix.split_once(':') {
            let is_number = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
            if is_number(client) && is_number(port) {
                result = result[..last_space].trim();
            }
        }
    }

    result.to_string()
}

/// Case-insensitive substring match of a profile pattern against a port name
///
/// Both sides are normalized first. An empty pattern matches nothing.
pub fn port_matches(actual_port: &str, pattern: &str) -> bool {
    let pattern = normalize_port_name(pattern).to_lowercase();
    if pattern.is_empty() {
        return false;
    }
    normalize_port_name(actual_port)
        .to_lowercase()
        .contains(&pattern)
}

/// Find an input port matching `pattern`
///
/// Returns the `MidiInput` so the caller can connect it with its own callback.
pub fn find_input_port(pattern: &str) -> Result<(MidiInput, MidiInputPort), MidiConnectionError> {
    let midi_in = MidiInput::new("skyctl-midi-in")
        .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

    let in_ports = midi_in.ports();
    if in_ports.is_empty() {
        return Err(MidiConnectionError::NoInputPorts);
    }

    let input_port = in_ports
        .into_iter()
        .find(|port| {
            midi_in
                .port_name(port)
                .map(|name| port_matches(&name, pattern))
                .unwrap_or(false)
        })
        .ok_or_else(|| MidiConnectionError::PortNotFound(pattern.to_string()))?;

    let port_name = midi_in
        .port_name(&input_port)
        .map_err(|e| MidiConnectionError::PortInfoError(e.to_string()))?;

    log::info!("MIDI: Found input port: {}", port_name);

    Ok((midi_in, input_port))
}

/// Connect to an output port matching `pattern`
///
/// Output is optional for a device, so failures are logged and give `None`.
pub fn connect_output(pattern: &str) -> Option<MidiOutputConnection> {
    let midi_out = match MidiOutput::new("skyctl-midi-out") {
        Ok(out) => out,
        Err(e) => {
            log::warn!("MIDI: Failed to initialize output: {}", e);
            return None;
        }
    };

    let out_ports = midi_out.ports();
    let Some(output_port) = out_ports.iter().find(|port| {
        midi_out
            .port_name(port)
            .map(|name| port_matches(&name, pattern))
            .unwrap_or(false)
    }) else {
        log::warn!("MIDI: No output port found matching '{}'", pattern);
        return None;
    };

    let port_name = midi_out.port_name(output_port).ok()?;
    log::info!("MIDI: Found output port: {}", port_name);

    match midi_out.connect(output_port, "skyctl-midi-output") {
        Ok(conn) => {
            log::info!("MIDI: Connected to output port");
            Some(conn)
        }
        Err(e) => {
            log::warn!("MIDI: Failed to connect to output: {}", e);
            None
        }
    }
}

/// List all available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>, MidiConnectionError> {
    let midi_in = MidiInput::new("skyctl-midi-list")
        .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

    let ports: Vec<String> = midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect();

    Ok(ports)
}

/// List all available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>, MidiConnectionError> {
    let midi_out = MidiOutput::new("skyctl-midi-list")
        .map_err(|e| MidiConnectionError::OutputInitError(e.to_string()))?;

    let ports: Vec<String> = midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect();

    Ok(ports)
}
