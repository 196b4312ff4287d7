//! Device transport
//!
//! Each profile device gets one midir input connection and, if `port_out` is
//! set, one output connection. The input callback runs on the MIDI driver
//! thread: it parses the bytes, stamps push-and-pull timers and hands the
//! message to the flight loop through a bounded flume channel. Mappings are
//! never executed on the driver thread.

use flume::Sender;
use midir::{MidiInputConnection, MidiOutputConnection};

use crate::connection::{connect_output, find_input_port, MidiConnectionError};
use crate::mapping::inbound::PressRouter;
use crate::outbound_task::OutboundTask;
use crate::profile::DeviceProfile;
use crate::types::MidiMessage;

/// Capacity of the input → flight loop channel
pub const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// A parsed message tagged with the profile device it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundEvent {
    pub device: usize,
    pub message: MidiMessage,
}

/// Mark press timers and queue the message for the flight loop
///
/// Never blocks. Returns `false` if the channel was full and the message
/// was dropped.
pub fn forward_message(
    tx: &Sender<InboundEvent>,
    router: &PressRouter,
    device: usize,
    message: MidiMessage,
) -> bool {
    router.mark(&message);
    if tx.try_send(InboundEvent { device, message }).is_err() {
        log::warn!("MIDI: Message channel full, dropping message");
        return false;
    }
    true
}

/// Callback data passed to midir
struct CallbackData {
    device: usize,
    tx: Sender<InboundEvent>,
    router: PressRouter,
}

/// Open connections of one profile device
pub struct MidiDevice {
    index: usize,
    name: String,
    /// Kept alive for the lifetime of the device
    input: MidiInputConnection<CallbackData>,
    output: Option<MidiOutputConnection>,
}

impl MidiDevice {
    /// Connect the ports of profile device `index`
    pub fn connect(
        index: usize,
        profile: &DeviceProfile,
        tx: Sender<InboundEvent>,
        router: PressRouter,
    ) -> Result<Self, MidiConnectionError> {
        let (midi_in, port) = find_input_port(profile.port_in())?;

        let callback_data = CallbackData {
            device: index,
            tx,
            router,
        };

        let input = midi_in
            .connect(&port, "skyctl-midi-input", Self::midi_callback, callback_data)
            .map_err(|e| MidiConnectionError::ConnectionError(e.to_string()))?;

        log::info!("MIDI: Input connected for device '{}'", profile.name());

        let output = profile.port_out().and_then(connect_output);

        Ok(Self {
            index,
            name: profile.name().to_string(),
            input,
            output,
        })
    }

    /// The midir callback function
    ///
    /// Called from the MIDI driver thread whenever a message is received.
    /// Must be fast and non-blocking.
    fn midi_callback(_timestamp: u64, data: &[u8], callback_data: &mut CallbackData) {
        let Some(message) = MidiMessage::parse(data) else {
            log::trace!("[MIDI IN] Ignored {:02X?}", data);
            return;
        };

        forward_message(
            &callback_data.tx,
            &callback_data.router,
            callback_data.device,
            message,
        );
    }

    /// Index of the device in the profile
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Serialize and send one task (no-op without an output connection)
    pub fn send_task(&mut self, task: &OutboundTask) {
        let Some(ref mut connection) = self.output else {
            return;
        };
        let Some(bytes) = task.to_bytes() else {
            return;
        };

        log::debug!(
            "[MIDI OUT] {} {:?} ch={} data_1={} data_2={}",
            self.name,
            task.message_type,
            task.channel,
            task.data_1,
            task.data_2
        );

        if let Err(e) = connection.send(&bytes) {
            log::warn!("MIDI output: Failed to send message: {}", e);
        }
    }

    pub fn send_tasks(&mut self, tasks: &[OutboundTask]) {
        for task in tasks {
            self.send_task(task);
        }
    }

    /// Close both connections
    pub fn close(self) {
        if let Some(output) = self.output {
            output.close();
        }
        self.input.close();
        log::info!("MIDI: Device '{}' disconnected", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MidiMessageType;

    #[test]
    fn test_forward_message() {
        let (tx, rx) = flume::bounded(1);
        let router = PressRouter::default();
        let message = MidiMessage::new(MidiMessageType::NoteOn, 11, 5, 127);

        assert!(forward_message(&tx, &router, 2, message));
        assert_eq!(rx.try_recv().unwrap(), InboundEvent { device: 2, message });
    }

    #[test]
    fn test_forward_drops_when_full() {
        let (tx, rx) = flume::bounded(1);
        let router = PressRouter::default();
        let message = MidiMessage::new(MidiMessageType::ControlChange, 11, 1, 64);

        assert!(forward_message(&tx, &router, 0, message));
        assert!(!forward_message(&tx, &router, 0, message));
        assert_eq!(rx.drain().count(), 1);
    }
}
