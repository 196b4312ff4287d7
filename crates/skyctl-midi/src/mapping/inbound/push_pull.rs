//! Push-and-pull mapping: one button, two commands
//!
//! A short press executes `command_push`, a press held longer than
//! [`PUSH_PULL_THRESHOLD_MICROS`] executes `command_pull`. Press and release
//! times are stamped on the MIDI input thread through a [`PressRouter`]
//! while the decision is taken on the flight-loop thread, so the two
//! timestamps live in independent atomics.
//!
//! ```text
//! idle --press--> received --release--> resolved (push | pull) --> idle
//!                    \--no release within threshold--> pull --> idle
//! ```

use skyctl_core::{Environment, TextLogger};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{ExecuteStatus, InboundMapping};
use crate::clock::Clock;
use crate::config_table::ConfigTable;
use crate::mapping::{MapText, MappingCommon};
use crate::types::MidiMessage;

pub const CFG_KEY_COMMAND_PUSH: &str = "command_push";
pub const CFG_KEY_COMMAND_PULL: &str = "command_pull";

/// Press duration separating push from pull (0.5 s)
pub const PUSH_PULL_THRESHOLD_MICROS: u64 = 500_000;

/// Marks an empty timestamp cell
const NO_TIME: u64 = u64::MAX;

/// Received/released timestamps of one push-and-pull control
pub struct PushPullTimer {
    clock: Arc<dyn Clock>,
    received: AtomicU64,
    released: AtomicU64,
}

impl fmt::Debug for PushPullTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushPullTimer")
            .field("received", &self.received())
            .field("released", &self.released())
            .finish()
    }
}

impl PushPullTimer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            received: AtomicU64::new(NO_TIME),
            released: AtomicU64::new(NO_TIME),
        }
    }

    /// Button went down: forget any stale release and stamp the press
    pub fn mark_received(&self) {
        self.released.store(NO_TIME, Ordering::Release);
        self.received
            .store(self.clock.now_micros(), Ordering::Release);
    }

    /// Button came up: stamped only while a press is pending
    pub fn mark_released(&self) {
        if self.received().is_some() {
            self.released
                .store(self.clock.now_micros(), Ordering::Release);
        }
    }

    /// Forget the press stamped at `received`
    ///
    /// A newer press stamped by the input thread in the meantime is kept.
    pub fn clear(&self, received: u64) {
        if self
            .received
            .compare_exchange(received, NO_TIME, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.released.store(NO_TIME, Ordering::Release);
        }
    }

    pub fn received(&self) -> Option<u64> {
        load(&self.received)
    }

    pub fn released(&self) -> Option<u64> {
        load(&self.released)
    }

    fn now(&self) -> u64 {
        self.clock.now_micros()
    }
}

fn load(cell: &AtomicU64) -> Option<u64> {
    match cell.load(Ordering::Acquire) {
        NO_TIME => None,
        time => Some(time),
    }
}

#[derive(Debug)]
pub struct PushPullMapping {
    pub(crate) common: MappingCommon,
    command_push: String,
    command_pull: String,
    timer: Arc<PushPullTimer>,
}

impl PushPullMapping {
    pub fn new(common: MappingCommon, push: &str, pull: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            common,
            command_push: push.to_string(),
            command_pull: pull.to_string(),
            timer: Arc::new(PushPullTimer::new(clock)),
        }
    }

    pub fn read_config(log: &TextLogger, table: &ConfigTable, clock: Arc<dyn Clock>) -> Self {
        log.debug_at(table.location(), "Read settings for type 'pnp'");
        let common = MappingCommon::read_common_config(log, table, true);
        let push = table
            .read_string(log, CFG_KEY_COMMAND_PUSH, false)
            .unwrap_or_default();
        let pull = table
            .read_string(log, CFG_KEY_COMMAND_PULL, false)
            .unwrap_or_default();
        Self::new(common, &push, &pull, clock)
    }

    pub fn check(&self, log: &TextLogger) -> bool {
        let mut valid = self.common.check(log);
        if self.command_push.is_empty() && self.command_pull.is_empty() {
            log.error_at(
                self.common.source_line(),
                format!(
                    "Parameters '{}' and '{}' are not defined",
                    CFG_KEY_COMMAND_PUSH, CFG_KEY_COMMAND_PULL
                ),
            );
            valid = false;
        }
        valid
    }

    /// Timer shared with the input thread
    pub fn timer(&self) -> Arc<PushPullTimer> {
        Arc::clone(&self.timer)
    }

    /// Resolve a pending press
    ///
    /// Returns [`ExecuteStatus::Deferred`] while the button is still held
    /// and the threshold hasn't passed yet.
    pub fn execute(&self, log: &TextLogger, env: &dyn Environment, sublayer: &str) -> ExecuteStatus {
        let timer = &self.timer;

        let Some(received) = timer.received() else {
            return ExecuteStatus::Completed;
        };
        if !self.common.check_sublayer(sublayer) {
            timer.clear(received);
            return ExecuteStatus::Completed;
        }

        let released = timer.released();
        if released.is_none() && timer.now().saturating_sub(received) < PUSH_PULL_THRESHOLD_MICROS {
            return ExecuteStatus::Deferred;
        }

        let long_press = match released {
            Some(released) => released.saturating_sub(received) > PUSH_PULL_THRESHOLD_MICROS,
            None => true,
        };

        let command = if long_press {
            &self.command_pull
        } else {
            &self.command_push
        };

        if !command.is_empty() {
            log.debug(format!(
                " --> Execute {} command '{}'",
                if long_press { "pull" } else { "push" },
                command
            ));
            env.execute(log, command);
        }

        timer.clear(received);
        ExecuteStatus::Completed
    }

    pub fn map_text(&self, short: bool) -> &str {
        self.common.map_text(short, || {
            MapText::new(short, "Push & Pull", &self.common)
                .push(format!("Command push = '{}'", self.command_push))
                .push(format!("Command pull = '{}'", self.command_pull))
                .finish()
        })
    }
}

/// Routes press/release messages of one device to its push-and-pull timers
///
/// Cheap to clone; the input callback owns one copy.
#[derive(Debug, Clone, Default)]
pub struct PressRouter {
    timers: HashMap<String, Vec<Arc<PushPullTimer>>>,
}

impl PressRouter {
    /// Collect the timers of all push-and-pull mappings
    pub fn from_mappings<'a>(mappings: impl IntoIterator<Item = &'a InboundMapping>) -> Self {
        let mut router = Self::default();
        for mapping in mappings {
            if let Some(timer) = mapping.push_pull_timer() {
                router
                    .timers
                    .entry(mapping.common().key())
                    .or_default()
                    .push(timer);
            }
        }
        router
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Stamp the timers registered for the message's key
    pub fn mark(&self, msg: &MidiMessage) {
        let Some(timers) = self.timers.get(&msg.key()) else {
            return;
        };

        if msg.is_press() {
            log::trace!("[MIDI IN] Press received for {}", msg.key());
            timers.iter().for_each(|t| t.mark_received());
        } else if msg.is_release() {
            log::trace!("[MIDI IN] Press released for {}", msg.key());
            timers.iter().for_each(|t| t.mark_released());
        }
    }
}
