//! Command-state outbound mapping: LED lit while a command is held active

use skyctl_core::{Environment, TextLogger};

use super::{state_task, Data2Values};
use crate::config::OutboundSendMode;
use crate::config_table::ConfigTable;
use crate::mapping::inbound::{check_command, CFG_KEY_COMMAND};
use crate::mapping::{MapText, MappingCommon};
use crate::outbound_task::OutboundTask;
use crate::types::{MIDI_DATA_2_MAX, MIDI_DATA_2_MIN};

#[derive(Debug)]
pub struct CommandStateMapping {
    pub(crate) common: MappingCommon,
    command: String,
    data_2: Data2Values,
    last_state: Option<bool>,
}

impl CommandStateMapping {
    pub fn new(common: MappingCommon, command: &str) -> Self {
        Self {
            common,
            command: command.to_string(),
            data_2: Data2Values::default(),
            last_state: None,
        }
    }

    pub fn read_config(log: &TextLogger, table: &ConfigTable) -> Self {
        log.debug_at(table.location(), "Read settings for type 'cmd'");
        let common = MappingCommon::read_common_config(log, table, true);
        let command = table
            .read_string(log, CFG_KEY_COMMAND, false)
            .unwrap_or_default();

        let mut mapping = Self::new(common, &command);
        mapping.data_2 = Data2Values::read_config(log, table);
        mapping
    }

    pub fn check(&self, log: &TextLogger) -> bool {
        let mut valid = self.common.check(log);
        valid &= check_command(log, &self.common, CFG_KEY_COMMAND, &self.command);
        valid &= self.data_2.check(log, &self.common);
        valid
    }

    pub fn execute(
        &mut self,
        env: &dyn Environment,
        mode: OutboundSendMode,
        sublayer: &str,
    ) -> Option<OutboundTask> {
        if !self.common.check_sublayer(sublayer) {
            return None;
        }

        let active = env.is_command_active(&self.command);
        let changed = matches!(self.last_state, Some(last) if last != active);
        self.last_state = Some(active);

        if mode == OutboundSendMode::OnChange && !changed {
            return None;
        }

        let data_2 = if active {
            self.data_2.on.unwrap_or(MIDI_DATA_2_MAX)
        } else {
            self.data_2.off.unwrap_or(MIDI_DATA_2_MIN)
        };
        state_task(&self.common, active, data_2, changed)
    }

    pub fn map_text(&self, short: bool) -> &str {
        self.common.map_text(short, || {
            MapText::new(short, "Command state", &self.common)
                .push(format!("Command = '{}'", self.command))
                .finish()
        })
    }
}
