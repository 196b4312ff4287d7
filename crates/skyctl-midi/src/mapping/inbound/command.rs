//! Command mapping: one simulator command per received message

use skyctl_core::{Environment, TextLogger};

use super::{check_command, ExecuteStatus, CFG_KEY_COMMAND};
use crate::config_table::ConfigTable;
use crate::mapping::{MapText, MappingCommon};

#[derive(Debug)]
pub struct CommandMapping {
    pub(crate) common: MappingCommon,
    command: String,
}

impl CommandMapping {
    pub fn new(common: MappingCommon, command: &str) -> Self {
        Self {
            common,
            command: command.to_string(),
        }
    }

    pub fn read_config(log: &TextLogger, table: &ConfigTable) -> Self {
        log.debug_at(table.location(), "Read settings for type 'cmd'");
        let common = MappingCommon::read_common_config(log, table, true);
        let command = table
            .read_string(log, CFG_KEY_COMMAND, false)
            .unwrap_or_default();
        Self { common, command }
    }

    pub fn check(&self, log: &TextLogger) -> bool {
        let mut valid = self.common.check(log);
        valid &= check_command(log, &self.common, CFG_KEY_COMMAND, &self.command);
        valid
    }

    pub fn execute(&self, log: &TextLogger, env: &dyn Environment, sublayer: &str) -> ExecuteStatus {
        if !self.common.check_sublayer(sublayer) {
            return ExecuteStatus::Completed;
        }

        log.debug(format!(" --> Execute command '{}'", self.command));
        env.execute(log, &self.command);
        ExecuteStatus::Completed
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn map_text(&self, short: bool) -> &str {
        self.common.map_text(short, || {
            MapText::new(short, "Command", &self.common)
                .push(format!("Command = '{}'", self.command))
                .finish()
        })
    }
}
