//! Internal mapping: host specific actions (reload profile, toggle windows, ...)

use skyctl_core::{Environment, TextLogger};

use super::{check_command, ExecuteStatus, CFG_KEY_COMMAND};
use crate::config_table::ConfigTable;
use crate::mapping::{MapText, MappingCommon};

#[derive(Debug)]
pub struct InternalMapping {
    pub(crate) common: MappingCommon,
    command: String,
}

impl InternalMapping {
    pub fn read_config(log: &TextLogger, table: &ConfigTable) -> Self {
        log.debug_at(table.location(), "Read settings for type 'int'");
        Self {
            common: MappingCommon::read_common_config(log, table, true),
            command: table
                .read_string(log, CFG_KEY_COMMAND, false)
                .unwrap_or_default(),
        }
    }

    pub fn check(&self, log: &TextLogger) -> bool {
        let mut valid = self.common.check(log);
        valid &= check_command(log, &self.common, CFG_KEY_COMMAND, &self.command);
        valid
    }

    pub fn execute(&self, log: &TextLogger, env: &dyn Environment, sublayer: &str) -> ExecuteStatus {
        if self.common.check_sublayer(sublayer) {
            log.debug(format!(" --> Execute internal command '{}'", self.command));
            env.execute_internal(log, &self.command);
        }
        ExecuteStatus::Completed
    }

    pub fn map_text(&self, short: bool) -> &str {
        self.common.map_text(short, || {
            MapText::new(short, "Internal", &self.common)
                .push(format!("Command = '{}'", self.command))
                .finish()
        })
    }
}
