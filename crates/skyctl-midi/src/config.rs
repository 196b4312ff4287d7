//! Plugin settings schema and loader
//!
//! Settings are stored as YAML next to the profile.
//! Default location: `<config dir>/skyctl/settings.yaml`

use serde::{Deserialize, Serialize};
use skyctl_core::config::{default_config_path, load_config, save_config};
use skyctl_core::{TextLogger, DEFAULT_MAX_MESSAGES};
use std::path::{Path, PathBuf};

/// File name of the settings file
pub const SETTINGS_FILE_NAME: &str = "settings.yaml";

/// File name of the profile when no explicit path is configured
pub const PROFILE_FILE_NAME: &str = "skyctl_profile.yaml";

/// Encoder interpretation mode
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncoderMode {
    /// Relative: <64 = down, >64 = up, 64 = no movement
    #[default]
    Relative,
    /// Absolute position 0-127, direction from the previous position
    Range,
}

impl EncoderMode {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "relative" => Some(Self::Relative),
            "range" => Some(Self::Range),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relative => "relative",
            Self::Range => "range",
        }
    }
}

/// When outbound mappings of a device emit messages
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutboundSendMode {
    /// Only after a watched value changed
    #[default]
    OnChange,
    /// Every flight-loop tick
    Permanent,
}

impl OutboundSendMode {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "on_change" => Some(Self::OnChange),
            "permanent" => Some(Self::Permanent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnChange => "on_change",
            Self::Permanent => "permanent",
        }
    }
}

/// Global plugin settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Keep debug messages (implies info messages)
    pub debug_mode: bool,

    /// Keep info messages
    pub log_info: bool,

    /// Size of the in-memory message list
    pub max_messages: usize,

    /// Also write messages to `skyctl_log.txt` in the settings directory
    pub log_to_file: bool,

    /// Outbound mode for devices that don't set `mode_out`
    pub default_outbound_mode: OutboundSendMode,

    /// Encoder mode for devices that don't set `default_enc_mode`
    pub default_encoder_mode: EncoderMode,

    /// Profile to load instead of the default one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_mode: false,
            log_info: true,
            max_messages: DEFAULT_MAX_MESSAGES,
            log_to_file: false,
            default_outbound_mode: OutboundSendMode::default(),
            default_encoder_mode: EncoderMode::default(),
            profile_path: None,
        }
    }
}

impl Settings {
    /// Profile file to load
    pub fn profile_path(&self) -> PathBuf {
        self.profile_path
            .clone()
            .unwrap_or_else(|| default_config_path(PROFILE_FILE_NAME))
    }

    /// Push the level settings into a logger
    pub fn apply_to_logger(&self, log: &TextLogger) {
        log.set_debug_mode(self.debug_mode);
        log.set_log_info(self.log_info);
        log.set_max_size(self.max_messages);
    }
}

/// Get the default settings file path
pub fn default_settings_path() -> PathBuf {
    default_config_path(SETTINGS_FILE_NAME)
}

/// Load settings, falling back to defaults if the file is missing or invalid
pub fn load_settings(path: &Path) -> Settings {
    let settings: Settings = load_config(path);
    log::info!(
        "load_settings: debug_mode={} log_info={} outbound={} encoder={}",
        settings.debug_mode,
        settings.log_info,
        settings.default_outbound_mode.as_str(),
        settings.default_encoder_mode.as_str()
    );
    settings
}

/// Save settings, creating the directory if needed
pub fn save_settings(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    save_config(settings, path)
}
