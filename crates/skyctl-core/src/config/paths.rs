//! Default locations of skyctl files

use std::path::PathBuf;

/// Get the default configuration directory
///
/// Returns: `<config dir>/skyctl` (e.g. `~/.config/skyctl` on Linux)
///
/// Falls back to `./skyctl` when the platform has no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skyctl")
}

/// Get the default path of a file inside the configuration directory
///
/// # Arguments
/// * `filename` - File name (e.g., "settings.yaml", "skyctl_profile.yaml")
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
