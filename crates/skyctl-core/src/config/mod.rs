//! Shared configuration utilities for skyctl
//!
//! - Generic YAML config loading/saving
//! - Raw YAML document loading for profile files
//! - Default file locations
//!
//! # Usage
//!
//! ```ignore
//! use skyctl_core::config::{load_config, save_config, default_config_path};
//!
//! let path = default_config_path("settings.yaml");
//! let settings: Settings = load_config(&path);
//! save_config(&settings, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, load_document, save_config, DocumentError};
pub use paths::{default_config_dir, default_config_path};
