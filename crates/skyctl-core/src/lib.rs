//! Shared building blocks for skyctl
//!
//! This crate holds everything the mapping engine needs from its surroundings
//! without depending on MIDI itself:
//!
//! - [`TextLogger`]: user-facing, leveled diagnostics with a bounded message list
//! - [`Environment`]: access to simulator datarefs and commands
//! - [`MemoryEnvironment`]: an in-memory simulator for tests and offline tools
//! - [`config`]: generic YAML settings I/O and default paths

pub mod config;
mod environment;
mod text_logger;

pub use environment::{DataValue, Environment, MemoryEnvironment};
pub use text_logger::{LogLevel, LogMessage, TextLogger, DEFAULT_MAX_MESSAGES, LOG_FILE_NAME};
