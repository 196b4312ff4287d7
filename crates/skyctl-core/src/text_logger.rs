//! Leveled text logger for user-facing diagnostics
//!
//! Every component that validates configuration or talks to the simulator
//! receives a `&TextLogger` explicitly. Messages are kept in a bounded list
//! (shown by the host in its messages window), optionally appended to a log
//! file, and always forwarded to the `log` facade.
//!
//! A logger may have a parent. Each message is re-posted to every ancestor,
//! each applying its own level filter, so a per-profile logger can feed the
//! global plugin logger while keeping its own error count.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Default size of the in-memory message list
pub const DEFAULT_MAX_MESSAGES: usize = 1500;

/// File name used when file logging is enabled
pub const LOG_FILE_NAME: &str = "skyctl_log.txt";

/// Severity of a log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Fixed-width tag written to the log file
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Error => "[ERROR]",
            Self::Warn => "[WARN] ",
            Self::Info => "[INFO] ",
            Self::Debug => "[DEBUG]",
        }
    }

    fn as_log_level(&self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
        }
    }
}

/// One stored message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Local time the message was created (`%Y-%m-%d %H:%M:%S`)
    pub time: String,
    pub level: LogLevel,
    pub text: String,
}

struct LoggerState {
    messages: VecDeque<LogMessage>,
    error_count: usize,
    warn_count: usize,
    debug_mode: bool,
    log_info: bool,
    max_size: usize,
    file: Option<BufWriter<File>>,
}

/// Leveled message sink with a bounded message list
pub struct TextLogger {
    state: Mutex<LoggerState>,
    parent: Option<Arc<TextLogger>>,
}

impl Default for TextLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLogger {
    /// Create a root logger (info enabled, debug disabled)
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoggerState {
                messages: VecDeque::new(),
                error_count: 0,
                warn_count: 0,
                debug_mode: false,
                log_info: true,
                max_size: DEFAULT_MAX_MESSAGES,
                file: None,
            }),
            parent: None,
        }
    }

    /// Create a logger that re-posts every message to `parent` and its ancestors
    ///
    /// The child inherits the parent's level settings at creation time.
    pub fn with_parent(parent: Arc<TextLogger>) -> Self {
        let logger = Self::new();
        logger.set_debug_mode(parent.debug_mode());
        logger.set_log_info(parent.log_info());
        logger.set_max_size(parent.max_size());
        Self {
            parent: Some(parent),
            ..logger
        }
    }

    /// Start writing messages to `<dir>/skyctl_log.txt` (truncates the file)
    ///
    /// `dir` is created if it doesn't exist yet.
    pub fn enable_file_logging(&self, dir: &Path) -> std::io::Result<()> {
        let path = dir.join(LOG_FILE_NAME);
        match fs::create_dir_all(dir).and_then(|_| File::create(&path)) {
            Ok(file) => {
                if let Ok(mut state) = self.state.lock() {
                    state.file = Some(BufWriter::new(file));
                }
                Ok(())
            }
            Err(e) => {
                self.error(format!("Failed to open log file '{}': {}", path.display(), e));
                Err(e)
            }
        }
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.debug_mode = enabled;
        }
    }

    pub fn debug_mode(&self) -> bool {
        self.state.lock().map(|s| s.debug_mode).unwrap_or(false)
    }

    pub fn set_log_info(&self, enabled: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.log_info = enabled;
        }
    }

    pub fn log_info(&self) -> bool {
        self.state.lock().map(|s| s.log_info).unwrap_or(false)
    }

    /// Set the maximum number of stored messages (oldest are dropped first)
    pub fn set_max_size(&self, size: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.max_size = size.max(1);
            while state.messages.len() > state.max_size {
                state.messages.pop_front();
            }
        }
    }

    pub fn max_size(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.max_size)
            .unwrap_or(DEFAULT_MAX_MESSAGES)
    }

    /// Remove all messages and reset the counters
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.messages.clear();
            state.error_count = 0;
            state.warn_count = 0;
        }
    }

    /// Number of stored messages
    pub fn count(&self) -> usize {
        self.state.lock().map(|s| s.messages.len()).unwrap_or(0)
    }

    /// Snapshot of the stored messages, oldest first
    pub fn messages(&self) -> Vec<LogMessage> {
        self.state
            .lock()
            .map(|s| s.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All stored message texts joined by newlines
    pub fn messages_as_text(&self) -> String {
        self.messages()
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn error_count(&self) -> usize {
        self.state.lock().map(|s| s.error_count).unwrap_or(0)
    }

    pub fn warn_count(&self) -> usize {
        self.state.lock().map(|s| s.warn_count).unwrap_or(0)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warn_count() > 0
    }

    pub fn debug(&self, text: impl AsRef<str>) {
        self.post(LogLevel::Debug, text.as_ref());
    }

    pub fn info(&self, text: impl AsRef<str>) {
        self.post(LogLevel::Info, text.as_ref());
    }

    pub fn warn(&self, text: impl AsRef<str>) {
        self.post(LogLevel::Warn, text.as_ref());
    }

    pub fn error(&self, text: impl AsRef<str>) {
        self.post(LogLevel::Error, text.as_ref());
    }

    /// Error annotated with the configuration location it belongs to
    pub fn error_at(&self, source: &str, text: impl AsRef<str>) {
        self.error(format!("{} :: {}", source, text.as_ref()));
    }

    /// Debug annotated with the configuration location it belongs to
    pub fn debug_at(&self, source: &str, text: impl AsRef<str>) {
        if self.debug_mode() {
            self.debug(format!("{} :: {}", source, text.as_ref()));
        }
    }

    fn post(&self, level: LogLevel, text: &str) {
        self.create_message(level, text, true);

        let mut ancestor = self.parent.as_deref();
        while let Some(logger) = ancestor {
            logger.create_message(level, text, false);
            ancestor = logger.parent.as_deref();
        }
    }

    fn create_message(&self, level: LogLevel, text: &str, forward: bool) {
        if forward {
            log::log!(level.as_log_level(), "{}", text);
        }

        let Ok(mut state) = self.state.lock() else {
            return;
        };

        match level {
            LogLevel::Error => state.error_count += 1,
            LogLevel::Warn => state.warn_count += 1,
            _ => {}
        }

        let enabled = match level {
            LogLevel::Error | LogLevel::Warn => true,
            LogLevel::Info => state.log_info || state.debug_mode,
            LogLevel::Debug => state.debug_mode,
        };
        if !enabled {
            return;
        }

        let message = LogMessage {
            time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level,
            text: text.to_string(),
        };

        if let Some(ref mut file) = state.file {
            let written = writeln!(file, "{}   {}   {}", message.time, level.tag(), message.text)
                .and_then(|_| file.flush());
            if let Err(e) = written {
                log::warn!("TextLogger: Failed to write log file: {}", e);
            }
        }

        while state.messages.len() >= state.max_size {
            state.messages.pop_front();
        }
        state.messages.push_back(message);
    }
}
