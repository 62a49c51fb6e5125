//! Configuration management for the LPIC console.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/lpic-console/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::console::DEFAULT_SCROLLBACK;
use crate::session::READ_BUFFER_SIZE;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("read_buffer_size must be between 1 and 65536, got {0}")]
    InvalidReadBufferSize(usize),

    #[error("stop_grace_ms must be at most 10000, got {0}")]
    InvalidStopGrace(u64),

    #[error("terminal size must be non-zero, got {cols}x{rows}")]
    InvalidTerminalSize { cols: u16, rows: u16 },

    #[error("default_cwd is not a directory: {}", .0.display())]
    InvalidDefaultCwd(PathBuf),

    #[error("scrollback must be between 1 and 100000, got {0}")]
    InvalidScrollback(usize),

    #[error("tick_rate_ms must be between 1 and 1000, got {0}")]
    InvalidTickRate(u64),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Environment variable overriding the log level.
pub const ENV_LOG_LEVEL: &str = "LPIC_CONSOLE_LOG_LEVEL";

/// Environment variable overriding the default working directory.
pub const ENV_CWD: &str = "LPIC_CONSOLE_CWD";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Log output settings.
    pub logging: LoggingConfig,

    /// Process session settings.
    pub session: SessionConfig,

    /// Display loop settings.
    pub console: ConsoleConfig,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Directory receiving the rolling log files.
    pub directory: PathBuf,
}

/// Process session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Bytes requested per PTY read.
    pub read_buffer_size: usize,

    /// Milliseconds `stop` waits for the reader thread.
    pub stop_grace_ms: u64,

    /// Terminal width reported to the child.
    pub cols: u16,

    /// Terminal height reported to the child.
    pub rows: u16,

    /// `TERM` for the child; empty keeps the inherited value.
    pub term: String,

    /// Working directory for commands that do not set one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_cwd: Option<PathBuf>,
}

/// Display loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Lines kept in the console log.
    pub scrollback: usize,

    /// Milliseconds between display loop ticks.
    pub tick_rate_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: default_log_dir(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_BUFFER_SIZE,
            stop_grace_ms: 500,
            cols: 80,
            rows: 24,
            term: "xterm-256color".to_string(),
            default_cwd: None,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            scrollback: DEFAULT_SCROLLBACK,
            tick_rate_ms: 50,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lpic-console")
        .join("config.toml")
}

/// Returns the default log directory.
fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lpic-console")
        .join("logs")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported variables:
    /// - LPIC_CONSOLE_LOG_LEVEL: Override log level
    /// - LPIC_CONSOLE_CWD: Override the default working directory
    ///
    /// Returns the variables that were applied. This runs before logging is
    /// initialized, so callers log the result once a subscriber exists.
    pub fn apply_env_overrides(&mut self) -> Vec<&'static str> {
        let mut applied = Vec::new();

        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.is_empty() {
                self.logging.level = level;
                applied.push(ENV_LOG_LEVEL);
            }
        }

        if let Ok(dir) = std::env::var(ENV_CWD) {
            if !dir.is_empty() {
                self.session.default_cwd = Some(PathBuf::from(dir));
                applied.push(ENV_CWD);
            }
        }

        applied
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        let buffer = self.session.read_buffer_size;
        if !(1..=65536).contains(&buffer) {
            return Err(ConfigError::InvalidReadBufferSize(buffer));
        }

        if self.session.stop_grace_ms > 10_000 {
            return Err(ConfigError::InvalidStopGrace(self.session.stop_grace_ms));
        }

        if self.session.cols == 0 || self.session.rows == 0 {
            return Err(ConfigError::InvalidTerminalSize {
                cols: self.session.cols,
                rows: self.session.rows,
            });
        }

        if let Some(dir) = &self.session.default_cwd {
            if !dir.is_dir() {
                return Err(ConfigError::InvalidDefaultCwd(dir.clone()));
            }
        }

        let scrollback = self.console.scrollback;
        if !(1..=100_000).contains(&scrollback) {
            return Err(ConfigError::InvalidScrollback(scrollback));
        }

        let tick = self.console.tick_rate_ms;
        if !(1..=1000).contains(&tick) {
            return Err(ConfigError::InvalidTickRate(tick));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
