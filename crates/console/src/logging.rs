//! Tracing setup.
//!
//! Console output owns stdout, so diagnostics go to a daily rolling file in
//! the configured log directory.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// File name prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "lpic-console.log";

/// Returns the filter directive for the configured level.
///
/// `--verbose` raises anything quieter than debug to debug.
pub fn filter_directive(level: &str, verbose: bool) -> String {
    let level = level.to_lowercase();
    if verbose && matches!(level.as_str(), "info" | "warn" | "error") {
        "debug".to_string()
    } else {
        level
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// flushes buffered log lines when dropped and must be kept alive.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "Failed to create log directory: {}",
            config.directory.display()
        )
    })?;

    let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.level, verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}
