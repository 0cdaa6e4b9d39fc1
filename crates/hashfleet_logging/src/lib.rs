//! Logging setup for Hashfleet services.
//!
//! Rotation and buffered writing are delegated to `tracing-appender`: one
//! daily-rotated file per service plus a stderr layer. The embedding admin
//! service calls [`init_logging`] once at startup and holds the returned
//! guard; everything else just uses the `tracing` macros.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "hashfleet=info,hashfleet_orchestrator=info,hashfleet_db=info";

/// Logging configuration for a Hashfleet service process.
pub struct LogConfig<'a> {
    pub service_name: &'a str,
    /// Mirror the file-level filter onto stderr instead of warn-only.
    pub verbose: bool,
}

/// Install the tracing registry: a daily-rotated file layer under the
/// Hashfleet logs directory and a stderr layer.
///
/// The returned [`WorkerGuard`] owns the background log writer; drop it only
/// at process exit or buffered lines are lost.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_appender = rolling::daily(&log_dir, log_file_name(config.service_name));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(guard)
}

/// Hashfleet home directory: ~/.hashfleet unless `HASHFLEET_HOME` overrides.
pub fn hashfleet_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("HASHFLEET_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".hashfleet")
}

/// Logs directory: ~/.hashfleet/logs
pub fn logs_dir() -> PathBuf {
    hashfleet_home().join("logs")
}

/// Data root holding hashlists, wordlists, rules, and scratch files.
pub fn data_dir() -> PathBuf {
    hashfleet_home().join("data")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// File-name prefix for the rotated log. Anything that could escape the logs
/// directory or upset the rotation date suffix is flattened to `_`.
fn log_file_name(service_name: &str) -> String {
    let safe: String = service_name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.log", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_name_flattens_path_separators() {
        assert_eq!(log_file_name("../evil/name"), "___evil_name.log");
        assert_eq!(log_file_name("orchestrator"), "orchestrator.log");
    }

    #[test]
    fn home_override_and_layout() {
        // Serialized into one test: the env var is process-global.
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("HASHFLEET_HOME", dir.path());

        assert_eq!(hashfleet_home(), dir.path());
        assert_eq!(logs_dir(), dir.path().join("logs"));
        assert_eq!(data_dir(), dir.path().join("data"));

        let logs = ensure_logs_dir().unwrap();
        assert!(logs.is_dir());

        std::env::remove_var("HASHFLEET_HOME");
    }
}
