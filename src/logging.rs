//! Diagnostic output for the daemon itself, via `tracing-subscriber`.
//!
//! Captured device logs never pass through here. Diagnostics always go to
//! stderr; with a JSON directory configured they are also appended to
//! `{dir}/bootlogger.log` (one JSON object per event) through a
//! `tracing-appender` background writer.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name of the JSON diagnostics log.
pub const LOG_FILE_NAME: &str = "bootlogger.log";

/// Directive used when neither `RUST_LOG` nor the configured level parse.
pub const DEFAULT_LEVEL: &str = "info";

/// Keeps the background file writer alive.
///
/// Dropping it flushes pending events and closes the file, so hold it until
/// the session summary has been logged.
#[must_use = "dropping the guard stops the JSON file writer"]
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

/// `RUST_LOG` wins over `level`; a bad `level` falls back to [`DEFAULT_LEVEL`].
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Install stderr plus JSON-file diagnostics.
///
/// The file is `{logs_dir}/bootlogger.log`, never rotated.
///
/// # Errors
///
/// Fails if `logs_dir` cannot be created or a global subscriber is
/// already installed.
pub fn init_production(logs_dir: &Path, level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let appender = tracing_appender::rolling::never(logs_dir, LOG_FILE_NAME);
    let (writer, worker) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(level_filter(level))
        .with(fmt::layer().json().with_writer(writer))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(LoggingGuard { _worker: worker })
}

/// Install stderr-only diagnostics at `level`.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case that one stays in effect.
pub fn init_cli(level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(level_filter(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
