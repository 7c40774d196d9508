//! Bootlogger CLI entry point.
//!
//! Captures kernel and logcat output into `<log_dir>/boot` (or
//! `<log_dir>/system` when `LOGGER_MODE_SYSTEM` is set) and writes a
//! generated sepolicy from the AVC denials seen during the session.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use bootlogger::config::{load_config, LoggerConfig};
use bootlogger::daemon::{Daemon, Mode};
use bootlogger::properties::GetpropStore;

/// Boot-time log capture daemon.
#[derive(Parser)]
#[command(name = "bootlogger", version, about)]
struct Cli {
    /// Optional TOML configuration overriding on-device defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log directory; the session writes into a `boot` or `system` subdirectory.
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    anyhow::ensure!(
        !cli.log_dir.as_os_str().is_empty(),
        "invalid empty string for log directory"
    );

    let config = match &cli.config {
        Some(path) => {
            load_config(path).with_context(|| format!("failed to load {}", path.display()))?
        }
        None => LoggerConfig::default(),
    };

    // Keep the guard alive until the session has been written out.
    let level = &config.logging.level;
    let _logging_guard = match &config.logging.json_dir {
        Some(dir) => Some(bootlogger::logging::init_production(dir, level)?),
        None => {
            bootlogger::logging::init_cli(level);
            None
        }
    };

    let mode = Mode::from_env();
    if mode == Mode::System {
        info!("running in system log mode");
    }

    let properties = Arc::new(GetpropStore::new(config.properties.getprop.clone()));
    let daemon = Daemon::new(config, mode, properties);
    let summary = daemon.run(&cli.log_dir).await?;

    info!(
        log_dir = %summary.log_dir.display(),
        sessions = summary.sessions.len(),
        statements = summary.statements,
        "session complete"
    );
    Ok(())
}
