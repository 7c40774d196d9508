//! Capture orchestration for one boot or system session.
//!
//! Order of operations:
//! 1. Decide from the kernel configuration whether AVC filtering is useful.
//! 2. Wipe and recreate the session's log directory.
//! 3. Start one blocking capture worker per source.
//! 4. Wait on the property barrier for the selected [`Mode`].
//! 5. Stop and join the workers.
//! 6. Merge the collected AVC denials and write `sepolicy.gen.txt`.
//!
//! Parsed AVC records travel from the workers over a channel, so the merge
//! runs single-threaded on data no worker can still touch.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::audit::{merge_records, render_policy, AuditRecord};
use crate::capture::{CaptureSession, CaptureStats};
use crate::config::LoggerConfig;
use crate::filter::{AvcFilter, LibcPropFilter, SeenProperties};
use crate::kconfig::read_kernel_config;
use crate::properties::PropertyStore;
use crate::source::LogSource;

/// Kernel symbol that must be built in for AVC messages to be logged.
pub const AUDIT_SYMBOL: &str = "CONFIG_AUDIT";

/// File stem of the generated policy.
pub const POLICY_NAME: &str = "sepolicy.gen";

/// Environment variable selecting [`Mode::System`] when present.
pub const SYSTEM_MODE_ENV: &str = "LOGGER_MODE_SYSTEM";

/// Tag prefixed to lines written into the kernel log.
const KMSG_TAG: &str = "bootlogger";

/// Which barrier ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Capture until boot completes, plus a short grace period.
    Boot,
    /// Capture until the enable property turns `false`.
    System,
}

impl Mode {
    /// [`Mode::System`] if [`SYSTEM_MODE_ENV`] is set, else [`Mode::Boot`].
    pub fn from_env() -> Self {
        if std::env::var_os(SYSTEM_MODE_ENV).is_some() {
            Self::System
        } else {
            Self::Boot
        }
    }

    /// Subdirectory of the log root used by this mode.
    pub fn subdir(self) -> &'static str {
        match self {
            Self::Boot => "boot",
            Self::System => "system",
        }
    }
}

/// What a finished session produced.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Directory the artifacts were written to.
    pub log_dir: PathBuf,
    /// Whether AVC filtering and policy generation ran.
    pub audit_enabled: bool,
    /// Per-session counters, in start order.
    pub sessions: Vec<(String, CaptureStats)>,
    /// AVC records collected (stale ones included).
    pub records: usize,
    /// Distinct `allow` statements generated.
    pub statements: usize,
}

/// Runs capture sessions against a property backend.
pub struct Daemon<P> {
    config: LoggerConfig,
    mode: Mode,
    properties: Arc<P>,
}

impl<P: PropertyStore + 'static> Daemon<P> {
    /// Create a daemon for `mode`.
    pub fn new(config: LoggerConfig, mode: Mode, properties: Arc<P>) -> Self {
        Self {
            config,
            mode,
            properties,
        }
    }

    /// Run one full session, writing into `{log_root}/{mode}`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the log directory cannot be reset. Source,
    /// output and property failures are logged and degrade the run.
    pub async fn run(&self, log_root: &Path) -> anyhow::Result<RunSummary> {
        let log_dir = log_root.join(self.mode.subdir());
        info!(mode = ?self.mode, log_dir = %log_dir.display(), "logger starting");

        let audit_enabled = audit_supported(&self.config.kernel.config_gz);
        reset_dir(&log_dir)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (records_tx, mut records_rx) = mpsc::unbounded_channel::<AuditRecord>();
        let mut sessions = Vec::with_capacity(2);

        let logd_kernel = &self.config.properties.logd_kernel;
        if self.properties.get_bool(logd_kernel, false).await {
            // logd already forwards kernel messages; reading both would
            // duplicate them and race with logd for the ring buffer.
            info!(property = %logd_kernel, "kernel messages go to logcat, skipping dmesg");
        } else {
            let path = &self.config.sources.kernel_log;
            let source = match LogSource::open_device(path) {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to open kernel log");
                    None
                }
            };
            let mut dmesg = self.session("dmesg", source, &log_dir);
            if audit_enabled {
                dmesg.register_filter(Box::new(AvcFilter::new(records_tx.clone())));
            }
            sessions.push(dmesg);
        }

        let command = &self.config.sources.logcat_command;
        let source = match LogSource::spawn(command) {
            Ok(source) => Some(source),
            Err(e) => {
                warn!(?command, error = %e, "failed to start log reader");
                None
            }
        };
        let mut logcat = self.session("logcat", source, &log_dir);
        if audit_enabled {
            logcat.register_filter(Box::new(AvcFilter::new(records_tx.clone())));
        }
        logcat.register_filter(Box::new(LibcPropFilter::new(SeenProperties::default())));
        sessions.push(logcat);

        // Only the filters may hold senders, so the channel closes once
        // every worker has finished.
        drop(records_tx);

        let workers: Vec<_> = sessions
            .into_iter()
            .map(|session| {
                let name = session.name().to_owned();
                let stop = Arc::clone(&stop);
                let handle = tokio::task::spawn_blocking(move || session.run(&stop));
                (name, handle)
            })
            .collect();

        self.wait_for_end().await;
        stop.store(true, Ordering::Release);
        info!("stopping capture sessions");

        let mut summary = RunSummary {
            log_dir: log_dir.clone(),
            audit_enabled,
            ..RunSummary::default()
        };
        for (name, handle) in workers {
            match handle.await {
                Ok(stats) => summary.sessions.push((name, stats)),
                Err(e) => error!(session = %name, error = %e, "capture worker failed"),
            }
        }

        if audit_enabled {
            let mut records = Vec::new();
            while let Some(record) = records_rx.recv().await {
                records.push(record);
            }
            summary.records = records.len();
            summary.statements = write_policy(&log_dir, &mut records);
        }

        info!(
            records = summary.records,
            statements = summary.statements,
            "logger finished"
        );
        Ok(summary)
    }

    fn session(&self, name: &str, source: Option<LogSource>, log_dir: &Path) -> CaptureSession {
        CaptureSession::new(name, source, log_dir)
            .with_read_chunk(self.config.sources.read_chunk_bytes)
    }

    /// Block until the mode's barrier is reached or a shutdown signal arrives.
    async fn wait_for_end(&self) {
        let props = &self.config.properties;
        let interval = Duration::from_millis(props.poll_interval_ms);

        let barrier = async {
            match self.mode {
                Mode::System => {
                    self.properties
                        .wait_for(&props.system_enabled, "false", interval)
                        .await;
                }
                Mode::Boot => {
                    self.properties
                        .wait_for(&props.boot_completed, "1", interval)
                        .await;
                    record_boot_time(&self.config.kernel.uptime, &self.config.kernel.kmsg_writer);
                    // Let late boot messages land before stopping.
                    tokio::time::sleep(Duration::from_secs(self.config.session.boot_grace_secs))
                        .await;
                }
            }
        };

        tokio::select! {
            () = barrier => {}
            () = shutdown_signal() => {
                info!("received shutdown signal, stopping capture");
            }
        }
    }
}

/// Whether the running kernel logs AVC messages.
///
/// Filtering is only turned off by a configuration that was read and
/// parsed without warnings. An unreadable or partly unparsable one leaves
/// it on, and the filter costs nothing if no AVC lines appear.
pub fn audit_supported(config_gz: &Path) -> bool {
    match read_kernel_config(config_gz) {
        Ok(config) if config.is_builtin(AUDIT_SYMBOL) => {
            debug!("detected CONFIG_AUDIT=y in kernel configuration");
            true
        }
        Ok(config) if !config.is_clean() => {
            warn!(
                warnings = config.warnings().len(),
                "kernel configuration had unparsable lines, keeping avc filters"
            );
            true
        }
        Ok(_) => {
            info!("kernel configuration does not have CONFIG_AUDIT=y, disabling avc filters");
            false
        }
        Err(e) => {
            warn!(error = %e, "kernel configuration unavailable, keeping avc filters");
            true
        }
    }
}

/// Delete `path` if it is a directory, then recreate it empty.
///
/// # Errors
///
/// Returns an error if the directory cannot be removed or created.
pub fn reset_dir(path: &Path) -> anyhow::Result<()> {
    info!(path = %path.display(), "deleting everything in log directory");
    if path.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory {}", path.display()))?;
    }
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory {}", path.display()))?;
    Ok(())
}

/// Merge `records`, render them, and write `{log_dir}/sepolicy.gen.txt`.
///
/// Returns the number of statements generated. The file is always created,
/// so a session without usable denials leaves an empty policy behind.
pub fn write_policy(log_dir: &Path, records: &mut [AuditRecord]) -> usize {
    let absorbed = merge_records(records);
    let rules = render_policy(records);
    debug!(records = records.len(), absorbed, rules = rules.len(), "policy rendered");

    let path = log_dir.join(format!("{POLICY_NAME}.txt"));
    let written = fs::File::create(&path).and_then(|file| {
        let mut out = io::BufWriter::new(file);
        for rule in &rules {
            writeln!(out, "{rule}")?;
        }
        out.flush()
    });
    match written {
        Ok(()) => info!(path = %path.display(), rules = rules.len(), "generated policy written"),
        Err(e) => error!(path = %path.display(), error = %e, "failed to write generated policy"),
    }
    rules.len()
}

/// Format the kernel log line announcing boot duration.
pub fn boot_time_message(uptime_secs: u64) -> String {
    let mins = uptime_secs.checked_div(60).unwrap_or(0);
    let secs = uptime_secs.checked_rem(60).unwrap_or(0);
    if mins > 0 {
        format!("{KMSG_TAG}: Boot completed in {mins}m {secs}s")
    } else {
        format!("{KMSG_TAG}: Boot completed in {secs}s")
    }
}

/// Whole seconds from `/proc/uptime`-formatted text (`"123.45 678.90"`).
pub fn parse_uptime(text: &str) -> Option<u64> {
    let first = text.split_whitespace().next()?;
    let whole = first.split('.').next()?;
    whole.parse().ok()
}

fn record_boot_time(uptime: &Path, kmsg: &Path) {
    let secs = match fs::read_to_string(uptime).map(|text| parse_uptime(&text)) {
        Ok(Some(secs)) => secs,
        Ok(None) => {
            warn!(path = %uptime.display(), "unparsable uptime");
            return;
        }
        Err(e) => {
            warn!(path = %uptime.display(), error = %e, "failed to read uptime");
            return;
        }
    };

    let message = boot_time_message(secs);
    let written = fs::OpenOptions::new()
        .append(true)
        .open(kmsg)
        .and_then(|mut f| f.write_all(message.as_bytes()));
    match written {
        Ok(()) => info!(uptime_secs = secs, "boot completed"),
        Err(e) => warn!(path = %kmsg.display(), error = %e, "failed to write boot time"),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c().await;
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
