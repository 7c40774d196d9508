//! Configuration loading for the capture daemon.
//!
//! Loads an optional TOML file. All sections use `#[serde(default)]` so a
//! minimal or empty config file is valid and the daemon runs with on-device
//! defaults when no file is given.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggerConfig {
    /// Raw log sources.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Kernel-facing paths.
    #[serde(default)]
    pub kernel: KernelConfigPaths,

    /// Platform property access and names.
    #[serde(default)]
    pub properties: PropertiesConfig,

    /// Session timing.
    #[serde(default)]
    pub session: SessionConfig,

    /// Daemon's own diagnostic logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the captured streams come from.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Kernel ring buffer device.
    #[serde(default = "default_kernel_log")]
    pub kernel_log: PathBuf,

    /// Command whose stdout is the system log stream.
    #[serde(default = "default_logcat_command")]
    pub logcat_command: Vec<String>,

    /// Size of each bounded read from a source.
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            kernel_log: default_kernel_log(),
            logcat_command: default_logcat_command(),
            read_chunk_bytes: default_read_chunk_bytes(),
        }
    }
}

/// Kernel files read or written by the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelConfigPaths {
    /// gzip-compressed kernel build configuration.
    #[serde(default = "default_config_gz")]
    pub config_gz: PathBuf,

    /// Kernel log writer used for the boot-time record.
    #[serde(default = "default_kmsg_writer")]
    pub kmsg_writer: PathBuf,

    /// Uptime source (`/proc/uptime` format).
    #[serde(default = "default_uptime")]
    pub uptime: PathBuf,
}

impl Default for KernelConfigPaths {
    fn default() -> Self {
        Self {
            config_gz: default_config_gz(),
            kmsg_writer: default_kmsg_writer(),
            uptime: default_uptime(),
        }
    }
}

/// Property backend and the property names the daemon consults.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertiesConfig {
    /// `getprop` binary.
    #[serde(default = "default_getprop")]
    pub getprop: PathBuf,

    /// Milliseconds between property polls while waiting.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Set to `1` once boot has completed.
    #[serde(default = "default_boot_completed")]
    pub boot_completed: String,

    /// System-mode capture runs until this becomes `false`.
    #[serde(default = "default_system_enabled")]
    pub system_enabled: String,

    /// When true, logd already mirrors kernel messages into logcat.
    #[serde(default = "default_logd_kernel")]
    pub logd_kernel: String,
}

impl Default for PropertiesConfig {
    fn default() -> Self {
        Self {
            getprop: default_getprop(),
            poll_interval_ms: default_poll_interval_ms(),
            boot_completed: default_boot_completed(),
            system_enabled: default_system_enabled(),
            logd_kernel: default_logd_kernel(),
        }
    }
}

/// Session timing.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Seconds to keep capturing after boot completes.
    #[serde(default = "default_boot_grace_secs")]
    pub boot_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            boot_grace_secs: default_boot_grace_secs(),
        }
    }
}

/// Diagnostic logging destination.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// If set, JSON diagnostics are also written to `{json_dir}/bootlogger.log`.
    #[serde(default)]
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_dir: None,
        }
    }
}

impl LoggerConfig {
    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.sources.logcat_command.is_empty()
                && self.sources.logcat_command.iter().all(|s| !s.is_empty()),
            "sources.logcat_command must be a non-empty list of non-empty strings"
        );
        anyhow::ensure!(
            (64..=65_536).contains(&self.sources.read_chunk_bytes),
            "sources.read_chunk_bytes must be in [64, 65536]"
        );
        anyhow::ensure!(
            self.properties.poll_interval_ms >= 10,
            "properties.poll_interval_ms must be >= 10"
        );
        anyhow::ensure!(
            self.session.boot_grace_secs <= 60,
            "session.boot_grace_secs must be <= 60"
        );
        for (key, name) in [
            ("boot_completed", &self.properties.boot_completed),
            ("system_enabled", &self.properties.system_enabled),
            ("logd_kernel", &self.properties.logd_kernel),
        ] {
            anyhow::ensure!(
                !name.is_empty() && !name.contains(char::is_whitespace),
                "properties.{key} must be a property name without whitespace"
            );
        }
        anyhow::ensure!(
            EnvFilter::try_new(&self.logging.level).is_ok(),
            "logging.level is not a valid filter directive: {}",
            self.logging.level
        );
        Ok(())
    }
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_config(path: &Path) -> anyhow::Result<LoggerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: LoggerConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

// On-device defaults.

fn default_kernel_log() -> PathBuf {
    PathBuf::from("/proc/kmsg")
}

fn default_logcat_command() -> Vec<String> {
    vec!["/system/bin/logcat".to_owned()]
}

fn default_read_chunk_bytes() -> usize {
    crate::capture::DEFAULT_READ_CHUNK
}

fn default_config_gz() -> PathBuf {
    PathBuf::from("/proc/config.gz")
}

fn default_kmsg_writer() -> PathBuf {
    PathBuf::from("/dev/kmsg")
}

fn default_uptime() -> PathBuf {
    PathBuf::from("/proc/uptime")
}

fn default_getprop() -> PathBuf {
    PathBuf::from("/system/bin/getprop")
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_boot_completed() -> String {
    "sys.boot_completed".to_owned()
}

fn default_system_enabled() -> String {
    "persist.ext.logdump.enabled".to_owned()
}

fn default_logd_kernel() -> String {
    "ro.logd.kernel".to_owned()
}

fn default_boot_grace_secs() -> u64 {
    3
}

fn default_log_level() -> String {
    crate::logging::DEFAULT_LEVEL.to_owned()
}
