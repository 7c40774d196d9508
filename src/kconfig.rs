//! Kernel build configuration extraction (`/proc/config.gz`).
//!
//! The compressed configuration is read fully into memory and parsed line by
//! line into a [`KernelConfig`]. Only open, stat and decompression failures
//! are errors; lines that do not parse are collected as warnings so callers
//! still get the partially populated map.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use flate2::read::GzDecoder;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

/// Size of each bounded decompressing read.
const READ_CHUNK: usize = 4096;

/// Assumed decompression ratio, used only to size the output buffer up front.
const EXPECTED_RATIO: u64 = 5;

static ENABLED_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^(CONFIG_\w+)=(.*)$"#).ok());

static DISABLED_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^#\s(CONFIG_\w+) is not set$").ok());

/// Value of a single kernel configuration symbol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigValue {
    /// Symbol not present in the configuration.
    #[default]
    Unknown,
    /// `=y`
    BuiltIn,
    /// `=m`
    Module,
    /// `="..."`, stored without the surrounding quotes.
    Str(String),
    /// `=123` or `=-1`; hex values such as `0x10` are kept as their text.
    Int(String),
    /// `# CONFIG_X is not set`
    Unset,
}

/// Errors that prevent the configuration from being read at all.
#[derive(Debug, Error)]
pub enum KernelConfigError {
    /// The compressed source could not be stat'd.
    #[error("failed to stat {path}: {source}")]
    Stat {
        /// Path of the compressed configuration.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// The compressed source could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Path of the compressed configuration.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// Decompression failed part way through the stream.
    #[error("failed to decompress {path}: {source}")]
    Decompress {
        /// Path of the compressed configuration.
        path: PathBuf,
        /// Underlying decoder error.
        source: std::io::Error,
    },
}

/// Parsed symbol table plus any non-fatal parse warnings.
#[derive(Debug, Default)]
pub struct KernelConfig {
    symbols: HashMap<String, ConfigValue>,
    warnings: Vec<String>,
}

impl KernelConfig {
    /// Parse decompressed configuration text.
    pub fn parse(text: &str) -> Self {
        let line_count = text.bytes().filter(|b| *b == b'\n').count();
        let mut config = Self {
            symbols: HashMap::with_capacity(line_count),
            warnings: Vec::new(),
        };

        for line in text.lines() {
            config.parse_line(line);
        }

        if !config.warnings.is_empty() {
            warn!(
                count = config.warnings.len(),
                "errors were found parsing kernel configuration"
            );
        }
        config
    }

    fn parse_line(&mut self, line: &str) {
        if let Some(caps) = ENABLED_LINE.as_ref().and_then(|re| re.captures(line)) {
            let symbol = &caps[1];
            let raw = &caps[2];
            let value = match raw.chars().next() {
                Some('y') => ConfigValue::BuiltIn,
                Some('m') => ConfigValue::Module,
                Some('"') => ConfigValue::Str(trim_quotes(raw).to_owned()),
                Some(c) if c == '-' || c.is_ascii_digit() => ConfigValue::Int(raw.to_owned()),
                _ => {
                    warn!(line, "unknown kernel config value");
                    self.warnings.push(format!("unknown value: {line}"));
                    return;
                }
            };
            self.symbols.insert(symbol.to_owned(), value);
            return;
        }

        if let Some(caps) = DISABLED_LINE.as_ref().and_then(|re| re.captures(line)) {
            self.symbols.insert(caps[1].to_owned(), ConfigValue::Unset);
            return;
        }

        // Blank lines and other comments are fine.
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        warn!(line, "unparsable kernel config line");
        self.warnings.push(format!("unparsable line: {line}"));
    }

    /// Look up a symbol; absent symbols read as [`ConfigValue::Unknown`].
    pub fn get(&self, symbol: &str) -> ConfigValue {
        self.symbols.get(symbol).cloned().unwrap_or_default()
    }

    /// Whether `symbol` is built into the kernel (`=y`).
    pub fn is_builtin(&self, symbol: &str) -> bool {
        matches!(self.symbols.get(symbol), Some(ConfigValue::BuiltIn))
    }

    /// Number of symbols parsed.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether no symbols were parsed.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Non-fatal parse warnings, one per offending line.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// `true` when every line parsed cleanly.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Read and parse a gzip-compressed kernel configuration.
///
/// # Errors
///
/// Returns [`KernelConfigError`] if the file cannot be stat'd, opened, or
/// decompressed. Per-line problems are reported through
/// [`KernelConfig::warnings`] instead.
pub fn read_kernel_config(path: &Path) -> Result<KernelConfig, KernelConfigError> {
    let metadata = fs::metadata(path).map_err(|source| KernelConfigError::Stat {
        path: path.to_path_buf(),
        source,
    })?;
    let file = fs::File::open(path).map_err(|source| KernelConfigError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    // procfs reports a zero size for config.gz; the hint is best-effort.
    let hint = metadata.len().saturating_mul(EXPECTED_RATIO);
    let mut text = Vec::with_capacity(usize::try_from(hint).unwrap_or(0));

    let mut decoder = GzDecoder::new(file);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = decoder
            .read(&mut chunk)
            .map_err(|source| KernelConfigError::Decompress {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        text.extend_from_slice(&chunk[..n]);
    }

    debug!(path = %path.display(), bytes = text.len(), "kernel config decompressed");
    Ok(KernelConfig::parse(&String::from_utf8_lossy(&text)))
}

fn trim_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
