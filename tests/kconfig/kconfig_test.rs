//! Tests for kernel configuration extraction.

use std::io::Write;
use std::path::{Path, PathBuf};

use bootlogger::kconfig::{read_kernel_config, ConfigValue, KernelConfig, KernelConfigError};
use flate2::write::GzEncoder;
use flate2::Compression;

fn write_gz(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("config.gz");
    let file = std::fs::File::create(&path).expect("create gz");
    let mut encoder = GzEncoder::new(file, Compression::best());
    encoder.write_all(text.as_bytes()).expect("compress");
    encoder.finish().expect("finish gz");
    path
}

const SAMPLE: &str = "\
#
# Automatically generated file; DO NOT EDIT.
#
CONFIG_AUDIT=y
CONFIG_EXT4_FS=m
CONFIG_LOCALVERSION=\"-android\"
CONFIG_LOG_BUF_SHIFT=17
CONFIG_PANIC_TIMEOUT=-1
# CONFIG_KASAN is not set

CONFIG_DEFAULT_HOSTNAME=\"(none)\"
";

#[test]
fn reads_every_value_kind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_gz(dir.path(), SAMPLE);

    let config = read_kernel_config(&path).expect("read config");

    assert!(config.is_clean(), "warnings: {:?}", config.warnings());
    assert_eq!(config.len(), 7);
    assert_eq!(config.get("CONFIG_AUDIT"), ConfigValue::BuiltIn);
    assert_eq!(config.get("CONFIG_EXT4_FS"), ConfigValue::Module);
    assert_eq!(
        config.get("CONFIG_LOCALVERSION"),
        ConfigValue::Str("-android".to_owned())
    );
    assert_eq!(config.get("CONFIG_LOG_BUF_SHIFT"), ConfigValue::Int("17".to_owned()));
    assert_eq!(config.get("CONFIG_PANIC_TIMEOUT"), ConfigValue::Int("-1".to_owned()));
    assert_eq!(config.get("CONFIG_KASAN"), ConfigValue::Unset);
    assert!(config.is_builtin("CONFIG_AUDIT"));
    assert!(!config.is_builtin("CONFIG_EXT4_FS"));
}

#[test]
fn absent_symbol_is_unknown() {
    let config = KernelConfig::parse("CONFIG_A=y\n");
    assert_eq!(config.get("CONFIG_B"), ConfigValue::Unknown);
    assert!(!config.is_builtin("CONFIG_B"));
}

#[test]
fn bad_lines_become_warnings_but_keep_the_rest() {
    let text = "CONFIG_A=y\nthis is junk\nCONFIG_B=bogus\nCONFIG_C=\n# CONFIG_D is not set\n";
    let config = KernelConfig::parse(text);

    assert_eq!(config.warnings().len(), 3);
    assert!(!config.is_clean());
    assert_eq!(config.get("CONFIG_A"), ConfigValue::BuiltIn);
    assert_eq!(config.get("CONFIG_B"), ConfigValue::Unknown);
    assert_eq!(config.get("CONFIG_D"), ConfigValue::Unset);
}

#[test]
fn comments_and_blank_lines_are_tolerated() {
    let config = KernelConfig::parse("\n# just a comment\n#\n\n");
    assert!(config.is_clean());
    assert!(config.is_empty());
}

#[test]
fn missing_file_is_a_stat_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = read_kernel_config(&dir.path().join("config.gz")).expect_err("missing file");
    assert!(matches!(err, KernelConfigError::Stat { .. }), "got {err:?}");
}

#[test]
fn corrupt_stream_is_a_decompress_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.gz");
    std::fs::write(&path, b"definitely not gzip").expect("write");

    let err = read_kernel_config(&path).expect_err("corrupt stream");
    assert!(matches!(err, KernelConfigError::Decompress { .. }), "got {err:?}");
}

#[test]
fn large_config_is_read_completely() {
    let dir = tempfile::tempdir().expect("tempdir");
    let text: String = (0..5000).map(|i| format!("CONFIG_SYM_{i}=y\n")).collect();
    let path = write_gz(dir.path(), &text);

    let config = read_kernel_config(&path).expect("read config");
    assert_eq!(config.len(), 5000);
    assert!(config.is_builtin("CONFIG_SYM_4999"));
}
