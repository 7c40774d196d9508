//! Bootlogger: boot-time log capture daemon.
//!
//! Captures the kernel ring buffer and the logcat stream into per-source
//! files while a boot (or an explicitly enabled system session) is in
//! progress. Streaming filters pick out AVC denials and libc property
//! warnings; at the end of the session the collected denials are merged
//! into a deduplicated set of sepolicy `allow` statements.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod capture;
pub mod config;
pub mod daemon;
pub mod filter;
pub mod kconfig;
pub mod logging;
pub mod properties;
pub mod sink;
pub mod source;
