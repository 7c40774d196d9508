//! Access to the platform's named settings (Android system properties).
//!
//! The daemon needs two primitives: read a boolean setting, and wait until
//! a setting reaches a given value. [`GetpropStore`] provides them on a
//! device by shelling out to `getprop`; [`MemoryProperties`] backs them with
//! an in-process map.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from a property backend.
#[derive(Debug, Error)]
pub enum PropertyError {
    /// The backend command could not be run.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that was invoked.
        program: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// The backend command ran but reported failure.
    #[error("{program} exited with {status}")]
    Status {
        /// Program that was invoked.
        program: PathBuf,
        /// Exit status reported by the program.
        status: std::process::ExitStatus,
    },
    /// The in-memory store's lock was poisoned.
    #[error("property store lock poisoned")]
    Poisoned,
}

/// Parse an Android boolean property value.
///
/// Returns `None` for values that are neither truthy nor falsy.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "y" | "yes" | "on" | "true" => Some(true),
        "0" | "n" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}

/// A source of named string settings.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    /// Current value of `name`, or `None` if unset.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError`] if the backend cannot be queried.
    async fn get(&self, name: &str) -> Result<Option<String>, PropertyError>;

    /// Boolean value of `name`, falling back to `default` when it is unset,
    /// unparsable, or cannot be read.
    async fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.get(name).await {
            Ok(Some(value)) => parse_bool(&value).unwrap_or(default),
            Ok(None) => default,
            Err(e) => {
                debug!(property = name, error = %e, "property read failed, using default");
                default
            }
        }
    }

    /// Poll `name` every `interval` until it equals `expected`.
    ///
    /// Backend errors do not end the wait: they are logged once per run of
    /// consecutive failures and polling continues.
    async fn wait_for(&self, name: &str, expected: &str, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut failing = false;
        loop {
            ticker.tick().await;
            match self.get(name).await {
                Ok(value) => {
                    if failing {
                        info!(property = name, "property backend recovered");
                        failing = false;
                    }
                    if value.as_deref() == Some(expected) {
                        debug!(property = name, value = expected, "property reached value");
                        return;
                    }
                }
                Err(e) => {
                    if !failing {
                        warn!(property = name, error = %e, "property read failed, still waiting");
                        failing = true;
                    }
                }
            }
        }
    }
}

/// Reads properties through the `getprop` command.
#[derive(Debug, Clone)]
pub struct GetpropStore {
    program: PathBuf,
}

impl GetpropStore {
    /// Use the `getprop` binary at `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl PropertyStore for GetpropStore {
    async fn get(&self, name: &str) -> Result<Option<String>, PropertyError> {
        let output = tokio::process::Command::new(&self.program)
            .arg(name)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| PropertyError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(PropertyError::Status {
                program: self.program.clone(),
                status: output.status,
            });
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok((!value.is_empty()).then_some(value))
    }
}

/// Properties held in memory, settable at runtime.
#[derive(Debug, Default)]
pub struct MemoryProperties {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryProperties {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::Poisoned`] if the lock was poisoned.
    pub fn set(&self, name: &str, value: &str) -> Result<(), PropertyError> {
        let mut values = self.values.lock().map_err(|_| PropertyError::Poisoned)?;
        values.insert(name.to_owned(), value.to_owned());
        Ok(())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for MemoryProperties {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }
}

#[async_trait]
impl PropertyStore for MemoryProperties {
    async fn get(&self, name: &str) -> Result<Option<String>, PropertyError> {
        let values = self.values.lock().map_err(|_| PropertyError::Poisoned)?;
        Ok(values.get(name).cloned())
    }
}
