//! SELinux security context labels.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Matches `u:r:type:s0...` and `u:object_r:type:s0...`.
static CONTEXT_SHAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^u:(object_)?r:([\w-]+):s0(.+)?$").ok());

/// A subject or object label as it appears in a policy statement.
///
/// Full contexts of the usual Android shape are reduced to their type
/// (`u:r:init:s0` becomes `init`); anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub struct SecurityContext(String);

impl SecurityContext {
    /// Build a context from its raw `scontext`/`tcontext` text.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let reduced = CONTEXT_SHAPE
            .as_ref()
            .and_then(|re| re.captures(&raw))
            .and_then(|caps| caps.get(2))
            .map(|m| m.as_str().to_owned());
        Self(reduced.unwrap_or(raw))
    }

    /// The label text used when rendering.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
