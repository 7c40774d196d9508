//! Parsing of raw `avc:` log lines into structured records.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use super::context::SecurityContext;

/// Marker that starts the audit portion of a log line.
pub const AVC_MARKER: &str = "avc:";

/// One AVC decision extracted from a log line.
///
/// A record is *stale* when it failed to parse or when its operations were
/// absorbed into another record during merging. Stale records are never
/// merged or rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditRecord {
    granted: bool,
    operations: BTreeSet<String>,
    subject: SecurityContext,
    object: SecurityContext,
    class: String,
    permissive: bool,
    attributes: BTreeMap<String, String>,
    stale: bool,
}

/// Fields that decide whether two records describe the same rule.
pub type RecordKey<'a> = (bool, &'a SecurityContext, &'a SecurityContext, &'a str);

impl AuditRecord {
    /// Build a valid record from already-structured parts.
    pub fn new<I, S>(
        granted: bool,
        subject: SecurityContext,
        object: SecurityContext,
        class: impl Into<String>,
        operations: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted,
            operations: operations.into_iter().map(Into::into).collect(),
            subject,
            object,
            class: class.into(),
            ..Self::default()
        }
    }

    /// Parse a log line containing an `avc:` message.
    ///
    /// Text before the marker is ignored. Lines that do not have the
    /// expected structure produce a stale record and a warning; they never
    /// fail outright.
    pub fn parse(line: &str) -> Self {
        let mut record = Self {
            stale: true,
            ..Self::default()
        };

        let Some(start) = line.find(AVC_MARKER) else {
            warn!(line, "no avc marker in line");
            return record;
        };
        let body = &line[start..];
        if let Err(reason) = record.fill(body) {
            warn!(reason, line = body, "failed to parse avc message");
            return record;
        }
        record.stale = false;
        record
    }

    fn fill(&mut self, body: &str) -> Result<(), &'static str> {
        let mut tokens = body.split_whitespace();
        tokens.next(); // "avc:"

        self.granted = match tokens.next() {
            Some("granted") => true,
            Some("denied") => false,
            Some(other) => {
                warn!(status = other, "unknown value for acl status");
                return Err("unknown acl status");
            }
            None => return Err("truncated before acl status"),
        };

        if tokens.next() != Some("{") {
            return Err("missing opening brace");
        }
        let mut closed = false;
        for token in tokens.by_ref() {
            if token == "}" {
                closed = true;
                break;
            }
            self.operations.insert(token.to_owned());
        }
        if !closed {
            return Err("missing closing brace");
        }
        if self.operations.is_empty() {
            return Err("empty operation list");
        }
        if tokens.next() != Some("for") {
            return Err("missing 'for' after operations");
        }

        let mut saw_attribute = false;
        for token in tokens {
            saw_attribute = true;
            let Some((key, value)) = token.split_once('=') else {
                warn!(attribute = token, "unparsable attribute");
                continue;
            };
            // First occurrence of a key wins.
            self.attributes
                .entry(key.to_owned())
                .or_insert_with(|| trim_double_quote(value).to_owned());
        }
        if !saw_attribute {
            return Err("no attributes after 'for'");
        }

        let scontext = self.take_required("scontext");
        let tcontext = self.take_required("tcontext");
        let tclass = self.take_required("tclass");
        let permissive = self.take_required("permissive");
        let (Some(scontext), Some(tcontext), Some(tclass), Some(permissive)) =
            (scontext, tcontext, tclass, permissive)
        else {
            return Err("missing required attribute");
        };

        self.permissive = match permissive.parse::<i64>() {
            Ok(0) => false,
            Ok(1) => true,
            _ => {
                warn!(value = %permissive, "invalid permissive status");
                return Err("invalid permissive status");
            }
        };
        self.subject = SecurityContext::new(scontext);
        self.object = SecurityContext::new(tcontext);
        self.class = tclass;
        Ok(())
    }

    fn take_required(&mut self, key: &str) -> Option<String> {
        let value = self.attributes.remove(key);
        if value.is_none() {
            warn!(key, "empty value for key");
        }
        value
    }

    /// Identity used for merging: `(granted, subject, object, class)`.
    pub fn key(&self) -> RecordKey<'_> {
        (self.granted, &self.subject, &self.object, &self.class)
    }

    /// `true` for `avc: granted`, `false` for `avc: denied`.
    pub fn granted(&self) -> bool {
        self.granted
    }

    /// Requested operations (`read`, `ioctl`, ...).
    pub fn operations(&self) -> &BTreeSet<String> {
        &self.operations
    }

    /// Source (`scontext`) label.
    pub fn subject(&self) -> &SecurityContext {
        &self.subject
    }

    /// Target (`tcontext`) label.
    pub fn object(&self) -> &SecurityContext {
        &self.object
    }

    /// Target object class (`tclass`).
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Whether the decision was logged in permissive mode.
    pub fn permissive(&self) -> bool {
        self.permissive
    }

    /// Remaining attributes (`comm`, `name`, `dev`, `ino`, ...).
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Whether the record is excluded from merging and rendering.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Union `other`'s operations into this record and retire `other`.
    pub(crate) fn absorb(&mut self, other: &mut Self) {
        self.operations.extend(other.operations.iter().cloned());
        other.stale = true;
    }
}

/// Strip one pair of surrounding double quotes, if the value has content
/// between them.
fn trim_double_quote(value: &str) -> &str {
    if value.len() > 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len().saturating_sub(1)]
    } else {
        value
    }
}
