//! AVC denial filter.

use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::LineFilter;
use crate::audit::AuditRecord;

/// Matches `avc:  denied  { ioctl } for ...`.
static AVC_DENIAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"avc:\s+denied\s+\{(\s\w+)+\s\}\sfor\s").ok());

/// Denials from third-party apps are not worth turning into policy.
const EXCLUDED_DOMAIN: &str = "untrusted_app";

/// Captures AVC denials and forwards each one, parsed, to the collector.
///
/// Only the `denied` shape is recognized; `granted` lines pass through
/// unmatched even though [`AuditRecord::parse`] understands them.
#[derive(Debug, Clone)]
pub struct AvcFilter {
    records: Option<UnboundedSender<AuditRecord>>,
}

impl AvcFilter {
    /// Create a filter that sends parsed records into `records`.
    pub fn new(records: UnboundedSender<AuditRecord>) -> Self {
        Self {
            records: Some(records),
        }
    }

    /// Create a filter that only classifies lines.
    pub fn detached() -> Self {
        Self { records: None }
    }

    /// Whether `line` has the denial shape and is not from an excluded domain.
    pub fn is_denial(line: &str) -> bool {
        let shaped = AVC_DENIAL.as_ref().is_some_and(|re| re.is_match(line));
        shaped && !line.contains(EXCLUDED_DOMAIN)
    }
}

impl LineFilter for AvcFilter {
    fn name(&self) -> &str {
        "avc"
    }

    fn evaluate(&mut self, line: &str) -> bool {
        if !Self::is_denial(line) {
            return false;
        }
        if let Some(tx) = &self.records {
            if tx.send(AuditRecord::parse(line)).is_err() {
                debug!("avc collector closed, dropping record");
                self.records = None;
            }
        }
        true
    }
}
