//! libc property access warning filter.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use super::LineFilter;

/// Matches `libc : Access denied finding property "x.y"` and the
/// control-message variant `... "ctl.start" to "svc"`.
static PROPERTY_DENIAL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"libc\s+:\s+\w+\s\w+\s\w+\s\w+\s("[\w.]+")( to "([\w.@:/-]+)")?"#).ok()
});

/// Property names already reported during this run.
#[derive(Debug, Default, Clone)]
pub struct SeenProperties(HashSet<String>);

impl SeenProperties {
    /// Record `name`, returning `true` if it had not been seen before.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.0.contains(name) {
            return false;
        }
        self.0.insert(name.to_owned())
    }

    /// Whether `name` has been reported.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Number of distinct property names seen.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keeps the first warning per property; control messages always pass.
#[derive(Debug, Default)]
pub struct LibcPropFilter {
    seen: SeenProperties,
}

impl LibcPropFilter {
    /// Create a filter deduplicating against `seen`.
    pub fn new(seen: SeenProperties) -> Self {
        Self { seen }
    }

    /// Property names reported so far.
    pub fn seen(&self) -> &SeenProperties {
        &self.seen
    }
}

impl LineFilter for LibcPropFilter {
    fn name(&self) -> &str {
        "libc_props"
    }

    fn evaluate(&mut self, line: &str) -> bool {
        let Some(caps) = PROPERTY_DENIAL.as_ref().and_then(|re| re.captures(line)) else {
            return false;
        };
        let property = caps.get(1).map_or("", |m| m.as_str());

        if let Some(target) = caps.get(3) {
            info!(
                property,
                target = target.as_str(),
                "control message was unable to be set"
            );
            return true;
        }

        if self.seen.insert(property) {
            info!(property, "couldn't set prop");
            true
        } else {
            false
        }
    }
}
