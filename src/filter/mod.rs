//! Streaming line filters applied by a capture session.
//!
//! A filter sees every complete line of its session. When it reports a
//! match, the session copies the line into the filter's own output file
//! (`{filter}.{source}.txt`). Filters may keep state or forward data
//! elsewhere as a side effect of matching.

pub mod avc;
pub mod libc_props;

pub use avc::AvcFilter;
pub use libc_props::{LibcPropFilter, SeenProperties};

/// A named, stateful line classifier.
pub trait LineFilter: Send {
    /// Filter name; must be usable as a file name component.
    fn name(&self) -> &str;

    /// Classify one line, returning `true` if it should be kept.
    fn evaluate(&mut self, line: &str) -> bool;
}
