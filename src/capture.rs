//! Capture session: one source, one raw output, any number of filters.
//!
//! The session loop samples the stop flag once per read. A read blocks
//! until the source produces data, so shutdown waits for at most one
//! in-flight read; there is no preemptive cancellation.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::filter::LineFilter;
use crate::sink::OutputSink;
use crate::source::LogSource;

/// Default size of one bounded read.
pub const DEFAULT_READ_CHUNK: usize = 512;

/// Pause after a read reports end-of-stream, before sampling the stop flag
/// again. Devices and pipes block instead; plain files and exited children
/// would otherwise spin.
const EOF_BACKOFF: Duration = Duration::from_millis(50);

/// A filter together with the sink receiving its matches.
struct FilterSlot {
    filter: Box<dyn LineFilter>,
    sink: Option<OutputSink>,
}

/// Counters reported when a session finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Bytes read from the source.
    pub bytes: u64,
    /// Complete lines dispatched.
    pub lines: u64,
    /// Lines that at least one filter matched.
    pub matched: u64,
}

/// Reads one source until stopped, teeing lines into files.
pub struct CaptureSession {
    name: String,
    log_dir: PathBuf,
    source: Option<LogSource>,
    sink: Option<OutputSink>,
    filters: Vec<FilterSlot>,
    read_chunk: usize,
    stats: CaptureStats,
}

impl CaptureSession {
    /// Create a session writing `{log_dir}/{name}.txt`.
    ///
    /// A missing `source` is allowed: the session then performs no reads.
    /// Failure to create the raw output is logged and the session carries
    /// on without it.
    pub fn new(name: impl Into<String>, source: Option<LogSource>, log_dir: &Path) -> Self {
        let name = name.into();
        let sink = match OutputSink::create(log_dir, &name) {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(session = %name, dir = %log_dir.display(), error = %e, "failed to open raw output");
                None
            }
        };
        Self {
            name,
            log_dir: log_dir.to_path_buf(),
            source,
            sink,
            filters: Vec::new(),
            read_chunk: DEFAULT_READ_CHUNK,
            stats: CaptureStats::default(),
        }
    }

    /// Override the bounded read size.
    #[must_use]
    pub fn with_read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes.max(1);
        self
    }

    /// Attach a filter with its own `{filter}.{name}.txt` output.
    ///
    /// If that output cannot be created the filter is not registered.
    pub fn register_filter(&mut self, filter: Box<dyn LineFilter>) {
        match OutputSink::create_filtered(&self.log_dir, &self.name, filter.name()) {
            Ok(sink) => self.filters.push(FilterSlot {
                filter,
                sink: Some(sink),
            }),
            Err(e) => warn!(
                session = %self.name,
                filter = filter.name(),
                error = %e,
                "failed to open filter output, filter dropped"
            ),
        }
    }

    /// Session name, also the raw output's file stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the registered filters, in registration order.
    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.iter().map(|slot| slot.filter.name()).collect()
    }

    /// Run until `stop` is set or the source fails.
    ///
    /// Consumes the session; outputs that never received a line are
    /// deleted when it returns.
    pub fn run(mut self, stop: &AtomicBool) -> CaptureStats {
        let Some(mut source) = self.source.take() else {
            warn!(session = %self.name, "no source, nothing to capture");
            return self.stats;
        };
        info!(session = %self.name, filters = ?self.filter_names(), "capture started");

        let mut buf = vec![0u8; self.read_chunk];
        let mut pending: Vec<u8> = Vec::new();

        while !stop.load(Ordering::Acquire) {
            match source.read(&mut buf) {
                Ok(0) => std::thread::sleep(EOF_BACKOFF),
                Ok(n) => {
                    let chunk = buf.get(..n).unwrap_or_default();
                    let len = u64::try_from(n).unwrap_or(u64::MAX);
                    self.stats.bytes = self.stats.bytes.saturating_add(len);
                    pending.extend_from_slice(chunk);
                    self.dispatch_complete_lines(&mut pending);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(session = %self.name, error = %e, "read failed, ending capture");
                    break;
                }
            }
        }

        // Keep a trailing fragment rather than losing it.
        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending).into_owned();
            self.dispatch(&line);
        }

        self.finish();
        info!(
            session = %self.name,
            lines = self.stats.lines,
            matched = self.stats.matched,
            "capture stopped"
        );
        self.stats
    }

    fn dispatch_complete_lines(&mut self, pending: &mut Vec<u8>) {
        let mut consumed = 0usize;
        while let Some(pos) = pending
            .get(consumed..)
            .and_then(|rest| rest.iter().position(|b| *b == b'\n'))
        {
            let end = consumed.saturating_add(pos);
            let raw = pending.get(consumed..end).unwrap_or_default();
            let line = String::from_utf8_lossy(raw).into_owned();
            self.dispatch(&line);
            consumed = end.saturating_add(1);
        }
        pending.drain(..consumed);
    }

    /// Run every filter on `line`, then append it to the raw output.
    fn dispatch(&mut self, line: &str) {
        self.stats.lines = self.stats.lines.saturating_add(1);

        let mut any_match = false;
        for slot in &mut self.filters {
            if !slot.filter.evaluate(line) {
                continue;
            }
            any_match = true;
            write_or_disable(&mut slot.sink, line);
        }
        if any_match {
            self.stats.matched = self.stats.matched.saturating_add(1);
        }

        write_or_disable(&mut self.sink, line);
    }

    fn finish(&mut self) {
        for sink in self
            .filters
            .iter_mut()
            .filter_map(|slot| slot.sink.as_mut())
            .chain(self.sink.as_mut())
        {
            if let Err(e) = sink.flush() {
                warn!(path = %sink.path().display(), error = %e, "failed to flush output");
            }
        }
        debug!(session = %self.name, "outputs flushed");
    }
}

/// Write a line, dropping the sink after its first failure.
fn write_or_disable(sink: &mut Option<OutputSink>, line: &str) {
    let Some(out) = sink.as_mut() else {
        return;
    };
    if let Err(e) = out.write_line(line) {
        warn!(path = %out.path().display(), error = %e, "write failed, output disabled");
        *sink = None;
    }
}
