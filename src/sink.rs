//! Buffered line sink backed by a file in the log directory.
//!
//! A sink flushes whenever its pending byte count crosses [`FLUSH_THRESHOLD`]
//! and removes its own file on drop if nothing was ever written to it, so
//! the log directory only ever holds files with content.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Pending bytes after which the sink flushes to disk.
pub const FLUSH_THRESHOLD: usize = 4096;

/// File extension appended to every sink name.
const EXTENSION: &str = "txt";

/// An open output file with flush-on-threshold buffering.
#[derive(Debug)]
pub struct OutputSink {
    path: PathBuf,
    writer: BufWriter<File>,
    pending: usize,
    written: u64,
}

impl OutputSink {
    /// Create (truncating) `{dir}/{name}.txt`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the file cannot be created.
    pub fn create(dir: &Path, name: &str) -> io::Result<Self> {
        Self::open(dir.join(format!("{name}.{EXTENSION}")))
    }

    /// Create (truncating) `{dir}/{filter}.{name}.txt` for a filter's output.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the file cannot be created.
    pub fn create_filtered(dir: &Path, name: &str, filter: &str) -> io::Result<Self> {
        Self::open(dir.join(format!("{filter}.{name}.{EXTENSION}")))
    }

    fn open(path: PathBuf) -> io::Result<Self> {
        let file = File::create(&path)?;
        info!(path = %path.display(), "opened output");
        Ok(Self {
            path,
            writer: BufWriter::with_capacity(FLUSH_THRESHOLD, file),
            pending: 0,
            written: 0,
        })
    }

    /// Append `line` followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the underlying write or flush.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.pending = self.pending.saturating_add(line.len());
        if self.pending > FLUSH_THRESHOLD {
            self.writer.flush()?;
            self.pending = 0;
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;

        let len = u64::try_from(line.len()).unwrap_or(u64::MAX);
        self.written = self.written.saturating_add(len).saturating_add(1);
        Ok(())
    }

    /// Flush buffered data to disk.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the underlying flush.
    pub fn flush(&mut self) -> io::Result<()> {
        self.pending = 0;
        self.writer.flush()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total bytes written through this sink, newlines included.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush output");
        }
        if self.written == 0 {
            debug!(path = %self.path.display(), "deleting output because it is empty");
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to delete empty output");
            }
        }
    }
}
