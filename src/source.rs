//! Raw line producers: the kernel ring buffer and the logcat subprocess.
//!
//! Both are treated as opaque blocking byte streams. Opening either can
//! fail; callers log the failure and run the session without a source.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::{debug, info, warn};

/// An already-open blocking byte stream.
pub struct LogSource {
    reader: Box<dyn Read + Send>,
    child: Option<Child>,
}

impl std::fmt::Debug for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSource")
            .field("child", &self.child.as_ref().map(Child::id))
            .finish_non_exhaustive()
    }
}

impl LogSource {
    /// Wrap any blocking reader.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            child: None,
        }
    }

    /// Open a device node or regular file for reading.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the path cannot be opened.
    pub fn open_device(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        info!(path = %path.display(), "opened kernel log source");
        Ok(Self::from_reader(file))
    }

    /// Spawn `command` and read its standard output.
    ///
    /// The child is killed and reaped when the source is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if `command` is empty or the process cannot be spawned.
    pub fn spawn(command: &[String]) -> io::Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout: ChildStdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;

        info!(program = %program, pid = child.id(), "spawned log reader");
        Ok(Self {
            reader: Box::new(stdout),
            child: Some(child),
        })
    }
}

impl Read for LogSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for LogSource {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid = child.id(), %status, "log reader already exited");
            return;
        }
        if let Err(e) = child.kill() {
            warn!(pid = child.id(), error = %e, "failed to kill log reader");
        }
        if let Err(e) = child.wait() {
            warn!(pid = child.id(), error = %e, "failed to reap log reader");
        }
    }
}
