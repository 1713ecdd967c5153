// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forwarding of child output to the console and to the event interleaver at the same time.

use std::{fmt, io};
use tracing::warn;

/// Where the child's output is forwarded to while it is also being captured.
pub struct ConsoleStreams {
    pub(crate) stdout: Box<dyn io::Write + Send>,
    pub(crate) stderr: Box<dyn io::Write + Send>,
}

impl ConsoleStreams {
    /// Forwards to this process's standard output and standard error.
    pub fn process() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// Drops forwarded output. Capture is unaffected.
    pub fn discard() -> Self {
        Self::new(io::sink(), io::sink())
    }

    /// Forwards to the given writers.
    pub fn new(
        stdout: impl io::Write + Send + 'static,
        stderr: impl io::Write + Send + 'static,
    ) -> Self {
        Self {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        }
    }
}

impl Default for ConsoleStreams {
    fn default() -> Self {
        Self::process()
    }
}

impl fmt::Debug for ConsoleStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleStreams").finish_non_exhaustive()
    }
}

/// A writer that duplicates everything written to it into a console and a capture sink.
///
/// Console output is flushed on every write so it shows up live. If writing to the console fails
/// (for example because the reading end of a pipe went away), a warning is logged once and the
/// console is dropped. Capture continues regardless. Errors from the capture sink are returned to
/// the caller.
pub struct FanOutWriter<C, S> {
    stream_name: &'static str,
    console: Option<C>,
    sink: S,
}

impl<C: io::Write, S: io::Write> FanOutWriter<C, S> {
    /// Creates a new writer. `stream_name` is used in diagnostics.
    pub fn new(stream_name: &'static str, console: C, sink: S) -> Self {
        Self {
            stream_name,
            console: Some(console),
            sink,
        }
    }

    /// Returns true if output is still being forwarded to the console.
    pub fn is_forwarding(&self) -> bool {
        self.console.is_some()
    }

    /// Consumes the writer, returning the capture sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn write_console(&mut self, buf: &[u8]) {
        let Some(console) = &mut self.console else {
            return;
        };
        if let Err(error) = console.write_all(buf).and_then(|()| console.flush()) {
            warn!(
                "failed to forward test {} to the console, continuing without it: {error}",
                self.stream_name,
            );
            self.console = None;
        }
    }
}

impl<C: io::Write, S: io::Write> io::Write for FanOutWriter<C, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_console(buf);
        self.sink.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.console.as_mut().is_none_or(|console| console.flush().is_ok()) {
            self.console = None;
        }
        self.sink.flush()
    }
}

impl<C, S> fmt::Debug for FanOutWriter<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutWriter")
            .field("stream_name", &self.stream_name)
            .field("forwarding", &self.console.is_some())
            .finish_non_exhaustive()
    }
}
