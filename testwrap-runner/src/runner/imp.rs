// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::os;
use crate::{
    config::TEST_WRAP_ENV,
    errors::{
        DisplayErrorChain, RunError, SupervisorBuildError, SupervisorError, WriteReportError,
    },
    exit_codes::WrapExitCode,
    interleave::EventInterleaver,
    output::{ConsoleStreams, FanOutWriter},
    reporter::{ReportSummary, SuiteRecord, write_report},
    signal::{ShutdownEvent, SignalHandler, SignalHandlerKind},
    test_output::DEFAULT_OUTPUT_LIMIT,
    time::{Clock, SystemClock, stopwatch},
};
use bytes::{Bytes, BytesMut};
use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use std::{
    ffi::{OsStr, OsString},
    fmt,
    io::{self, Write},
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    runtime::Runtime,
    sync::mpsc,
};
use tracing::{debug, warn};

/// The default verbosity flag passed to test binaries.
pub const DEFAULT_VERBOSE_FLAG: &str = "-test.v";

/// The default time an interrupted test binary has to exit before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// The default time to wait for output pipes to close after the test binary exits.
pub const DEFAULT_LEAK_TIMEOUT: Duration = Duration::from_secs(5);

const COPY_BUF_SIZE: usize = 8 * 1024;

// Chunks read from a pipe but not yet written out.
const COPY_QUEUE_DEPTH: usize = 16;

/// Test binary supervisor builder.
#[derive(Debug)]
pub struct SupervisorBuilder {
    output_limit: usize,
    report_path: Option<Utf8PathBuf>,
    verbose_flag: Option<String>,
    grace_period: Duration,
    leak_timeout: Duration,
    envs: Vec<(OsString, OsString)>,
    console: ConsoleStreams,
    clock: Arc<dyn Clock>,
    worker_threads: Option<usize>,
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self {
            output_limit: DEFAULT_OUTPUT_LIMIT,
            report_path: None,
            verbose_flag: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            leak_timeout: DEFAULT_LEAK_TIMEOUT,
            envs: Vec::new(),
            console: ConsoleStreams::process(),
            clock: Arc::new(SystemClock),
            worker_threads: None,
        }
    }
}

impl SupervisorBuilder {
    /// Sets the capacity, in bytes, of each of the head and tail windows kept per output stream.
    pub fn set_output_limit(&mut self, output_limit: usize) -> &mut Self {
        self.output_limit = output_limit;
        self
    }

    /// Sets where the JUnit report is written. If `None`, no report is written.
    pub fn set_report_path(&mut self, report_path: Option<Utf8PathBuf>) -> &mut Self {
        self.report_path = report_path;
        self
    }

    /// Passes `flag` to the test binary ahead of its other arguments.
    ///
    /// Test binaries often only report passing tests when asked to be verbose, and the report
    /// needs those events.
    pub fn set_verbose_flag(&mut self, flag: impl Into<String>) -> &mut Self {
        self.verbose_flag = Some(flag.into());
        self
    }

    /// Sets how long an interrupted test binary may take to exit before it is killed.
    pub fn set_grace_period(&mut self, grace_period: Duration) -> &mut Self {
        self.grace_period = grace_period;
        self
    }

    /// Sets how long to wait for the output pipes to close after the test binary exits.
    pub fn set_leak_timeout(&mut self, leak_timeout: Duration) -> &mut Self {
        self.leak_timeout = leak_timeout;
        self
    }

    /// Sets an environment variable for the test binary.
    ///
    /// `TEST_WRAP` is always overridden to `0`.
    pub fn set_env(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> &mut Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Sets where forwarded output goes. Defaults to this process's standard streams.
    pub fn set_console(&mut self, console: ConsoleStreams) -> &mut Self {
        self.console = console;
        self
    }

    /// Sets the clock used to timestamp events that don't carry their own time.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) -> &mut Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub(crate) fn set_worker_threads(&mut self, worker_threads: usize) -> &mut Self {
        self.worker_threads = Some(worker_threads);
        self
    }

    /// Creates a new supervisor for the given package.
    pub fn build(
        self,
        package: impl Into<String>,
        signal_handler: SignalHandlerKind,
    ) -> Result<Supervisor, SupervisorBuildError> {
        let mut runtime = tokio::runtime::Builder::new_multi_thread();
        runtime.enable_all().thread_name("testwrap-supervisor");
        if let Some(worker_threads) = self.worker_threads {
            runtime.worker_threads(worker_threads);
        }
        let runtime = runtime
            .build()
            .map_err(SupervisorBuildError::TokioRuntimeCreate)?;
        let signal_handler = {
            // Signal handlers must be registered from within the runtime.
            let _guard = runtime.enter();
            signal_handler.build()?
        };

        Ok(Supervisor {
            package: package.into(),
            settings: Settings {
                output_limit: self.output_limit,
                report_path: self.report_path,
                verbose_flag: self.verbose_flag,
                grace_period: self.grace_period,
                leak_timeout: self.leak_timeout,
                envs: self.envs,
                clock: self.clock,
            },
            console: self.console,
            signal_handler,
            runtime,
        })
    }
}

/// Runs a test binary, forwarding its output and building a report from it.
///
/// Created using [`SupervisorBuilder::build`].
#[derive(Debug)]
pub struct Supervisor {
    package: String,
    settings: Settings,
    console: ConsoleStreams,
    signal_handler: SignalHandler,
    runtime: Runtime,
}

impl Supervisor {
    /// Runs `program` with `args` to completion or cancellation.
    ///
    /// Standard output is parsed as structured test events and standard error as free-form
    /// text, while both are forwarded to the console as-is. Once the test binary is done, a
    /// report is written if a report path was configured.
    ///
    /// Failing to write the report is not an error here: it is recorded in
    /// [`RunFinished::report_error`] so that it can be weighed against the test binary's own
    /// outcome.
    pub fn run<I, A>(self, program: impl AsRef<OsStr>, args: I) -> Result<RunFinished, SupervisorError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let Self {
            package,
            settings,
            console,
            mut signal_handler,
            runtime,
        } = self;
        let program = program.as_ref();

        let interleaver = EventInterleaver::new(package.clone(), settings.clock.clone());
        let cmd = settings.make_command(program, args);
        let stopwatch = stopwatch();

        debug!(?program, %package, "starting test binary");
        let res = runtime.block_on(settings.supervise(
            cmd,
            program,
            console,
            &mut signal_handler,
            &interleaver,
        ));
        interleaver.close(!matches!(res, Ok(ChildOutcome::Completed { .. })));
        // Copies abandoned after the leak timeout may still be blocked on a read.
        runtime.shutdown_background();

        let outcome = res?;
        let snapshot = stopwatch.snapshot();

        let events = interleaver.collected_events();
        let record = SuiteRecord::from_events(package.as_str(), settings.output_limit, &events);
        let summary = record.summary();
        debug!(
            %summary,
            malformed = interleaver.malformed_count(),
            "test binary {outcome} after {:?}",
            snapshot.duration,
        );

        let report_error = match &settings.report_path {
            Some(path) => write_report(&record.to_report(), path).err(),
            None => None,
        };

        Ok(RunFinished {
            outcome,
            summary,
            report_error,
            start_time: snapshot.start_time,
            duration: snapshot.duration,
        })
    }
}

/// Runs `program` with inherited standard streams and no supervision.
///
/// Used when wrapping is disabled.
pub fn run_passthrough<I, A>(
    program: impl AsRef<OsStr>,
    args: I,
) -> Result<ChildOutcome, SupervisorError>
where
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let program = program.as_ref();
    debug!(?program, "running test binary without supervision");
    let status = std::process::Command::new(program)
        .args(args)
        .status()
        .map_err(|error| SupervisorError::Spawn {
            program: program.to_string_lossy().into_owned(),
            error,
        })?;
    Ok(ChildOutcome::from_exit_status(status))
}

#[derive(Debug)]
struct Settings {
    output_limit: usize,
    report_path: Option<Utf8PathBuf>,
    verbose_flag: Option<String>,
    grace_period: Duration,
    leak_timeout: Duration,
    envs: Vec<(OsString, OsString)>,
    clock: Arc<dyn Clock>,
}

impl Settings {
    fn make_command<I, A>(&self, program: &OsStr, args: I) -> Command
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program);
        if let Some(flag) = &self.verbose_flag {
            cmd.arg(flag);
        }
        cmd.args(args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .env(TEST_WRAP_ENV, "0")
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn supervise(
        &self,
        mut cmd: Command,
        program: &OsStr,
        console: ConsoleStreams,
        signal_handler: &mut SignalHandler,
        interleaver: &EventInterleaver,
    ) -> Result<ChildOutcome, SupervisorError> {
        let mut child = cmd.spawn().map_err(|error| SupervisorError::Spawn {
            program: program.to_string_lossy().into_owned(),
            error,
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SupervisorError::MissingPipe { stream: "output" })?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SupervisorError::MissingPipe { stream: "error" })?;

        let ConsoleStreams {
            stdout: console_stdout,
            stderr: console_stderr,
        } = console;
        let stdout_task = tokio::spawn(copy_stream(
            stdout,
            FanOutWriter::new("stdout", console_stdout, interleaver.structured_sink()),
        ));
        let stderr_task = tokio::spawn(copy_stream(
            stderr,
            FanOutWriter::new("stderr", console_stderr, interleaver.text_sink()),
        ));

        let outcome = tokio::select! {
            res = child.wait() => {
                ChildOutcome::from_exit_status(res.map_err(SupervisorError::Wait)?)
            }
            Some(event) = signal_handler.recv() => {
                debug!(%event, "interrupting test binary");
                os::interrupt_child(&child);
                let status = self.wait_after_interrupt(&mut child, signal_handler).await?;
                debug!(%status, "test binary exited after being interrupted");
                ChildOutcome::Cancelled { event }
            }
        };

        // A grandchild that inherited the pipes can keep them open indefinitely.
        let drain = async {
            for (stream, task) in [("stdout", stdout_task), ("stderr", stderr_task)] {
                match task.await {
                    Ok(Ok(bytes)) => debug!(stream, bytes, "finished copying test binary output"),
                    Ok(Err(error)) => warn!(
                        "error copying test binary {stream}: {}",
                        DisplayErrorChain::new(&error),
                    ),
                    Err(error) => warn!("task copying test binary {stream} failed: {error}"),
                }
            }
        };
        if tokio::time::timeout(self.leak_timeout, drain).await.is_err() {
            warn!(
                "test binary exited, but its output was still open after {:?}; \
                 trailing output may be missing from the report",
                self.leak_timeout,
            );
        }

        Ok(outcome)
    }

    async fn wait_after_interrupt(
        &self,
        child: &mut Child,
        signal_handler: &mut SignalHandler,
    ) -> Result<ExitStatus, SupervisorError> {
        tokio::select! {
            res = child.wait() => return res.map_err(SupervisorError::Wait),
            Some(event) = signal_handler.recv() => {
                debug!(%event, "received another shutdown signal, killing test binary");
            }
            () = tokio::time::sleep(self.grace_period) => {
                warn!(
                    "test binary did not exit within {:?} of being interrupted, killing it",
                    self.grace_period,
                );
            }
        }

        if let Err(error) = child.start_kill() {
            debug!("failed to kill test binary: {error}");
        }
        child.wait().await.map_err(SupervisorError::Wait)
    }
}

/// Copies `reader` into `writer` until end of file, returning the number of bytes written.
///
/// `writer` may block (a stalled console, for one), so writes happen on a blocking thread. That
/// keeps the runtime's timers and signal handling running while output is stuck.
async fn copy_stream<R, W>(reader: R, writer: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: Write + Send + 'static,
{
    let (tx, rx) = mpsc::channel(COPY_QUEUE_DEPTH);
    let write_task = tokio::task::spawn_blocking(move || write_chunks(rx, writer));
    let read_res = read_chunks(reader, tx).await;
    let copied = write_task.await.map_err(io::Error::other)??;
    read_res?;
    Ok(copied)
}

async fn read_chunks<R: AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::Sender<Bytes>,
) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(COPY_BUF_SIZE);
    loop {
        buf.reserve(COPY_BUF_SIZE);
        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
        if tx.send(buf.split().freeze()).await.is_err() {
            // The writer failed, and reports its own error.
            return Ok(());
        }
    }
}

fn write_chunks<W: Write>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> io::Result<u64> {
    let mut copied = 0;
    while let Some(chunk) = rx.blocking_recv() {
        writer.write_all(&chunk)?;
        copied += chunk.len() as u64;
    }
    writer.flush()?;
    Ok(copied)
}

/// How the test binary finished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChildOutcome {
    /// The test binary exited on its own.
    Completed {
        /// The exit code.
        exit_code: i32,
    },

    /// The test binary was terminated without producing an exit code.
    Signalled {
        /// The terminating signal, if known.
        signal: Option<i32>,
    },

    /// The run was cancelled and the test binary was interrupted.
    Cancelled {
        /// The signal that cancelled the run.
        event: ShutdownEvent,
    },
}

impl ChildOutcome {
    fn from_exit_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(exit_code) => Self::Completed { exit_code },
            None => Self::Signalled {
                signal: os::exit_signal(status),
            },
        }
    }

    /// Returns true if the test binary exited with code 0.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed { exit_code: 0 })
    }

    /// Returns the exit code `testwrap` should exit with for this outcome.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Completed { exit_code } => exit_code,
            Self::Signalled { .. } | Self::Cancelled { .. } => WrapExitCode::ABNORMAL_EXIT,
        }
    }
}

impl fmt::Display for ChildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { exit_code } => write!(f, "exited with code {exit_code}"),
            Self::Signalled {
                signal: Some(signal),
            } => write!(f, "was terminated by signal {signal}"),
            Self::Signalled { signal: None } => f.write_str("was terminated abnormally"),
            Self::Cancelled { event } => write!(f, "was cancelled by {event}"),
        }
    }
}

/// The result of a supervised run.
#[derive(Debug)]
pub struct RunFinished {
    /// How the test binary finished.
    pub outcome: ChildOutcome,

    /// Counts of test cases by outcome.
    pub summary: ReportSummary,

    /// The error that occurred while writing the report, if any.
    pub report_error: Option<WriteReportError>,

    /// When the test binary was started.
    pub start_time: DateTime<Local>,

    /// How long the run took.
    pub duration: Duration,
}

impl RunFinished {
    /// Returns the exit code `testwrap` should exit with.
    ///
    /// The test binary's status takes precedence. A report failure only determines the exit
    /// code if the test binary succeeded.
    pub fn exit_code(&self) -> i32 {
        match (&self.report_error, self.outcome.is_success()) {
            (Some(_), true) => WrapExitCode::WRITE_REPORT_FAILED,
            _ => self.outcome.exit_code(),
        }
    }

    /// Converts a report failure into an error, returning the outcome otherwise.
    pub fn into_result(self) -> Result<ChildOutcome, RunError> {
        match self.report_error {
            None => Ok(self.outcome),
            Some(error) if self.outcome.is_success() => Err(RunError::Report(error)),
            Some(error) => Err(RunError::ReportAndChild {
                outcome: self.outcome,
                error,
            }),
        }
    }
}
