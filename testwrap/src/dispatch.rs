// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts},
};
use bytesize::ByteSize;
use clap::{Args, Parser};
use std::{ffi::OsString, time::Duration};
use testwrap_runner::{
    config::WrapEnv,
    runner::{DEFAULT_VERBOSE_FLAG, SupervisorBuilder, run_passthrough},
    signal::SignalHandlerKind,
};
use tracing::{debug, info};

/// Runs a test binary, forwarding its output and writing a JUnit report.
///
/// The test binary is expected to print its progress as `test2json` records on standard output.
/// Wrapping is controlled by the environment: if TEST_WRAP is set it decides whether to wrap,
/// otherwise wrapping happens if XML_OUTPUT_FILE is set. The report is written to
/// XML_OUTPUT_FILE. Setting TEST_WRAP_TESTV passes the verbosity flag to the test binary.
///
/// When not wrapping, the test binary is run directly with its exit status passed through.
#[derive(Debug, Parser)]
#[command(version, styles = crate::output::clap_styles::style())]
pub struct TestWrapApp {
    #[command(flatten)]
    wrap_opts: WrapOpts,

    #[command(flatten)]
    output: OutputOpts,

    /// The test binary to run, followed by its arguments
    #[arg(
        value_name = "EXECUTABLE",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<OsString>,
}

impl TestWrapApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code to use.
    pub fn exec(self) -> Result<i32> {
        let env = WrapEnv::from_env().map_err(|err| ExpectedError::EnvConfig { err })?;
        self.exec_with(env, SignalHandlerKind::Standard)
    }

    fn exec_with(self, env: WrapEnv, signal_handler: SignalHandlerKind) -> Result<i32> {
        let (program, args) = self
            .command
            .split_first()
            .expect("an executable is present due to clap validation");

        if !env.wrap {
            let outcome = run_passthrough(program, args)
                .map_err(|err| ExpectedError::Supervisor { err })?;
            return Ok(outcome.exit_code());
        }

        let package = self.wrap_opts.package.clone();
        let builder = self.wrap_opts.make_builder(&env);
        let supervisor = builder
            .build(package, signal_handler)
            .map_err(|err| ExpectedError::SupervisorBuild { err })?;
        let finished = supervisor
            .run(program, args)
            .map_err(|err| ExpectedError::Supervisor { err })?;

        let exit_code = finished.exit_code();
        info!(
            "test binary started at {} {}: {} ({:.3}s)",
            finished.start_time.format("%H:%M:%S"),
            finished.outcome,
            finished.summary,
            finished.duration.as_secs_f64(),
        );
        match finished.into_result() {
            Ok(outcome) => {
                debug!(%outcome, exit_code, "run finished");
                Ok(exit_code)
            }
            Err(err) => Err(ExpectedError::WriteReport { err, exit_code }),
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Wrapping options")]
struct WrapOpts {
    /// Name of the package under test, used as the test suite name
    #[arg(long, short, env = "TEST_WRAP_PACKAGE", value_name = "PACKAGE")]
    package: String,

    /// Bytes of output kept from both the start and the end of each stream
    #[arg(
        long,
        env = "TEST_WRAP_OUTPUT_LIMIT",
        value_name = "SIZE",
        default_value = "1MiB"
    )]
    output_limit: ByteSize,

    /// Flag passed to the test binary when TEST_WRAP_TESTV is set
    #[arg(
        long,
        value_name = "FLAG",
        default_value = DEFAULT_VERBOSE_FLAG,
        allow_hyphen_values = true
    )]
    verbose_flag: String,

    /// Time an interrupted test binary has to exit before it is killed
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    grace_period: Duration,

    /// Time to wait for output to finish after the test binary exits
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    leak_timeout: Duration,
}

impl WrapOpts {
    fn make_builder(&self, env: &WrapEnv) -> SupervisorBuilder {
        let mut builder = SupervisorBuilder::default();
        builder
            .set_output_limit(usize::try_from(self.output_limit.as_u64()).unwrap_or(usize::MAX))
            .set_report_path(env.report_path.clone())
            .set_grace_period(self.grace_period)
            .set_leak_timeout(self.leak_timeout);
        if env.add_verbose_flag {
            builder.set_verbose_flag(self.verbose_flag.as_str());
        }
        builder
    }
}
