// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testwrap.

use crate::runner::ChildOutcome;
use camino::Utf8PathBuf;
use std::{error, ffi::OsString, fmt};
use thiserror::Error;

/// An error that occurred while reading configuration from the environment.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum EnvConfigError {
    /// A boolean toggle had a value that couldn't be parsed.
    #[error(
        "invalid value for {var}: `{value}` \
         (expected one of 1, t, T, TRUE, true, True, 0, f, F, FALSE, false, False)"
    )]
    InvalidBool {
        /// The name of the environment variable.
        var: &'static str,

        /// The value that was set.
        value: String,
    },

    /// A variable that must be UTF-8 wasn't.
    #[error("{var} is not valid UTF-8: {value:?}")]
    NotUnicode {
        /// The name of the environment variable.
        var: &'static str,

        /// The value that was set.
        value: OsString,
    },
}

/// An error occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

/// An error that occurred while building a [`Supervisor`](crate::runner::Supervisor).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupervisorBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// An error occurred while setting up signals.
    #[error("error setting up signals")]
    SignalHandlerSetupError(#[from] SignalHandlerSetupError),
}

/// An error that prevented the test binary from being supervised at all.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupervisorError {
    /// The test binary could not be started.
    #[error("failed to spawn `{program}`")]
    Spawn {
        /// The program that was being started.
        program: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A standard stream of the child was not captured.
    #[error("standard {stream} of the test binary was not captured")]
    MissingPipe {
        /// `"output"` or `"error"`.
        stream: &'static str,
    },

    /// Waiting for the test binary to exit failed.
    #[error("error waiting for the test binary to exit")]
    Wait(#[source] std::io::Error),
}

/// An error that occurred while writing a JUnit report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteReportError {
    /// An error occurred while operating on the file system.
    #[error("error operating on path {file}")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while producing JUnit XML.
    #[error("error writing JUnit output to {file}")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },
}

/// A run that finished, but whose report could not be written.
///
/// Produced by [`RunFinished::into_result`](crate::runner::RunFinished::into_result).
#[derive(Debug, Error)]
pub enum RunError {
    /// The test binary succeeded, but the report could not be written.
    #[error("error generating test report")]
    Report(#[source] WriteReportError),

    /// The test binary failed, and the report could not be written either.
    #[error("error generating test report (the test binary also {outcome})")]
    ReportAndChild {
        /// How the test binary finished.
        outcome: ChildOutcome,

        /// The report error.
        #[source]
        error: WriteReportError,
    },
}

/// Displays an error along with its chain of sources.
///
/// With `{}`, only the sources are listed after the top-level message. With `{:#}`, every source
/// is shown on its own indented line.
#[derive(Debug)]
pub struct DisplayErrorChain<E>(E);

impl<E: error::Error> DisplayErrorChain<E> {
    /// Wraps an error.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(error) = source {
            if f.alternate() {
                write!(f, "\n  caused by: {error}")?;
            } else {
                write!(f, ": {error}")?;
            }
            source = error.source();
        }

        Ok(())
    }
}
