// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use owo_colors::OwoColorize;
use std::error::Error;
use testwrap_runner::{errors::*, exit_codes::WrapExitCode};
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that testwrap knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("invalid environment configuration")]
    EnvConfig {
        #[source]
        err: EnvConfigError,
    },
    #[error("failed to set up the supervisor")]
    SupervisorBuild {
        #[source]
        err: SupervisorBuildError,
    },
    #[error("failed to run the test binary")]
    Supervisor {
        #[source]
        err: SupervisorError,
    },
    #[error("failed to write the test report")]
    WriteReport {
        #[source]
        err: RunError,
        exit_code: i32,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::EnvConfig { .. }
            | Self::SupervisorBuild { .. }
            | Self::Supervisor { .. } => WrapExitCode::SETUP_ERROR,
            Self::WriteReport { exit_code, .. } => *exit_code,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error: Option<&dyn Error> = match self {
            Self::EnvConfig { err } => {
                error!("{err}");
                err.source()
            }
            Self::SupervisorBuild { err } => {
                error!("failed to set up the test supervisor");
                Some(err as &dyn Error)
            }
            Self::Supervisor { err } => match err {
                SupervisorError::Spawn { program, error } => {
                    error!("failed to start `{}`", program.style(styles.bold));
                    Some(error as &dyn Error)
                }
                other => {
                    error!("{other}");
                    other.source()
                }
            },
            Self::WriteReport { err, .. } => {
                error!("{err}");
                err.source()
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
