// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for `testwrap`, a supervisor that runs a test binary, forwards its output
//! live and turns the progress it reports into a JUnit report.
//!
//! The basic flow is:
//!
//! 1. [`config::WrapEnv`] decides from the environment whether to supervise at all.
//! 2. A [`runner::Supervisor`] launches the test binary and copies its standard output and
//!    standard error to the console and into an [`interleave::EventInterleaver`].
//! 3. Once the test binary is done, the collected [`events::TestEvent`]s are folded into a
//!    [`reporter::SuiteRecord`], with output held in [`test_output::BoundedOutput`] buffers, and
//!    written out as JUnit XML.

pub mod config;
pub mod errors;
pub mod events;
pub mod exit_codes;
pub mod interleave;
pub mod output;
pub mod reporter;
pub mod runner;
pub mod signal;
pub mod test_output;
pub mod time;
