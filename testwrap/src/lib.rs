// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a test binary, forwards its output live and writes a JUnit report of the tests it ran.
//!
//! This crate contains the `testwrap` command-line interface. The supervisor itself lives in
//! `testwrap-runner`.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
