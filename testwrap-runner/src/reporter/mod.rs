// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Folding test events into a JUnit report.
//!
//! A [`SuiteRecord`] accumulates events for one test binary invocation. Once all events have been
//! applied, it is converted into a [`quick_junit::Report`] with [`SuiteRecord::to_report`], or in
//! one step with [`synthesize`].

mod junit;
mod records;

pub use junit::*;
pub use records::*;
