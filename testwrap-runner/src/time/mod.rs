// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time sources used while supervising a test process.

mod stopwatch;

pub(crate) use stopwatch::*;

use chrono::{DateTime, FixedOffset, Local};
use std::fmt;

/// A source of wall-clock timestamps.
///
/// The interleaver stamps events with readings from a `Clock`. Tests pass in a fake one to get
/// reproducible orderings.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// A [`Clock`] backed by the local system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}
