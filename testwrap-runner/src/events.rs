// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events describing the progress of a test binary.
//!
//! Test binaries report progress as newline-delimited JSON records in the `test2json` format on
//! standard output:
//!
//! ```text
//! {"Time":"2024-01-02T03:04:05.678Z","Action":"run","Package":"pkg","Test":"TestA"}
//! {"Time":"2024-01-02T03:04:05.679Z","Action":"output","Package":"pkg","Test":"TestA","Output":"hi\n"}
//! {"Time":"2024-01-02T03:04:05.680Z","Action":"pass","Package":"pkg","Test":"TestA","Elapsed":0.5}
//! ```
//!
//! Each record is decoded into a [`TestEvent`]. Free text written to standard error becomes
//! [`TestAction::StderrOutput`] events; see [`crate::interleave`].

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::{fmt, time::Duration};

/// One observed unit of test progress.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestEvent {
    /// When the event happened, if known.
    pub timestamp: Option<DateTime<FixedOffset>>,

    /// What happened.
    pub action: TestAction,

    /// The package the event belongs to. May be empty for process-wide events.
    pub package: String,

    /// The test the event belongs to. Empty for package-level events.
    pub test_name: String,

    /// How long the test or package took. Only set for terminal actions.
    pub elapsed: Option<Duration>,

    /// Text payload, for output actions.
    pub text: String,
}

impl TestEvent {
    /// Creates a new event with no timestamp, elapsed time or text.
    pub fn new(
        action: TestAction,
        package: impl Into<String>,
        test_name: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: None,
            action,
            package: package.into(),
            test_name: test_name.into(),
            elapsed: None,
            text: String::new(),
        }
    }

    /// Sets the text payload.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Sets the elapsed time.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Sets the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns true if this event is about the package as a whole rather than a single test.
    #[inline]
    pub fn is_package_level(&self) -> bool {
        self.test_name.is_empty()
    }

    /// Decodes a single line of structured output.
    ///
    /// Trailing whitespace, including the line terminator, is ignored.
    pub fn decode(line: &[u8]) -> DecodedRecord {
        let raw: RawRecord = match serde_json::from_slice(line.trim_ascii_end()) {
            Ok(raw) => raw,
            Err(error) => {
                return DecodedRecord::Malformed {
                    line: String::from_utf8_lossy(line).trim_end().to_owned(),
                    error,
                };
            }
        };

        let Some(action) = TestAction::from_wire(&raw.action) else {
            return DecodedRecord::Ignored { action: raw.action };
        };

        let elapsed = if action.is_terminal() {
            // Negative, NaN and infinite values are all rejected here.
            raw.elapsed
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        } else {
            None
        };

        DecodedRecord::Event(Self {
            timestamp: raw.time,
            action,
            package: raw.package,
            test_name: raw.test,
            elapsed,
            text: raw.output.unwrap_or_default(),
        })
    }
}

/// The kind of a [`TestEvent`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TestAction {
    /// A test started running.
    Run,

    /// A test or package passed.
    Pass,

    /// A test or package failed.
    Fail,

    /// A test was skipped.
    Skip,

    /// A test or package printed text to standard output.
    Output,

    /// Text was written to standard error.
    StderrOutput,
}

impl TestAction {
    /// Returns true for actions that finalize the outcome of a test or package.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Skip)
    }

    /// Returns the name of this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Output => "output",
            Self::StderrOutput => "stderr",
        }
    }

    // Standard error is never part of the structured stream, so "stderr" is not accepted here.
    fn from_wire(action: &str) -> Option<Self> {
        match action {
            "run" => Some(Self::Run),
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "skip" => Some(Self::Skip),
            "output" => Some(Self::Output),
            _ => None,
        }
    }
}

impl fmt::Display for TestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of decoding one line of structured output.
#[derive(Debug)]
pub enum DecodedRecord {
    /// The line described a test event.
    Event(TestEvent),

    /// The line was well-formed, but its action (e.g. `start`, `pause`, `cont` or `bench`) does
    /// not contribute to the report.
    Ignored {
        /// The action named by the record.
        action: String,
    },

    /// The line could not be decoded.
    Malformed {
        /// The line, lossily converted to UTF-8.
        line: String,

        /// The decode error.
        error: serde_json::Error,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRecord {
    #[serde(default)]
    time: Option<DateTime<FixedOffset>>,
    action: String,
    #[serde(default)]
    package: String,
    #[serde(default)]
    test: String,
    #[serde(default)]
    elapsed: Option<f64>,
    #[serde(default)]
    output: Option<String>,
}
