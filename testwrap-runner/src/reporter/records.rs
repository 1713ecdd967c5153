// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    events::{TestAction, TestEvent},
    test_output::BoundedOutput,
};
use std::{collections::BTreeMap, fmt, time::Duration};

/// The state of a single test case, as far as the events go.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum CaseState {
    /// The test was mentioned, but never started.
    #[default]
    Unknown,

    /// The test started, but never finished.
    Running,

    /// The test passed.
    Passed,

    /// The test failed.
    Failed,

    /// The test was skipped.
    Skipped,
}

/// Everything known about one test case.
#[derive(Clone, Debug)]
pub struct TestCaseRecord {
    state: CaseState,
    duration: Option<Duration>,
    output_limit: usize,
    // Created on first write.
    stdout: Option<BoundedOutput>,
    stderr: Option<BoundedOutput>,
}

impl TestCaseRecord {
    fn new(output_limit: usize) -> Self {
        Self {
            state: CaseState::Unknown,
            duration: None,
            output_limit,
            stdout: None,
            stderr: None,
        }
    }

    /// Returns the last state the events put this test in.
    pub fn state(&self) -> CaseState {
        self.state
    }

    /// Returns the duration reported by the last terminal event, if any.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns captured standard output.
    pub fn stdout(&self) -> String {
        self.stdout.as_ref().map_or_else(String::new, BoundedOutput::render)
    }

    /// Returns captured standard error.
    pub fn stderr(&self) -> String {
        self.stderr.as_ref().map_or_else(String::new, BoundedOutput::render)
    }

    fn write_stdout(&mut self, text: &str) {
        let limit = self.output_limit;
        self.stdout
            .get_or_insert_with(|| BoundedOutput::new(limit))
            .write_str(text);
    }

    fn write_stderr(&mut self, text: &str) {
        let limit = self.output_limit;
        self.stderr
            .get_or_insert_with(|| BoundedOutput::new(limit))
            .write_str(text);
    }

    fn finish(&mut self, state: CaseState, duration: Option<Duration>) {
        self.state = state;
        self.duration = duration;
    }
}

/// Everything known about one test binary invocation.
#[derive(Clone, Debug)]
pub struct SuiteRecord {
    name: String,
    duration: Option<Duration>,
    output_limit: usize,
    stdout: BoundedOutput,
    stderr: BoundedOutput,
    cases: BTreeMap<String, TestCaseRecord>,
}

impl SuiteRecord {
    /// Creates an empty record for `name`, capturing up to `output_limit` bytes at each end of
    /// every output stream.
    pub fn new(name: impl Into<String>, output_limit: usize) -> Self {
        Self {
            name: name.into(),
            duration: None,
            output_limit,
            stdout: BoundedOutput::new(output_limit),
            stderr: BoundedOutput::new(output_limit),
            cases: BTreeMap::new(),
        }
    }

    /// Creates a record and applies `events` to it in order.
    pub fn from_events<'a>(
        name: impl Into<String>,
        output_limit: usize,
        events: impl IntoIterator<Item = &'a TestEvent>,
    ) -> Self {
        let mut suite = Self::new(name, output_limit);
        for event in events {
            suite.apply(event);
        }
        suite
    }

    /// Returns the name of the suite.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the duration reported by the package-level terminal event, if any.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns standard output not attributed to any test.
    pub fn stdout(&self) -> String {
        self.stdout.render()
    }

    /// Returns standard error not attributed to any test.
    pub fn stderr(&self) -> String {
        self.stderr.render()
    }

    /// Iterates over test cases in name order.
    pub fn cases(&self) -> impl ExactSizeIterator<Item = (&str, &TestCaseRecord)> {
        self.cases.iter().map(|(name, case)| (name.as_str(), case))
    }

    /// Looks up a test case by name.
    pub fn case(&self, name: &str) -> Option<&TestCaseRecord> {
        self.cases.get(name)
    }

    /// Applies a single event.
    ///
    /// Any event naming a test creates its record if it doesn't exist yet. The last terminal event
    /// for a test wins.
    pub fn apply(&mut self, event: &TestEvent) {
        if event.is_package_level() {
            match event.action {
                TestAction::Output => self.stdout.write_str(&event.text),
                TestAction::StderrOutput => self.stderr.write_str(&event.text),
                TestAction::Pass | TestAction::Fail => self.duration = event.elapsed,
                // Only individual tests are skipped.
                TestAction::Run | TestAction::Skip => {}
            }
            return;
        }

        let output_limit = self.output_limit;
        let case = self
            .cases
            .entry(event.test_name.clone())
            .or_insert_with(|| TestCaseRecord::new(output_limit));
        match event.action {
            TestAction::Run => case.state = CaseState::Running,
            TestAction::Output => case.write_stdout(&event.text),
            TestAction::StderrOutput => case.write_stderr(&event.text),
            TestAction::Skip => {
                case.write_stdout(&event.text);
                case.finish(CaseState::Skipped, event.elapsed);
            }
            TestAction::Pass => case.finish(CaseState::Passed, event.elapsed),
            TestAction::Fail => case.finish(CaseState::Failed, event.elapsed),
        }
    }

    /// Derives counts from the current state of every case.
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for case in self.cases.values() {
            summary.tests += 1;
            match case.state {
                CaseState::Passed => summary.passed += 1,
                CaseState::Failed => summary.failed += 1,
                CaseState::Skipped => summary.skipped += 1,
                CaseState::Unknown | CaseState::Running => summary.errors += 1,
            }
        }
        summary
    }
}

/// Counts of test cases by outcome.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReportSummary {
    /// The total number of test cases.
    pub tests: usize,

    /// Test cases that passed.
    pub passed: usize,

    /// Test cases that failed.
    pub failed: usize,

    /// Test cases that were skipped.
    pub skipped: usize,

    /// Test cases with no terminal event.
    pub errors: usize,
}

impl ReportSummary {
    /// Returns true if no test case failed or ended up in an error state.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tests: {} passed, {} failed, {} skipped, {} without a result",
            self.tests, self.passed, self.failed, self.skipped, self.errors,
        )
    }
}
