// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code to generate JUnit XML reports from suite records.

use super::{CaseState, SuiteRecord};
use crate::{errors::WriteReportError, events::TestEvent};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::Utf8Path;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use tracing::debug;

/// The message attached to tests that never reported a result.
pub static NO_TERMINAL_EVENT: &str = "no terminal event observed for test";

static SKIPPED_MESSAGE: &str = "Skipped";
static FAILED_MESSAGE: &str = "Failed";

/// Folds `events` into a JUnit report for `package`.
///
/// This is a pure function of its input: the same events always produce the same report.
pub fn synthesize(events: &[TestEvent], package: &str, output_limit: usize) -> Report {
    SuiteRecord::from_events(package, output_limit, events).to_report()
}

impl SuiteRecord {
    /// Converts this record into a JUnit report with a single test suite.
    ///
    /// Test cases are emitted in name order. A test case without a terminal event is reported as
    /// an error, with its captured standard output as the error description.
    pub fn to_report(&self) -> Report {
        let classname = format!("bazel/{}", self.name());

        let mut test_suite = TestSuite::new(self.name());
        if let Some(duration) = self.duration() {
            test_suite.set_time(duration);
        }
        test_suite
            .set_system_out(self.stdout())
            .set_system_err(self.stderr());

        for (name, case) in self.cases() {
            let status = match case.state() {
                CaseState::Passed => TestCaseStatus::success(),
                CaseState::Failed => {
                    let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
                    status.set_message(FAILED_MESSAGE);
                    status
                }
                CaseState::Skipped => {
                    let mut status = TestCaseStatus::skipped();
                    status.set_message(SKIPPED_MESSAGE);
                    status
                }
                CaseState::Unknown | CaseState::Running => {
                    let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
                    status
                        .set_message(NO_TERMINAL_EVENT)
                        .set_description(case.stdout());
                    status
                }
            };

            let mut test_case = TestCase::new(name, status);
            test_case.set_classname(classname.as_str());
            if let Some(duration) = case.duration() {
                test_case.set_time(duration);
            }
            test_case
                .set_system_out(case.stdout())
                .set_system_err(case.stderr());

            test_suite.add_test_case(test_case);
        }

        // quick-junit calls skipped tests "disabled". Consumers that follow the Ant schema look
        // for "skipped" instead, so emit both.
        test_suite
            .extra
            .insert("skipped".into(), self.summary().skipped.to_string().into());

        let mut report = Report::new(self.name());
        report.add_test_suite(test_suite);
        report
    }
}

/// Writes `report` to `path` atomically, creating the parent directory if necessary.
pub fn write_report(report: &Report, path: &Utf8Path) -> Result<(), WriteReportError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|error| WriteReportError::Fs {
            file: dir.to_owned(),
            error,
        })?;
    }

    let file = AtomicFile::new(path, OverwriteBehavior::AllowOverwrite);
    file.write(|f| report.serialize(f))
        .map_err(|error| match error {
            atomicwrites::Error::Internal(error) => WriteReportError::Fs {
                file: path.to_owned(),
                error,
            },
            atomicwrites::Error::User(error) => WriteReportError::Junit {
                file: path.to_owned(),
                error,
            },
        })?;

    debug!(%path, "wrote JUnit report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::{TestAction, TestEvent},
        reporter::ReportSummary,
        test_output::DEFAULT_OUTPUT_LIMIT,
    };
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use proptest::{collection::vec, prelude::*};
    use std::{collections::BTreeSet, time::Duration};
    use test_strategy::proptest;

    fn run(test: &str) -> TestEvent {
        TestEvent::new(TestAction::Run, "pkg", test)
    }

    fn output(test: &str, text: &str) -> TestEvent {
        TestEvent::new(TestAction::Output, "pkg", test).with_text(text)
    }

    fn stderr(test: &str, text: &str) -> TestEvent {
        TestEvent::new(TestAction::StderrOutput, "pkg", test).with_text(text)
    }

    fn finish(action: TestAction, test: &str, millis: u64) -> TestEvent {
        TestEvent::new(action, "pkg", test).with_elapsed(Duration::from_millis(millis))
    }

    fn only_suite(report: &Report) -> &TestSuite {
        assert_eq!(report.test_suites.len(), 1, "exactly one test suite");
        &report.test_suites[0]
    }

    fn message(status: &TestCaseStatus) -> Option<&str> {
        match status {
            TestCaseStatus::Success { .. } => None,
            TestCaseStatus::NonSuccess { message, .. } => message.as_deref(),
            TestCaseStatus::Skipped { message, .. } => message.as_deref(),
        }
    }

    fn description(status: &TestCaseStatus) -> Option<&str> {
        match status {
            TestCaseStatus::Success { .. } => None,
            TestCaseStatus::NonSuccess { description, .. } => description.as_deref(),
            TestCaseStatus::Skipped { description, .. } => description.as_deref(),
        }
    }

    fn system_out(test_case: &TestCase) -> Option<&str> {
        test_case.system_out.as_ref().map(|s| s.as_str())
    }

    fn system_err(test_case: &TestCase) -> Option<&str> {
        test_case.system_err.as_ref().map(|s| s.as_str())
    }

    #[test]
    fn single_passing_test() {
        let events = [
            run("A"),
            output("A", "hi\n"),
            finish(TestAction::Pass, "A", 500),
        ];
        let report = synthesize(&events, "pkg", DEFAULT_OUTPUT_LIMIT);
        assert_eq!(report.name.as_str(), "pkg");

        let suite = only_suite(&report);
        assert_eq!(suite.name.as_str(), "pkg");
        assert_eq!(suite.tests, 1);
        assert_eq!(suite.failures, 0);
        assert_eq!(suite.errors, 0);
        assert_eq!(suite.test_cases.len(), 1);

        let case = &suite.test_cases[0];
        assert_eq!(case.name.as_str(), "A");
        assert_eq!(case.classname.as_deref(), Some("bazel/pkg"));
        assert_eq!(case.time, Some(Duration::from_millis(500)));
        assert!(matches!(case.status, TestCaseStatus::Success { .. }));
        assert_eq!(system_out(case), Some("hi\n"));
        assert_eq!(system_err(case), Some(""));

        let xml = report.to_string().unwrap();
        assert!(xml.contains(r#"classname="bazel/pkg""#), "xml: {xml}");
        assert!(xml.contains(r#"time="0.500""#), "xml: {xml}");
        assert!(!xml.contains("<failure"), "xml: {xml}");
        assert!(!xml.contains("<error"), "xml: {xml}");
    }

    #[test]
    fn time_has_three_decimals() {
        let events = [run("A"), finish(TestAction::Pass, "A", 1234)];
        let xml = synthesize(&events, "pkg", DEFAULT_OUTPUT_LIMIT)
            .to_string()
            .unwrap();
        assert!(xml.contains(r#"time="1.234""#), "xml: {xml}");
    }

    #[test]
    fn outcomes_are_mapped() {
        let events = [
            run("fails"),
            output("fails", "assertion failed\n"),
            finish(TestAction::Fail, "fails", 10),
            run("skips"),
            TestEvent::new(TestAction::Skip, "pkg", "skips")
                .with_text("not on this platform\n")
                .with_elapsed(Duration::ZERO),
            run("hangs"),
            output("hangs", "partial\n"),
            stderr("hangs", "warning\n"),
        ];
        let record = SuiteRecord::from_events("pkg", DEFAULT_OUTPUT_LIMIT, &events);
        assert_eq!(
            record.summary(),
            ReportSummary {
                tests: 3,
                passed: 0,
                failed: 1,
                skipped: 1,
                errors: 1,
            }
        );

        let report = record.to_report();
        let suite = only_suite(&report);
        let names: Vec<_> = suite.test_cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["fails", "hangs", "skips"]);

        let fails = &suite.test_cases[0];
        assert!(matches!(
            fails.status,
            TestCaseStatus::NonSuccess {
                kind: NonSuccessKind::Failure,
                ..
            }
        ));
        assert_eq!(message(&fails.status), Some("Failed"));
        assert_eq!(system_out(fails), Some("assertion failed\n"));

        let hangs = &suite.test_cases[1];
        assert!(matches!(
            hangs.status,
            TestCaseStatus::NonSuccess {
                kind: NonSuccessKind::Error,
                ..
            }
        ));
        assert_eq!(message(&hangs.status), Some(NO_TERMINAL_EVENT));
        assert_eq!(description(&hangs.status), Some("partial\n"));
        assert_eq!(system_err(hangs), Some("warning\n"));
        assert_eq!(hangs.time, None);

        let skips = &suite.test_cases[2];
        assert!(matches!(skips.status, TestCaseStatus::Skipped { .. }));
        assert_eq!(message(&skips.status), Some("Skipped"));
        assert_eq!(system_out(skips), Some("not on this platform\n"));

        assert_eq!(suite.failures, 1);
        assert_eq!(suite.errors, 1);
        assert_eq!(suite.disabled, 1);
        let skipped = suite
            .extra
            .iter()
            .find(|(key, _)| key.as_str() == "skipped")
            .map(|(_, value)| value.as_str());
        assert_eq!(skipped, Some("1"));
    }

    #[test]
    fn output_without_run_is_an_error() {
        let events = [output("orphan", "lost?\n")];
        let report = synthesize(&events, "pkg", DEFAULT_OUTPUT_LIMIT);
        let suite = only_suite(&report);
        assert_eq!(suite.errors, 1);

        let case = &suite.test_cases[0];
        assert_eq!(case.name.as_str(), "orphan");
        assert_eq!(message(&case.status), Some(NO_TERMINAL_EVENT));
        assert_eq!(description(&case.status), Some("lost?\n"));
    }

    #[test]
    fn package_level_events() {
        let events = [
            output("", "=== package banner\n"),
            stderr("", "init warning\n"),
            TestEvent::new(TestAction::Skip, "pkg", "").with_text("ignored\n"),
            finish(TestAction::Pass, "", 2500),
        ];
        let record = SuiteRecord::from_events("pkg", DEFAULT_OUTPUT_LIMIT, &events);
        assert_eq!(record.cases().len(), 0);
        assert_eq!(record.duration(), Some(Duration::from_millis(2500)));
        assert_eq!(record.stdout(), "=== package banner\n");
        assert_eq!(record.stderr(), "init warning\n");

        // No cases plus a suite duration is a valid report.
        let report = record.to_report();
        let suite = only_suite(&report);
        assert_eq!(suite.tests, 0);
        assert_eq!(suite.errors, 0);
        assert_eq!(suite.time, Some(Duration::from_millis(2500)));
        assert_eq!(
            suite.system_out.as_ref().map(|s| s.as_str()),
            Some("=== package banner\n")
        );
        assert_eq!(
            suite.system_err.as_ref().map(|s| s.as_str()),
            Some("init warning\n")
        );
    }

    #[test]
    fn last_terminal_event_wins() {
        let events = [
            run("A"),
            finish(TestAction::Fail, "A", 100),
            finish(TestAction::Pass, "A", 200),
            run("A"),
        ];
        let record = SuiteRecord::from_events("pkg", DEFAULT_OUTPUT_LIMIT, &events);
        assert_eq!(record.cases().len(), 1, "no duplicate cases");

        // A second run without a terminal event puts the test back into the running state.
        let case = record.case("A").unwrap();
        assert_eq!(case.state(), CaseState::Running);
        assert_eq!(case.duration(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn case_output_is_bounded() {
        let line = "0123456789\n";
        let mut events = vec![run("noisy")];
        events.extend((0..100).map(|_| output("noisy", line)));
        events.push(finish(TestAction::Pass, "noisy", 1));

        let record = SuiteRecord::from_events("pkg", 64, &events);
        let stdout = record.case("noisy").unwrap().stdout();
        assert!(stdout.starts_with(line), "stdout: {stdout}");
        assert!(stdout.ends_with(line), "stdout: {stdout}");
        assert!(
            stdout.contains("... Too big output (total: 1100, skipped: "),
            "stdout: {stdout}"
        );
    }

    #[test]
    fn synthesis_is_deterministic() {
        let events = [
            run("b"),
            run("a"),
            output("a", "x\n"),
            finish(TestAction::Pass, "b", 1),
            finish(TestAction::Fail, "a", 2),
            run("c"),
        ];
        let first = synthesize(&events, "pkg", DEFAULT_OUTPUT_LIMIT)
            .to_string()
            .unwrap();
        let second = synthesize(&events, "pkg", DEFAULT_OUTPUT_LIMIT)
            .to_string()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn write_report_creates_parent_dirs() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/report.xml");

        let report = synthesize(
            &[run("A"), finish(TestAction::Pass, "A", 5)],
            "pkg",
            DEFAULT_OUTPUT_LIMIT,
        );
        write_report(&report, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, report.to_string().unwrap());
    }

    #[test]
    fn write_report_reports_fs_errors() {
        let dir = Utf8TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let report = synthesize(&[], "pkg", DEFAULT_OUTPUT_LIMIT);
        let error = write_report(&report, &blocker.join("report.xml")).unwrap_err();
        match error {
            WriteReportError::Fs { file, .. } => assert_eq!(file, blocker),
            other => panic!("expected a filesystem error, found {other:?}"),
        }
    }

    fn arb_event() -> impl Strategy<Value = TestEvent> {
        let action = prop_oneof![
            Just(TestAction::Run),
            Just(TestAction::Pass),
            Just(TestAction::Fail),
            Just(TestAction::Skip),
            Just(TestAction::Output),
            Just(TestAction::StderrOutput),
        ];
        let test = prop_oneof![
            Just(""),
            Just("TestA"),
            Just("TestB"),
            Just("TestB/sub"),
            Just("TestC"),
        ];
        (action, test, "[a-z \n]{0,12}").prop_map(|(action, test, text)| {
            TestEvent::new(action, "pkg", test).with_text(text)
        })
    }

    #[proptest(cases = 256)]
    fn every_named_test_yields_one_case(
        #[strategy(vec(arb_event(), 0..40))] events: Vec<TestEvent>,
    ) {
        let report = synthesize(&events, "pkg", 64);
        let suite = only_suite(&report);

        let expected: Vec<&str> = events
            .iter()
            .filter(|event| !event.is_package_level())
            .map(|event| event.test_name.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let names: Vec<&str> = suite.test_cases.iter().map(|case| case.name.as_str()).collect();
        prop_assert_eq!(&names, &expected);
        prop_assert_eq!(suite.tests, expected.len());

        let summary = SuiteRecord::from_events("pkg", 64, &events).summary();
        prop_assert_eq!(summary.tests, expected.len());
        prop_assert_eq!(
            summary.passed + summary.failed + summary.skipped + summary.errors,
            summary.tests
        );
        prop_assert_eq!(suite.failures, summary.failed);
        prop_assert_eq!(suite.errors, summary.errors);
        prop_assert_eq!(suite.disabled, summary.skipped);
    }
}
