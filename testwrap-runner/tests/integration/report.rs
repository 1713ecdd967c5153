// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use testwrap_runner::{exit_codes::WrapExitCode, runner::DEFAULT_VERBOSE_FLAG};

/// Runs the fake test binary with `args`, and returns the report it produced.
fn report_for(output_limit: Option<usize>, args: &[&str]) -> Result<String> {
    let dir = Utf8TempDir::new()?;
    let path = dir.path().join("out/report.xml");

    let (mut builder, _console) = captured_builder();
    builder
        .set_verbose_flag(DEFAULT_VERBOSE_FLAG)
        .set_report_path(Some(path.clone()));
    if let Some(limit) = output_limit {
        builder.set_output_limit(limit);
    }

    let finished = run_fake(builder, args)?;
    ensure!(
        finished.report_error.is_none(),
        "report error: {:?}",
        finished.report_error
    );
    Ok(std::fs::read_to_string(&path)?)
}

#[test]
fn failing_report() -> Result<()> {
    let xml = report_for(None, &["fail"])?;

    assert!(xml.contains(r#"<testsuites name="example.com/fake""#), "{xml}");
    assert!(
        xml.contains(
            r#"<testsuite name="example.com/fake" tests="2" disabled="0" errors="0" failures="1" time="0.500""#
        ),
        "{xml}"
    );
    assert!(
        xml.contains(r#"<testcase name="TestBroken" classname="bazel/example.com/fake" time="0.020">"#),
        "{xml}"
    );
    assert!(xml.contains(r#"<failure message="Failed""#), "{xml}");
    assert!(xml.contains("broken_test.go:12: got 1, want 2"), "{xml}");
    Ok(())
}

#[test]
fn skipped_report() -> Result<()> {
    let xml = report_for(None, &["skip"])?;

    assert!(xml.contains(r#"disabled="1""#), "{xml}");
    assert!(xml.contains(r#"skipped="1""#), "{xml}");
    assert!(xml.contains(r#"<skipped message="Skipped""#), "{xml}");
    assert!(xml.contains("skipping: needs network"), "{xml}");
    Ok(())
}

#[test]
fn stderr_is_attributed_to_running_test() -> Result<()> {
    let xml = report_for(None, &["stderr"])?;

    let case_start = xml
        .find(r#"<testcase name="TestNoisy""#)
        .expect("test case present");
    let case_end = xml.find("</testcase>").expect("test case closed");
    let noisy = xml.find("noisy diagnostics from TestNoisy").expect("noisy line");
    let teardown = xml.find("package teardown").expect("teardown line");

    assert!(case_start < noisy && noisy < case_end, "{xml}");
    assert!(teardown > case_end, "teardown goes to the suite: {xml}");
    Ok(())
}

#[test]
fn large_output_is_truncated() -> Result<()> {
    let xml = report_for(Some(1024), &["noisy", "100000"])?;

    assert!(xml.contains("... Too big output (total: "), "{xml}");
    // Both windows of the test's output plus the suite's small output, with some slack for XML.
    assert!(xml.len() < 8 * 1024, "report is bounded, got {} bytes", xml.len());
    Ok(())
}

#[test]
fn report_into_a_file_path_fails() -> Result<()> {
    let dir = Utf8TempDir::new()?;
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "")?;

    let (mut builder, _console) = captured_builder();
    builder.set_report_path(Some(blocker.join("report.xml")));

    let finished = run_fake(builder, &["exit", "0"])?;
    ensure!(finished.report_error.is_some(), "expected a report error");
    assert_eq!(finished.exit_code(), WrapExitCode::WRITE_REPORT_FAILED);
    Ok(())
}
