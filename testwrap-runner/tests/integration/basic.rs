// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use test_case::test_case;
use testwrap_runner::{
    exit_codes::WrapExitCode,
    reporter::ReportSummary,
    runner::{ChildOutcome, DEFAULT_VERBOSE_FLAG, run_passthrough},
};

#[test]
fn verbose_flag_reports_passing_tests() -> Result<()> {
    let (mut builder, _console) = captured_builder();
    builder.set_verbose_flag(DEFAULT_VERBOSE_FLAG);

    let finished = run_fake(builder, &["pass"])?;
    assert_eq!(finished.outcome, ChildOutcome::Completed { exit_code: 0 });
    assert_eq!(
        finished.summary,
        ReportSummary {
            tests: 2,
            passed: 2,
            ..Default::default()
        }
    );
    Ok(())
}

#[test]
fn passing_tests_are_silent_without_verbose_flag() -> Result<()> {
    let (builder, _console) = captured_builder();

    let finished = run_fake(builder, &["pass"])?;
    assert!(finished.outcome.is_success());
    assert_eq!(finished.summary, ReportSummary::default());
    Ok(())
}

#[test]
fn failing_binary_propagates_exit_code() -> Result<()> {
    let (mut builder, console) = captured_builder();
    builder.set_verbose_flag(DEFAULT_VERBOSE_FLAG);

    let finished = run_fake(builder, &["fail"])?;
    assert_eq!(finished.exit_code(), 1);
    assert_eq!(finished.summary.passed, 1);
    assert_eq!(finished.summary.failed, 1);
    assert!(!finished.summary.is_success());

    // Structured output is forwarded verbatim.
    let stdout = console.stdout.contents();
    assert!(
        stdout.contains(r#"{"Action":"fail","Package":"example.com/fake","Test":"TestBroken""#),
        "stdout: {stdout}"
    );
    Ok(())
}

#[test_case(&[], "verbose=false" ; "without verbose flag")]
#[test_case(&["-test.v"], "verbose=true" ; "with verbose flag")]
fn child_environment_and_arguments(flag: &[&str], expected: &str) -> Result<()> {
    let (mut builder, console) = captured_builder();
    if let Some(flag) = flag.first() {
        builder.set_verbose_flag(*flag);
    }

    run_fake(builder, &["env"])?;
    let stderr = console.stderr.contents();
    assert!(stderr.contains("TEST_WRAP=0\n"), "stderr: {stderr}");
    assert!(stderr.contains(expected), "stderr: {stderr}");
    Ok(())
}

#[test_case("0", 0 ; "zero")]
#[test_case("3", 3 ; "three")]
#[test_case("42", 42 ; "forty-two")]
fn exit_codes_pass_through(code: &str, expected: i32) -> Result<()> {
    let (builder, _console) = captured_builder();
    let finished = run_fake(builder, &["exit", code])?;
    assert_eq!(finished.exit_code(), expected);
    Ok(())
}

#[test]
fn passthrough_runs_without_supervision() -> Result<()> {
    let outcome = run_passthrough(FAKE_TEST_BINARY, ["exit", "7"])?;
    assert_eq!(outcome, ChildOutcome::Completed { exit_code: 7 });
    assert_eq!(outcome.exit_code(), 7);

    let outcome = run_passthrough(FAKE_TEST_BINARY, ["exit", "0"])?;
    assert_eq!(outcome.exit_code(), WrapExitCode::OK);
    Ok(())
}
