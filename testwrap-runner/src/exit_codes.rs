// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `testwrap` failures.
///
/// If the test binary exits with a code of its own, that code is propagated as-is. The codes
/// below cover everything else.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum WrapExitCode {}

impl WrapExitCode {
    /// The test binary exited successfully, and the report (if requested) was written.
    pub const OK: i32 = 0;

    /// The test binary exited without an exit code, for example because it was killed by a
    /// signal, or the run was cancelled.
    ///
    /// This matches Bazel's `RUN_FAILURE`.
    pub const ABNORMAL_EXIT: i32 = 6;

    /// A user issue happened while setting up a run, such as an invalid environment variable or a
    /// test binary that couldn't be started.
    pub const SETUP_ERROR: i32 = 96;

    /// The test binary succeeded, but writing the report failed.
    pub const WRITE_REPORT_FAILED: i32 = 110;
}
