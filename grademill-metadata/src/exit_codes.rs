// Copyright (c) The grademill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `grademill` failures.
///
/// `grademill` invocations (and batch harnesses built on the runner library)
/// may fail for a variety of reasons. This structure documents the exit
/// codes that occur in case of expected failures, so that driver scripts can
/// tell them apart.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum GrademillExitCode {}

impl GrademillExitCode {
    /// No errors occurred and grademill exited normally.
    pub const OK: i32 = 0;

    /// A result file already existed and overwriting was not requested.
    ///
    /// Batch re-runs are idempotent by default; this code marks the batch
    /// that was skipped because its record was already on disk.
    pub const RESULTS_EXIST: i32 = 1;

    /// The batch finished but one or more tests were aborted (never reached
    /// a terminal outcome before the batch timeout).
    pub const ABORTED_TESTS: i32 = 2;

    /// A user issue happened while setting up a grademill invocation, such
    /// as a submissions root that is not a directory.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more dispatched jobs exited non-zero or timed out.
    pub const JOB_RUN_FAILED: i32 = 100;
}
