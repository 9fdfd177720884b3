// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `hostest` failures.
///
/// `hostest` runs may fail for a variety of reasons. This structure documents the exit codes that
/// may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum HostestExitCode {}

impl HostestExitCode {
    /// No errors occurred and hostest exited normally.
    pub const OK: i32 = 0;

    /// No tests were executed or collected.
    pub const NO_TESTS_RUN: i32 = 4;

    /// An error was encountered while setting up a run: reading configuration, writing the
    /// bootstrap script or resolving the host executable.
    pub const SETUP_ERROR: i32 = 96;

    /// The tooling required by workers could not be found or installed.
    pub const REQUIREMENTS_FAILED: i32 = 97;

    /// Writing a report (JUnit or coverage) failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 98;

    /// One or more tests failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The run was canceled before every worker finished.
    pub const CANCELED: i32 = 130;
}
