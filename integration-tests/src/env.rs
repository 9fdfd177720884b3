// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::process::Command;

/// Variables that would let the environment running the tests leak into hostest's behavior.
const REMOVED_VARS: &[&str] = &[
    "HOSTEST_LOG",
    "HOSTEST_VERBOSE",
    "HOSTEST_HOST",
    "HOSTEST_SETTINGS_FILE",
    "HOSTEST_HOST__EXECUTABLE",
    "HOSTEST_HOST__PYTHON",
    "HOSTEST_HOST__CHECK_REQUIREMENTS",
    "HOSTEST_RUN__PARALLEL_INSTANCES",
    "FAKE_HOST_LOG_DIR",
];

/// Sets up the environment of a hostest command for a test.
pub fn set_env_vars(command: &mut Command) {
    for var in REMOVED_VARS {
        command.env_remove(var);
    }

    // Keep ANSI color codes out of the output.
    command.env("HOSTEST_COLOR", "never");
}
