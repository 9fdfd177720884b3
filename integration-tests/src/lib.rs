// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for hostest's integration tests.

pub mod env;
pub mod hostest_cli;
pub mod suite;
