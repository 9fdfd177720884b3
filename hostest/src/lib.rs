// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs test suites inside isolated instances of a host application.
//!
//! Tests are run by launching the host with a bootstrap script, either once for a whole directory
//! or once per test file with a bounded number of hosts alive at a time. Results are gathered from
//! the report each host writes and printed, and optionally exported as JUnit XML.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;
mod reporter;
mod signal;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputContext;
