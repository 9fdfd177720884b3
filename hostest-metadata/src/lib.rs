// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! This crate contains the machine-readable formats shared between hostest and the worker
//! processes it launches.
//!
//! * [`RawReport`] and its entries describe the report file a worker writes once its test engine
//!   has finished.
//! * [`WorkerInvocation`] is the document a worker's bootstrap script reads to find out what to
//!   run.
//! * [`HostestExitCode`] lists the exit codes the `hostest` binary may return.

mod exit_codes;
mod invocation;
mod report;

pub use exit_codes::*;
pub use invocation::*;
pub use report::*;
