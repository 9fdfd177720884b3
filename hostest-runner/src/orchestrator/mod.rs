// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Launching a single worker and collecting its results.
//!
//! [`HostRunner`] prepares everything one worker needs: a bootstrap script the host application
//! runs, an invocation file the script reads, and the path the report will be written to. It can
//! also run a worker to completion and parse its report.

mod bootstrap;
mod engine;
mod imp;

pub use bootstrap::{FILENAME_SUFFIX_PLACEHOLDER, TIMESTAMP_PLACEHOLDER, engine_args, render_script};
pub use engine::*;
pub use imp::*;
