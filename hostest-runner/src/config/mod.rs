// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for hostest.
//!
//! Configuration is layered. The embedded default config comes first, then the repository config
//! at `.config/hostest.toml` (or an explicitly passed file), then `HOSTEST_`-prefixed environment
//! variables.

mod imp;
mod parallel_instances;

pub use imp::*;
pub use parallel_instances::*;
