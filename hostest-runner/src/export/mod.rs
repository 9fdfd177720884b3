// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exporting results to other formats.

mod junit;

pub use junit::*;
