// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A bounded pool of worker processes.
//!
//! The main structure in this module is [`ProcessPool`]. Workers are started through a
//! [`WorkerSpawner`]; [`CommandSpawner`] launches real OS processes, each in its own process
//! group (or process tree on Windows) so that stopping a worker also stops everything it spawned.

mod command;
mod imp;
#[cfg(test)]
pub(crate) mod test_helpers;

#[cfg(unix)]
#[path = "unix.rs"]
mod os;

#[cfg(windows)]
#[path = "windows.rs"]
mod os;

pub use command::*;
pub use imp::*;
