// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocking waits that keep an embedding event loop responsive.
//!
//! A blocking wait polls its condition and, between polls, hands control to a [`YieldHook`]. With
//! no embedding loop the hook simply sleeps. An application with its own loop (a GUI, or an async
//! runtime driving other work) supplies a hook that pumps that loop instead.
//!
//! A hook returns [`ControlFlow::Break`] to ask for the work being waited on to stop, for example
//! when the user cancels or a shutdown signal arrives. The wait then stops its workers and keeps
//! polling until they are gone.

use std::{ops::ControlFlow, time::Duration};

/// The interval between polls of a blocking wait.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Gives an embedding event loop a chance to run during a blocking wait.
pub trait YieldHook {
    /// Runs the embedding loop for about `interval`, then returns.
    ///
    /// Returns `Break` to stop the work being waited on.
    fn pump(&mut self, interval: Duration) -> ControlFlow<()>;
}

/// A hook for callers without an event loop: sleeps the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SleepYield;

impl YieldHook for SleepYield {
    fn pump(&mut self, interval: Duration) -> ControlFlow<()> {
        std::thread::sleep(interval);
        ControlFlow::Continue(())
    }
}

impl<F: FnMut(Duration) -> ControlFlow<()>> YieldHook for F {
    fn pump(&mut self, interval: Duration) -> ControlFlow<()> {
        self(interval)
    }
}
