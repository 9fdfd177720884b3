// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events emitted while tests run.
//!
//! Each component owns its own [`EventEmitter`]. There is no global event bus: listeners
//! subscribe to the component whose events they care about.

use camino::Utf8PathBuf;
use debug_ignore::DebugIgnore;
use std::fmt;

/// An event emitted by a [`ParallelRunner`](crate::coordinator::ParallelRunner).
#[derive(Clone, Debug, PartialEq)]
pub enum RunnerEvent {
    /// A test request was accepted and its first worker submitted.
    ProcessStarted,

    /// Every worker of the current request has finished, or the request was stopped.
    ProcessFinished,

    /// A worker finished and its report is available at this path.
    ResultsAvailable(Utf8PathBuf),

    /// Progress through the current request.
    ProgressUpdate {
        /// Number of worker reports received so far.
        done: usize,
        /// Number of worker reports expected.
        total: usize,
        /// What the runner is doing.
        stage: ProgressStage,
    },
}

/// What a [`ParallelRunner`](crate::coordinator::ParallelRunner) is doing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressStage {
    /// Collecting tests, either for display or before a fan-out run.
    CollectingTests,
    /// Running tests.
    RunningTests,
    /// Neither: idle or stopping.
    None,
}

impl ProgressStage {
    /// The human label for this stage.
    pub fn label(self) -> &'static str {
        match self {
            Self::CollectingTests => "collecting tests",
            Self::RunningTests => "running tests",
            Self::None => "",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

type Listener<'a, E> = Box<dyn FnMut(&E) + 'a>;

/// A list of listeners for events of type `E`, called in subscription order.
pub struct EventEmitter<'a, E> {
    listeners: DebugIgnore<Vec<Listener<'a, E>>>,
}

impl<'a, E> EventEmitter<'a, E> {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: DebugIgnore(Vec::new()),
        }
    }

    /// Adds a listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'a) {
        self.listeners.push(Box::new(listener));
    }

    /// Calls every listener with `event`.
    pub fn emit(&mut self, event: &E) {
        for listener in self.listeners.iter_mut() {
            listener(event);
        }
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E> Default for EventEmitter<'_, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventEmitter<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners)
            .finish()
    }
}
