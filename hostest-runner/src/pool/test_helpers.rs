// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory spawner for driving the pool deterministically in tests.

use super::imp::{WorkerExit, WorkerProcess, WorkerSpawner};
use std::{cell::RefCell, io, rc::Rc};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FakeStatus {
    Running,
    Exited(i32),
    Killed,
}

#[derive(Debug, Default)]
struct FakeState {
    spawned: Vec<Vec<String>>,
    statuses: Vec<FakeStatus>,
    fail_marker: Option<String>,
}

/// Records every launch. Workers run until a test calls [`FakeSpawner::exit`].
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeSpawner {
    state: Rc<RefCell<FakeState>>,
}

impl FakeSpawner {
    /// Launches whose arguments contain `marker` fail.
    pub(crate) fn fail_spawns_containing(&self, marker: &str) {
        self.state.borrow_mut().fail_marker = Some(marker.to_owned());
    }

    /// Every successful launch's full command line, in launch order.
    pub(crate) fn spawned(&self) -> Vec<Vec<String>> {
        self.state.borrow().spawned.clone()
    }

    /// Every successful launch's arguments after the program, joined with spaces.
    pub(crate) fn spawned_args(&self) -> Vec<String> {
        self.state
            .borrow()
            .spawned
            .iter()
            .map(|args| args[1..].join(" "))
            .collect()
    }

    /// Makes the `index`th launched worker exit with `code`.
    pub(crate) fn exit(&self, index: usize, code: i32) {
        let mut state = self.state.borrow_mut();
        let status = &mut state.statuses[index];
        assert_eq!(*status, FakeStatus::Running, "worker {index} is running");
        *status = FakeStatus::Exited(code);
    }

    /// Makes every running worker exit with `code`.
    pub(crate) fn exit_all(&self, code: i32) {
        for status in &mut self.state.borrow_mut().statuses {
            if *status == FakeStatus::Running {
                *status = FakeStatus::Exited(code);
            }
        }
    }

    pub(crate) fn status(&self, index: usize) -> FakeStatus {
        self.state.borrow().statuses[index]
    }

    pub(crate) fn n_running(&self) -> usize {
        self.state
            .borrow()
            .statuses
            .iter()
            .filter(|status| **status == FakeStatus::Running)
            .count()
    }
}

impl WorkerSpawner for FakeSpawner {
    type Worker = FakeWorker;

    fn spawn(&mut self, args: &[String]) -> io::Result<FakeWorker> {
        let mut state = self.state.borrow_mut();
        if let Some(marker) = &state.fail_marker {
            if args.iter().any(|arg| arg.contains(marker.as_str())) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "fake launch failure"));
            }
        }
        state.spawned.push(args.to_vec());
        state.statuses.push(FakeStatus::Running);
        Ok(FakeWorker {
            index: state.statuses.len() - 1,
            state: self.state.clone(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeWorker {
    index: usize,
    state: Rc<RefCell<FakeState>>,
}

impl WorkerProcess for FakeWorker {
    fn try_wait(&mut self) -> io::Result<Option<WorkerExit>> {
        Ok(match self.state.borrow().statuses[self.index] {
            FakeStatus::Running => None,
            FakeStatus::Exited(code) => Some(WorkerExit::with_code(Some(code))),
            FakeStatus::Killed => Some(WorkerExit::with_code(None)),
        })
    }

    fn kill(&mut self) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        let status = &mut state.statuses[self.index];
        if *status == FakeStatus::Running {
            *status = FakeStatus::Killed;
        }
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        u32::try_from(self.index).ok()
    }
}
