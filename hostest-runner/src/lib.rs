// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for hostest: running test suites inside isolated instances of a host
//! application.
//!
//! The basic flow of operations is:
//!
//! 1. A [`ParallelRunner`](coordinator::ParallelRunner) receives a request to test a directory.
//! 2. It asks the [`HostRunner`](orchestrator::HostRunner) to prepare a launch command for each
//!    worker: a bootstrap script for the host application plus the path its report will land at.
//! 3. The [`ProcessPool`](pool::ProcessPool) starts workers in FIFO order, never exceeding its
//!    concurrency limit.
//! 4. As workers exit, their reports are parsed into [`Results`](results::Results) and surfaced
//!    through [`RunnerEvent`](events::RunnerEvent)s.

pub mod case;
pub mod config;
pub mod coordinator;
pub mod coverage;
pub mod errors;
pub mod events;
pub mod export;
pub mod orchestrator;
pub mod pool;
pub mod python_cli;
pub mod requirements;
pub mod results;
pub mod run_settings;
pub mod settings_store;
pub mod wait;
