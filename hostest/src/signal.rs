// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Waiting for workers while watching for shutdown signals.

use hostest_runner::wait::YieldHook;
use std::{io, ops::ControlFlow, time::Duration};
use tokio::runtime::Runtime;
use tracing::warn;

/// A signal asking hostest to stop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ShutdownEvent {
    #[cfg(unix)]
    Hangup,
    #[cfg(unix)]
    Term,
    Interrupt,
}

/// Sleeps between polls of the runner, returning early if a shutdown signal arrives.
#[derive(Debug)]
pub(crate) struct SignalWaiter {
    runtime: Runtime,
    signals: Option<imp::Signals>,
}

impl SignalWaiter {
    /// Creates a waiter that handles Ctrl-C and other shutdown signals.
    pub(crate) fn new() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let signals = {
            let _guard = runtime.enter();
            imp::Signals::new()?
        };
        Ok(Self {
            runtime,
            signals: Some(signals),
        })
    }

    /// Creates a waiter that only sleeps.
    pub(crate) fn noop() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(Self {
            runtime,
            signals: None,
        })
    }

    /// Waits for `interval` or until a shutdown signal arrives.
    pub(crate) fn wait(&mut self, interval: Duration) -> Option<ShutdownEvent> {
        let signals = &mut self.signals;
        self.runtime.block_on(async move {
            tokio::select! {
                () = tokio::time::sleep(interval) => None,
                event = recv(signals) => Some(event),
            }
        })
    }
}

impl YieldHook for SignalWaiter {
    fn pump(&mut self, interval: Duration) -> ControlFlow<()> {
        match self.wait(interval) {
            Some(event) => {
                warn!("received {event:?}, stopping workers");
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        }
    }
}

async fn recv(signals: &mut Option<imp::Signals>) -> ShutdownEvent {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
mod imp {
    use super::ShutdownEvent;
    use tokio::signal::unix::{Signal, SignalKind, signal};

    /// SIGINT, SIGTERM and SIGHUP.
    #[derive(Debug)]
    pub(super) struct Signals {
        sigint: SignalWithDone,
        sighup: SignalWithDone,
        sigterm: SignalWithDone,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            Ok(Self {
                sigint: SignalWithDone::new(SignalKind::interrupt())?,
                sighup: SignalWithDone::new(SignalKind::hangup())?,
                sigterm: SignalWithDone::new(SignalKind::terminate())?,
            })
        }

        /// Waits for the next signal. Never completes once every stream is closed.
        pub(super) async fn recv(&mut self) -> ShutdownEvent {
            loop {
                tokio::select! {
                    recv = self.sigint.signal.recv(), if !self.sigint.done => {
                        match recv {
                            Some(()) => break ShutdownEvent::Interrupt,
                            None => self.sigint.done = true,
                        }
                    }
                    recv = self.sighup.signal.recv(), if !self.sighup.done => {
                        match recv {
                            Some(()) => break ShutdownEvent::Hangup,
                            None => self.sighup.done = true,
                        }
                    }
                    recv = self.sigterm.signal.recv(), if !self.sigterm.done => {
                        match recv {
                            Some(()) => break ShutdownEvent::Term,
                            None => self.sigterm.done = true,
                        }
                    }
                    else => std::future::pending::<()>().await,
                }
            }
        }
    }

    #[derive(Debug)]
    struct SignalWithDone {
        signal: Signal,
        done: bool,
    }

    impl SignalWithDone {
        fn new(kind: SignalKind) -> std::io::Result<Self> {
            Ok(Self {
                signal: signal(kind)?,
                done: false,
            })
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::ShutdownEvent;
    use tokio::signal::windows::{CtrlC, ctrl_c};

    #[derive(Debug)]
    pub(super) struct Signals {
        ctrl_c: CtrlC,
        ctrl_c_done: bool,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            Ok(Self {
                ctrl_c: ctrl_c()?,
                ctrl_c_done: false,
            })
        }

        pub(super) async fn recv(&mut self) -> ShutdownEvent {
            if !self.ctrl_c_done {
                match self.ctrl_c.recv().await {
                    Some(()) => return ShutdownEvent::Interrupt,
                    None => self.ctrl_c_done = true,
                }
            }
            std::future::pending().await
        }
    }
}
