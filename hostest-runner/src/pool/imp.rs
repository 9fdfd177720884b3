// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::wait::{WAIT_POLL_INTERVAL, YieldHook};
use camino::Utf8PathBuf;
use std::{collections::VecDeque, fmt, io};
use tracing::{debug, warn};

/// How a worker process ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WorkerExit {
    /// The exit code. `None` if the worker was killed by a signal or never started.
    pub code: Option<i32>,
    /// True if the worker could not be launched at all.
    pub start_failed: bool,
}

impl WorkerExit {
    /// A worker that exited with `code`.
    pub fn with_code(code: Option<i32>) -> Self {
        Self {
            code,
            start_failed: false,
        }
    }

    /// A worker that could not be launched.
    pub fn start_failed() -> Self {
        Self {
            code: None,
            start_failed: true,
        }
    }

    /// Returns true if the worker exited with code 0.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start_failed, self.code) {
            (true, _) => write!(f, "failed to start"),
            (false, Some(code)) => write!(f, "exit code {code}"),
            (false, None) => write!(f, "terminated by signal"),
        }
    }
}

/// A running worker process.
pub trait WorkerProcess {
    /// Returns the worker's exit status if it has exited, without blocking.
    fn try_wait(&mut self) -> io::Result<Option<WorkerExit>>;

    /// Kills the worker and every process it spawned, then reaps it.
    fn kill(&mut self) -> io::Result<()>;

    /// The OS process id, if known.
    fn id(&self) -> Option<u32>;
}

/// Launches worker processes.
pub trait WorkerSpawner {
    /// The worker type produced.
    type Worker: WorkerProcess;

    /// Launches a worker with `args`: the program followed by its arguments.
    fn spawn(&mut self, args: &[String]) -> io::Result<Self::Worker>;
}

/// An event produced by [`ProcessPool::poll`].
#[derive(Clone, Debug, PartialEq)]
pub enum PoolEvent<T> {
    /// A worker finished. Its report, if it wrote one, is at `report_path`.
    ResultsAvailable {
        /// The tag the worker was submitted with.
        tag: T,
        /// The report path the worker was submitted with.
        report_path: Utf8PathBuf,
        /// How the worker ended.
        exit: WorkerExit,
    },

    /// The pool became idle: every submitted worker has finished, or the pool was stopped.
    Finished,
}

#[derive(Debug)]
struct QueuedWorker<T> {
    args: Vec<String>,
    report_path: Utf8PathBuf,
    tag: T,
}

#[derive(Debug)]
struct RunningWorker<W, T> {
    process: W,
    report_path: Utf8PathBuf,
    tag: T,
}

#[derive(Debug)]
struct Completion<T> {
    tag: T,
    report_path: Utf8PathBuf,
    exit: WorkerExit,
}

/// A FIFO queue of workers, at most `pool_size` of which run at once.
///
/// The pool is driven by [`poll`](Self::poll) from a single owning thread. Each call reaps workers
/// that have exited and returns at most one [`PoolEvent`].
///
/// After a `ResultsAvailable` event is returned, the pool settles on the following call: it admits
/// queued work and, if nothing is left queued, running or undelivered, returns `Finished`. Work
/// submitted while handling `ResultsAvailable` is therefore seen before the pool decides it is
/// idle.
///
/// Each `T` tags a submission and is handed back with its results.
pub struct ProcessPool<S: WorkerSpawner, T> {
    spawner: S,
    queued: VecDeque<QueuedWorker<T>>,
    running: Vec<RunningWorker<S::Worker, T>>,
    completed: VecDeque<Completion<T>>,
    pool_size: usize,
    is_stopping: bool,
    needs_settle: bool,
}

impl<S: WorkerSpawner, T> ProcessPool<S, T> {
    /// Creates an empty pool with a concurrency limit of 1.
    pub fn new(spawner: S) -> Self {
        Self {
            spawner,
            queued: VecDeque::new(),
            running: Vec::new(),
            completed: VecDeque::new(),
            pool_size: 1,
            is_stopping: false,
            needs_settle: false,
        }
    }

    /// The concurrency limit.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of workers waiting to start.
    pub fn n_queued(&self) -> usize {
        self.queued.len()
    }

    /// Number of workers currently running.
    pub fn n_running(&self) -> usize {
        self.running.len()
    }

    /// The spawner.
    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    /// Returns true if no worker is queued or running.
    pub fn is_finished(&self) -> bool {
        self.queued.is_empty() && self.running.is_empty()
    }

    /// Sets the concurrency limit, clamped to at least 1, and starts queued work up to it.
    ///
    /// Lowering the limit never stops running workers.
    pub fn set_pool_size(&mut self, pool_size: usize) {
        self.pool_size = pool_size.max(1);
        self.start_next();
    }

    /// Queues a worker and starts work if the limit allows. Ignored while the pool is stopping.
    pub fn add_process(&mut self, args: Vec<String>, report_path: Utf8PathBuf, tag: T) {
        if self.is_stopping {
            debug!("pool is stopping, not queueing worker for {report_path}");
            return;
        }
        self.queued.push_back(QueuedWorker {
            args,
            report_path,
            tag,
        });
        self.start_next();
    }

    /// Kills every running worker and drops every queued one.
    ///
    /// The next call to [`poll`](Self::poll) returns `Finished`, even if nothing was running.
    /// Results of stopped workers are never delivered. New work is ignored until that `Finished`
    /// event has been returned.
    pub fn stop(&mut self) {
        self.is_stopping = true;
        for mut worker in self.running.drain(..) {
            debug!(
                "killing worker (pid {:?}) for {}",
                worker.process.id(),
                worker.report_path
            );
            if let Err(error) = worker.process.kill() {
                warn!("error killing worker for {}: {error}", worker.report_path);
            }
        }
        self.queued.clear();
        self.completed.clear();
        self.needs_settle = false;
    }

    /// Reaps exited workers and returns the next event, if any.
    pub fn poll(&mut self) -> Option<PoolEvent<T>> {
        if self.is_stopping {
            self.is_stopping = false;
            return Some(PoolEvent::Finished);
        }

        if self.needs_settle {
            self.needs_settle = false;
            self.start_next();
            if self.is_idle() {
                return Some(PoolEvent::Finished);
            }
        }

        if self.completed.is_empty() {
            self.reap();
        }

        let completion = self.completed.pop_front()?;
        self.needs_settle = true;
        Some(PoolEvent::ResultsAvailable {
            tag: completion.tag,
            report_path: completion.report_path,
            exit: completion.exit,
        })
    }

    /// Polls until the pool becomes idle, yielding to `hook` between polls. Returns every event
    /// produced along the way, ending with `Finished` unless the pool was idle to begin with.
    ///
    /// If the hook breaks, the pool is stopped and the wait ends at the resulting `Finished`.
    pub fn wait_for_finished(&mut self, hook: &mut impl YieldHook) -> Vec<PoolEvent<T>> {
        let mut events = Vec::new();
        loop {
            while let Some(event) = self.poll() {
                let finished = matches!(event, PoolEvent::Finished);
                events.push(event);
                if finished {
                    return events;
                }
            }
            if self.is_idle() {
                return events;
            }
            if hook.pump(WAIT_POLL_INTERVAL).is_break() {
                debug!("wait interrupted, stopping pool");
                self.stop();
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.is_finished() && self.completed.is_empty()
    }

    fn start_next(&mut self) {
        while self.can_start_next() {
            let Some(worker) = self.queued.pop_front() else {
                break;
            };
            match self.spawner.spawn(&worker.args) {
                Ok(process) => {
                    debug!(
                        "started worker (pid {:?}) for {}",
                        process.id(),
                        worker.report_path
                    );
                    self.running.push(RunningWorker {
                        process,
                        report_path: worker.report_path,
                        tag: worker.tag,
                    });
                }
                Err(error) => {
                    warn!(
                        "failed to start worker `{}`: {error}",
                        shell_words::join(&worker.args)
                    );
                    self.completed.push_back(Completion {
                        tag: worker.tag,
                        report_path: worker.report_path,
                        exit: WorkerExit::start_failed(),
                    });
                }
            }
        }
    }

    fn can_start_next(&self) -> bool {
        !self.queued.is_empty() && self.running.len() < self.pool_size && !self.is_stopping
    }

    fn reap(&mut self) {
        let mut idx = 0;
        while idx < self.running.len() {
            let exit = match self.running[idx].process.try_wait() {
                Ok(Some(exit)) => exit,
                Ok(None) => {
                    idx += 1;
                    continue;
                }
                Err(error) => {
                    warn!(
                        "error waiting for worker for {}, treating it as exited: {error}",
                        self.running[idx].report_path
                    );
                    WorkerExit::with_code(None)
                }
            };
            let worker = self.running.remove(idx);
            debug!("worker for {} finished: {exit}", worker.report_path);
            self.completed.push_back(Completion {
                tag: worker.tag,
                report_path: worker.report_path,
                exit,
            });
        }
    }
}

impl<S: WorkerSpawner, T> Drop for ProcessPool<S, T> {
    fn drop(&mut self) {
        for worker in &mut self.running {
            // Best effort: the pool owns its workers and must not leak them.
            let _ = worker.process.kill();
        }
    }
}

impl<S: WorkerSpawner, T> fmt::Debug for ProcessPool<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessPool")
            .field("pool_size", &self.pool_size)
            .field("n_queued", &self.queued.len())
            .field("n_running", &self.running.len())
            .field("n_completed", &self.completed.len())
            .field("is_stopping", &self.is_stopping)
            .finish()
    }
}
