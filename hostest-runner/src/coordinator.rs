// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a test request across a pool of workers.
//!
//! A [`ParallelRunner`] implements three protocols:
//!
//! * **collect only**: one worker collects every test.
//! * **direct**: one worker runs every test.
//! * **fan-out**: one worker collects the tests, then each discovered file is run by its own
//!   worker, up to the configured number at a time.
//!
//! The runner is driven by [`ParallelRunner::poll`] (or the blocking
//! [`ParallelRunner::wait_for_finished`]) and reports what happens through [`RunnerEvent`]s.

use crate::{
    coverage::CoverageReporter,
    errors::{PrepareRunError, StartTestError},
    events::{EventEmitter, ProgressStage, RunnerEvent},
    orchestrator::HostRunner,
    pool::{PoolEvent, ProcessPool, WorkerSpawner},
    results::Results,
    run_settings::RunSettings,
    wait::{WAIT_POLL_INTERVAL, YieldHook},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use tracing::{debug, warn};

/// A request to test a directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestRequest {
    /// The directory to test.
    pub directory: Utf8PathBuf,
    /// An expression selecting tests by name. Empty selects everything.
    pub function_pattern: String,
    /// A pattern selecting test files. Empty selects the engine's default.
    pub file_pattern: String,
    /// How workers are launched.
    pub settings: RunSettings,
    /// Only collect tests instead of running them.
    pub collect_only: bool,
}

impl TestRequest {
    /// Creates a request running every test in `directory`.
    pub fn new(directory: impl Into<Utf8PathBuf>, settings: RunSettings) -> Self {
        Self {
            directory: directory.into(),
            function_pattern: String::new(),
            file_pattern: String::new(),
            settings,
            collect_only: false,
        }
    }

    /// Sets the test name expression.
    pub fn with_function_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.function_pattern = pattern.into();
        self
    }

    /// Sets the file pattern.
    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    /// Sets whether tests are only collected.
    pub fn with_collect_only(mut self, collect_only: bool) -> Self {
        self.collect_only = collect_only;
        self
    }

    /// The settings a single worker running the whole request would use.
    pub fn effective_settings(&self) -> RunSettings {
        self.worker_settings(&self.file_pattern)
    }

    /// The settings for one worker: the request's settings with the name expression and
    /// `file_pattern` appended to the extra test arguments.
    fn worker_settings(&self, file_pattern: &str) -> RunSettings {
        self.settings.clone().push_extra_test_args(
            RunSettings::pattern_filter_args(&self.function_pattern)
                .into_iter()
                .chain(RunSettings::file_filter_args(file_pattern)),
        )
    }
}

/// The state of a [`ParallelRunner`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunnerState {
    /// No request is in progress.
    Idle,
    /// A collect-only request is in progress.
    CollectOnly,
    /// The collection step of a fan-out request is in progress.
    CollectTests,
    /// Tests are running.
    Testing,
    /// The request was stopped and the pool is winding down.
    Stopping,
}

impl RunnerState {
    /// What the runner reports itself as doing in this state.
    pub fn progress_stage(self) -> ProgressStage {
        match self {
            Self::CollectOnly | Self::CollectTests => ProgressStage::CollectingTests,
            Self::Testing => ProgressStage::RunningTests,
            Self::Idle | Self::Stopping => ProgressStage::None,
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::CollectOnly => "collect-only",
            Self::CollectTests => "collecting tests",
            Self::Testing => "testing",
            Self::Stopping => "stopping",
        })
    }
}

/// Where a finished worker's report goes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ResultsRoute {
    /// Surface it as results.
    Report,
    /// Read the collected files from it and fan out.
    StartCollected,
}

#[derive(Clone, Copy, Debug)]
enum WorkerKind {
    Collect,
    Run,
}

/// Runs test requests across a [`ProcessPool`].
///
/// All state is owned by the thread that drives the runner. Worker completion order is
/// determined by the workers themselves, so results arrive in no particular order.
#[derive(Debug)]
pub struct ParallelRunner<'a, S: WorkerSpawner> {
    host: HostRunner,
    pool: ProcessPool<S, ResultsRoute>,
    state: RunnerState,
    i_result: usize,
    n_results: usize,
    request: Option<TestRequest>,
    events: EventEmitter<'a, RunnerEvent>,
}

impl<'a, S: WorkerSpawner> ParallelRunner<'a, S> {
    /// Creates an idle runner that prepares workers with `host` and launches them with `spawner`.
    pub fn new(host: HostRunner, spawner: S) -> Self {
        Self {
            host,
            pool: ProcessPool::new(spawner),
            state: RunnerState::Idle,
            i_result: 0,
            n_results: 0,
            request: None,
            events: EventEmitter::new(),
        }
    }

    /// Adds a listener for this runner's events.
    pub fn subscribe(&mut self, listener: impl FnMut(&RunnerEvent) + 'a) {
        self.events.subscribe(listener);
    }

    /// The current state.
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Returns true if no request is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == RunnerState::Idle
    }

    /// Reports received so far and reports expected, for the current or last request.
    pub fn progress(&self) -> (usize, usize) {
        (self.i_result, self.n_results)
    }

    /// The current or last request.
    pub fn request(&self) -> Option<&TestRequest> {
        self.request.as_ref()
    }

    /// Number of workers waiting to start.
    pub fn n_queued(&self) -> usize {
        self.pool.n_queued()
    }

    /// Number of workers currently running.
    pub fn n_running(&self) -> usize {
        self.pool.n_running()
    }

    /// The single-run orchestrator workers are prepared with.
    pub fn host_runner(&self) -> &HostRunner {
        &self.host
    }

    /// Starts a request. The runner must be idle.
    ///
    /// A collect-only request submits one collecting worker. Otherwise, unless the settings ask
    /// for test files to run independently, one worker runs the whole directory. With independent
    /// files, one worker collects the tests first and the files it finds are fanned out once its
    /// report arrives.
    pub fn start_test(&mut self, request: TestRequest) -> Result<(), StartTestError> {
        if self.state != RunnerState::Idle {
            return Err(StartTestError::Busy { state: self.state });
        }

        self.pool.set_pool_size(request.settings.n_parallel_instances());
        self.i_result = 0;
        self.n_results = 1;
        let collect_only = request.collect_only;
        let independent = request.settings.do_run_test_files_independently();
        debug!(
            "starting request for {} (collect only: {collect_only}, independent files: {independent})",
            request.directory
        );
        self.request = Some(request);

        let submitted = if collect_only {
            self.start_collect(ResultsRoute::Report)
        } else if independent {
            self.start_collect(ResultsRoute::StartCollected)
        } else {
            self.start_testing(None)
        };
        if let Err(error) = submitted {
            self.state = RunnerState::Idle;
            return Err(error.into());
        }

        self.events.emit(&RunnerEvent::ProcessStarted);
        Ok(())
    }

    /// Stops the current request, killing every worker. A `ProcessFinished` event follows on the
    /// next poll.
    pub fn stop_tests(&mut self) {
        debug!("stopping request in state {}", self.state);
        self.state = RunnerState::Stopping;
        self.pool.stop();
    }

    /// Handles the next pool event, if any. Returns true if an event was handled.
    pub fn poll(&mut self) -> bool {
        match self.pool.poll() {
            None => false,
            Some(PoolEvent::ResultsAvailable {
                tag,
                report_path,
                exit,
            }) => {
                debug!("worker for {report_path} finished: {exit}");
                match tag {
                    ResultsRoute::Report => self.on_results_available(report_path),
                    ResultsRoute::StartCollected => self.start_collected(&report_path),
                }
                true
            }
            Some(PoolEvent::Finished) => {
                self.on_pool_finished();
                true
            }
        }
    }

    /// Polls until the runner is idle, yielding to `hook` between polls.
    ///
    /// If the hook breaks, the request is stopped as with [`Self::stop_tests`] and the wait
    /// continues until the workers are gone. Returns true if the hook stopped the request.
    pub fn wait_for_finished(&mut self, hook: &mut impl YieldHook) -> bool {
        let mut stopped = false;
        while !self.is_idle() {
            while self.poll() {}
            if self.is_idle() {
                break;
            }
            if hook.pump(WAIT_POLL_INTERVAL).is_break() && self.state != RunnerState::Stopping {
                self.stop_tests();
                stopped = true;
            }
        }
        stopped
    }

    /// Writes coverage reports for the last request. Returns true if a report was written.
    pub fn write_coverage(&self, reporter: &CoverageReporter) -> bool {
        match &self.request {
            Some(request) => reporter.write_report(&request.directory, &request.settings),
            None => false,
        }
    }

    fn start_collect(&mut self, route: ResultsRoute) -> Result<(), PrepareRunError> {
        self.state = match route {
            ResultsRoute::Report => RunnerState::CollectOnly,
            ResultsRoute::StartCollected => RunnerState::CollectTests,
        };
        self.submit(WorkerKind::Collect, None, route)
    }

    fn start_testing(&mut self, file_pattern: Option<&str>) -> Result<(), PrepareRunError> {
        self.state = RunnerState::Testing;
        self.submit(WorkerKind::Run, file_pattern, ResultsRoute::Report)
    }

    fn submit(
        &mut self,
        kind: WorkerKind,
        file_pattern: Option<&str>,
        route: ResultsRoute,
    ) -> Result<(), PrepareRunError> {
        let Some(request) = &self.request else {
            return Ok(());
        };
        let settings =
            request.worker_settings(file_pattern.unwrap_or(request.file_pattern.as_str()));
        let prepared = match kind {
            WorkerKind::Collect => self.host.prepare_collect(&request.directory, &settings)?,
            WorkerKind::Run => self.host.prepare_run(&request.directory, &settings)?,
        };
        let (args, report_path) = prepared.into_parts();
        self.pool.add_process(args, report_path, route);
        self.report_progress();
        Ok(())
    }

    fn start_collected(&mut self, report_path: &Utf8Path) {
        let collected = Results::from_report_file(report_path);
        let file_paths: Vec<String> = collected
            .file_paths()
            .into_iter()
            .map(str::to_owned)
            .collect();
        if file_paths.is_empty() {
            debug!("no test files collected, nothing to run");
            self.state = RunnerState::Idle;
            self.events.emit(&RunnerEvent::ProcessFinished);
            self.report_progress();
            return;
        }

        debug!("fanning out {} test files", file_paths.len());
        self.n_results = file_paths.len();
        for file_path in &file_paths {
            if let Err(error) = self.start_testing(Some(file_path)) {
                // Count it as done so progress still reaches the total.
                warn!("skipping {file_path}: {error}");
                self.i_result += 1;
                self.report_progress();
            }
        }
    }

    fn on_results_available(&mut self, report_path: Utf8PathBuf) {
        self.i_result += 1;
        self.events.emit(&RunnerEvent::ResultsAvailable(report_path));
        self.report_progress();
    }

    fn on_pool_finished(&mut self) {
        // The collection step of a fan-out isn't the end of the request.
        if !matches!(self.state, RunnerState::Idle | RunnerState::CollectTests) {
            self.state = RunnerState::Idle;
            self.events.emit(&RunnerEvent::ProcessFinished);
        }
    }

    fn report_progress(&mut self) {
        self.events.emit(&RunnerEvent::ProgressUpdate {
            done: self.i_result,
            total: self.n_results,
            stage: self.state.progress_stage(),
        });
    }
}
