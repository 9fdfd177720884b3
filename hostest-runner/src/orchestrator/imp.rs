// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    bootstrap,
    engine::{EngineRequest, HostExit, ProcessExit, PythonEngine, TestEngine},
};
use crate::{
    config::HostConfig,
    errors::{PrepareRunError, RequirementsError, RunError},
    requirements::{AssumeInstalled, EnsureRequirements, PythonRequirements},
    results::Results,
    run_settings::RunSettings,
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use chrono::Local;
use debug_ignore::DebugIgnore;
use hostest_metadata::WorkerInvocation;
use std::fs;
use tracing::{debug, warn};

/// How [`HostRunner::run_and_wait_finished`] runs the engine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RunMode {
    /// Launch the host application as a worker process and wait for it.
    #[default]
    Subprocess,

    /// Call the test engine directly from this process. The host is never closed and its window
    /// never minimized.
    InProcess,
}

/// A worker ready to launch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PreparedRun {
    args: Vec<String>,
    report_path: Utf8PathBuf,
}

impl PreparedRun {
    /// The full command line: host executable first.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Where the worker will write its report.
    pub fn report_path(&self) -> &Utf8Path {
        &self.report_path
    }

    /// Splits into the command line and the report path.
    pub fn into_parts(self) -> (Vec<String>, Utf8PathBuf) {
        (self.args, self.report_path)
    }
}

struct RunFiles {
    index: usize,
    script: Utf8PathBuf,
    report: Utf8PathBuf,
    invocation: Utf8PathBuf,
}

/// Prepares and runs single workers.
///
/// Generated files live in a private scratch directory that is removed when the runner is dropped.
/// File names carry a per-runner counter, so repeated calls never collide.
#[derive(Debug)]
pub struct HostRunner {
    host: HostConfig,
    scratch: Utf8TempDir,
    next_index: usize,
    requirements: DebugIgnore<Box<dyn EnsureRequirements>>,
    engine: DebugIgnore<Box<dyn TestEngine>>,
    host_exit: DebugIgnore<Box<dyn HostExit>>,
}

impl HostRunner {
    /// Creates a runner for `host`, checking requirements with and running the engine through
    /// the host's Python interpreter. Requirements aren't checked if the host config disables it.
    pub fn new(host: HostConfig) -> Result<Self, PrepareRunError> {
        let scratch = camino_tempfile::Builder::new()
            .prefix("hostest-")
            .tempdir()
            .map_err(PrepareRunError::TempDir)?;
        debug!("hostest scratch directory: {}", scratch.path());

        let python = host.python().to_owned();
        let requirements: Box<dyn EnsureRequirements> = if host.check_requirements() {
            Box::new(PythonRequirements::new(python.clone()))
        } else {
            debug!("requirements check disabled");
            Box::new(AssumeInstalled)
        };
        Ok(Self {
            host,
            scratch,
            next_index: 0,
            requirements: DebugIgnore(requirements),
            engine: DebugIgnore(Box::new(PythonEngine::new(python))),
            host_exit: DebugIgnore(Box::new(ProcessExit)),
        })
    }

    /// Replaces the requirements check.
    pub fn with_requirements(mut self, requirements: impl EnsureRequirements + 'static) -> Self {
        self.requirements = DebugIgnore(Box::new(requirements));
        self
    }

    /// Replaces the engine used by in-process runs.
    pub fn with_engine(mut self, engine: impl TestEngine + 'static) -> Self {
        self.engine = DebugIgnore(Box::new(engine));
        self
    }

    /// Replaces how the host is terminated after an in-worker run.
    pub fn with_host_exit(mut self, host_exit: impl HostExit + 'static) -> Self {
        self.host_exit = DebugIgnore(Box::new(host_exit));
        self
    }

    /// The host configuration.
    pub fn host(&self) -> &HostConfig {
        &self.host
    }

    /// Checks that the tooling workers need is installed, installing it if possible.
    pub fn ensure_requirements(&self) -> Result<(), RequirementsError> {
        self.requirements.ensure()
    }

    /// The directory generated files are written to.
    pub fn scratch_dir(&self) -> &Utf8Path {
        self.scratch.path()
    }

    /// Builds the command line for a worker that runs the tests in `directory`.
    ///
    /// Writes the worker's bootstrap script and invocation file. The command line is the host
    /// executable, the run-script flag and the script, then the extra host arguments, then the
    /// no-main-window flag if the main window is disabled and the flag isn't already present.
    pub fn prepare_run(
        &mut self,
        directory: &Utf8Path,
        settings: &RunSettings,
    ) -> Result<PreparedRun, PrepareRunError> {
        let executable = self
            .host
            .executable()
            .ok_or(PrepareRunError::HostNotConfigured)?
            .to_owned();
        let files = self.next_files();

        let invocation = WorkerInvocation {
            directory: directory.to_owned(),
            report_path: files.report.clone(),
            engine_args: self.engine_args(
                files.index,
                directory,
                &files.report,
                settings.extra_test_args(),
            ),
            run_settings: settings.as_dict(),
        };
        let invocation_json =
            serde_json::to_string_pretty(&invocation).map_err(PrepareRunError::Serialize)?;
        write_file(&files.invocation, &invocation_json)?;
        write_file(
            &files.script,
            &bootstrap::render_script(&files.invocation, self.host.host_module()),
        )?;
        debug!(
            "prepared worker {} for {directory}: script {}, report {}",
            files.index, files.script, files.report
        );

        let mut args = vec![
            executable.into_string(),
            self.host.run_script_flag().to_owned(),
            files.script.into_string(),
        ];
        args.extend(settings.extra_host_args().iter().cloned());

        let no_main_window = self.host.no_main_window_flag();
        if !settings.do_use_main_window() && !args.iter().any(|arg| arg == no_main_window) {
            args.push(no_main_window.to_owned());
        }

        Ok(PreparedRun {
            args,
            report_path: files.report,
        })
    }

    /// Builds the command line for a worker that only collects the tests in `directory`.
    ///
    /// Only the extra host and test arguments of `settings` are used. The main window is always
    /// disabled and the collect-only flag precedes the extra test arguments.
    pub fn prepare_collect(
        &mut self,
        directory: &Utf8Path,
        settings: &RunSettings,
    ) -> Result<PreparedRun, PrepareRunError> {
        let collect_settings = RunSettings::default()
            .with_use_main_window(false)
            .with_extra_host_args(settings.extra_host_args().iter().cloned())
            .with_extra_test_args(
                std::iter::once("--collect-only".to_owned())
                    .chain(settings.extra_test_args().iter().cloned()),
            );
        self.prepare_run(directory, &collect_settings)
    }

    /// Runs the tests in `directory` to completion and returns their results.
    ///
    /// Requirements are checked first. A worker that fails to launch, crashes or exits with a
    /// non-zero code is not an error: its report is parsed regardless, and a missing report
    /// yields empty results.
    pub fn run_and_wait_finished(
        &mut self,
        directory: &Utf8Path,
        settings: &RunSettings,
        mode: RunMode,
    ) -> Result<Results, RunError> {
        self.requirements.ensure()?;

        match mode {
            RunMode::Subprocess => {
                let prepared = self.prepare_run(directory, settings)?;
                Ok(run_prepared(&prepared))
            }
            RunMode::InProcess => {
                let settings = settings
                    .clone()
                    .with_close_host_after_run(false)
                    .with_minimize_main_window(false);
                let report_path = self.next_files().report;
                self.run_engine_and_exit(directory, &report_path, &settings);
                Ok(Results::from_report_file(&report_path))
            }
        }
    }

    /// Collects the tests in `directory` in a worker process and returns the collected cases.
    pub fn collect_and_wait_finished(
        &mut self,
        directory: &Utf8Path,
        settings: &RunSettings,
    ) -> Result<Results, RunError> {
        self.requirements.ensure()?;
        let prepared = self.prepare_collect(directory, settings)?;
        Ok(run_prepared(&prepared))
    }

    /// Runs the test engine over `target`, writing its report to `report_path`.
    ///
    /// The engine runs under coverage if the settings ask for it. An engine that can't be run
    /// counts as exit code 1. The host is terminated with the exit code only if the settings ask
    /// for it; otherwise the code is returned.
    pub fn run_engine_and_exit(
        &mut self,
        target: &Utf8Path,
        report_path: &Utf8Path,
        settings: &RunSettings,
    ) -> i32 {
        let index = self.next_index();
        let args = self.engine_args(index, target, report_path, settings.extra_test_args());
        let request = EngineRequest {
            target,
            report_path,
            args: &args,
            coverage: settings
                .do_run_coverage()
                .then(|| settings.coverage_sources()),
        };

        let code = match self.engine.run(&request) {
            Ok(code) => code,
            Err(error) => {
                warn!("error running the test engine in {target}: {error}");
                1
            }
        };
        debug!("test engine in {target} exited with code {code}");

        if settings.do_close_host_after_run() {
            self.host_exit.exit(code);
        }
        code
    }

    fn engine_args(
        &self,
        index: usize,
        target: &Utf8Path,
        report_path: &Utf8Path,
        extra: &[String],
    ) -> Vec<String> {
        let now = Local::now();
        let suffix = format!(
            "{}.{index}.{}",
            std::process::id(),
            now.timestamp_subsec_nanos()
        );
        bootstrap::engine_args(target, report_path, extra, now, &suffix)
    }

    fn next_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn next_files(&mut self) -> RunFiles {
        let index = self.next_index();
        let dir = self.scratch.path();
        RunFiles {
            index,
            script: dir.join(format!("hostest_run_{index}.py")),
            report: dir.join(format!("hostest_report_{index}.json")),
            invocation: dir.join(format!("hostest_invocation_{index}.json")),
        }
    }
}

fn write_file(path: &Utf8Path, contents: &str) -> Result<(), PrepareRunError> {
    fs::write(path, contents).map_err(|error| PrepareRunError::Write {
        path: path.to_owned(),
        error,
    })
}

fn run_prepared(prepared: &PreparedRun) -> Results {
    // The command line always starts with the host executable.
    if let Some((program, args)) = prepared.args.split_first() {
        debug!("running worker: {}", shell_words::join(&prepared.args));
        match duct::cmd(program, args).stdin_null().unchecked().run() {
            Ok(output) => debug!("worker exited with {}", output.status),
            Err(error) => warn!("failed to launch worker `{program}`: {error}"),
        }
    }
    Results::from_report_file(&prepared.report_path)
}
