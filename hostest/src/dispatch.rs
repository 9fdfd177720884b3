// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    output::{OutputContext, OutputOpts},
    reporter::ResultsReporter,
    signal::SignalWaiter,
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use hostest_metadata::HostestExitCode;
use hostest_runner::{
    config::{HostestConfig, ParallelInstances},
    coordinator::{ParallelRunner, TestRequest},
    coverage::CoverageReporter,
    events::RunnerEvent,
    export::write_junit,
    orchestrator::{HostRunner, RunMode},
    pool::CommandSpawner,
    results::Results,
    run_settings::{CoverageFormat, RunSettings},
    settings_store::{FileSettingsStore, ModuleSettings, SettingsStore},
};
use std::{cell::RefCell, io::Write};
use tracing::{debug, info, warn};

type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Parses the command line, runs it and exits the process with the resulting code.
pub fn main_impl() -> color_eyre::Result<()> {
    let opts = HostestApp::parse();
    let output = opts.init_output();

    match opts.exec(output) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code())
        }
    }
}

/// Runs test suites inside isolated instances of a host application.
#[derive(Debug, Parser)]
#[command(
    version,
    name = "hostest",
    styles = crate::output::clap_styles::style(),
)]
pub struct HostestApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    settings_opts: SettingsOpts,

    #[command(subcommand)]
    command: Command,
}

impl HostestApp {
    /// Initializes logging and color output.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let mut settings = self.settings_opts.open()?;
        match self.command {
            Command::Run {
                select,
                config_opts,
                host_opts,
                runner_opts,
                coverage_opts,
                junit,
            } => {
                let app = App::new(&mut settings, select, &config_opts, &host_opts)?;
                let run_settings = app.run_settings(&host_opts, &runner_opts, &coverage_opts);
                app.exec_run(
                    run_settings,
                    runner_opts.run_mode(),
                    junit.as_deref(),
                    output,
                )
            }
            Command::Collect {
                select,
                config_opts,
                host_opts,
            } => {
                let app = App::new(&mut settings, select, &config_opts, &host_opts)?;
                let run_settings = host_opts.apply(app.base_settings());
                app.exec_collect(run_settings, output)
            }
            Command::Settings { command } => command.exec(&mut settings),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run tests
    ///
    /// One host instance runs every test in the directory, or with --independent one instance
    /// runs each test file, several at a time.
    Run {
        #[clap(flatten)]
        select: SelectOpts,

        #[clap(flatten)]
        config_opts: ConfigOpts,

        #[clap(flatten)]
        host_opts: HostOpts,

        #[clap(flatten)]
        runner_opts: RunnerOpts,

        #[clap(flatten)]
        coverage_opts: CoverageOpts,

        /// Write a JUnit XML report to this path
        #[arg(long, value_name = "PATH", help_heading = "REPORTER OPTIONS")]
        junit: Option<Utf8PathBuf>,
    },

    /// Collect tests without running them, and print the collected tree
    Collect {
        #[clap(flatten)]
        select: SelectOpts,

        #[clap(flatten)]
        config_opts: ConfigOpts,

        #[clap(flatten)]
        host_opts: HostOpts,
    },

    /// Show or change the settings remembered between runs
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Debug, Args)]
struct SettingsOpts {
    /// Settings file [default: $XDG_CONFIG_HOME/hostest/settings.toml]
    #[arg(long, global = true, value_name = "PATH", env = "HOSTEST_SETTINGS_FILE")]
    settings_file: Option<Utf8PathBuf>,
}

impl SettingsOpts {
    fn open(&self) -> Result<ModuleSettings<FileSettingsStore>> {
        let path = match &self.settings_file {
            Some(path) => path.clone(),
            None => FileSettingsStore::default_path()?,
        };
        debug!("using settings file {path}");
        Ok(ModuleSettings::new(FileSettingsStore::open(path)?))
    }
}

#[derive(Debug, Args)]
#[clap(next_help_heading = "FILTER OPTIONS")]
struct SelectOpts {
    /// Directory to test [default: the last tested directory]
    #[arg(value_name = "DIR", help_heading = None)]
    dir: Option<Utf8PathBuf>,

    /// Only run test files matching this pattern [default: the last pattern]
    #[arg(long, short = 'E', value_name = "PATTERN")]
    file_pattern: Option<String>,

    /// Only run tests whose names match this expression [default: the last expression]
    #[arg(long, short = 'k', value_name = "EXPR")]
    function_pattern: Option<String>,
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: DIR/.config/hostest.toml]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, directory: &Utf8Path) -> Result<HostestConfig> {
        Ok(HostestConfig::from_sources(
            directory,
            self.config_file.as_deref(),
        )?)
    }
}

#[derive(Debug, Args)]
#[clap(next_help_heading = "HOST OPTIONS")]
struct HostOpts {
    /// Host application to launch [default: host.executable from the config]
    #[arg(long, value_name = "PATH", env = "HOSTEST_HOST")]
    host: Option<Utf8PathBuf>,

    /// Extra argument passed to the host application (repeatable)
    #[arg(long = "host-arg", value_name = "ARG", allow_hyphen_values = true)]
    host_args: Vec<String>,
}

impl HostOpts {
    fn apply(&self, settings: RunSettings) -> RunSettings {
        if self.host_args.is_empty() {
            settings
        } else {
            settings.with_extra_host_args(self.host_args.iter().cloned())
        }
    }
}

#[derive(Debug, Args)]
#[clap(next_help_heading = "RUNNER OPTIONS")]
struct RunnerOpts {
    /// Number of host instances to run at once: a count, a negative count subtracted from the
    /// number of CPUs, or "num-cpus"
    #[arg(long, short = 'j', value_name = "N", allow_hyphen_values = true)]
    parallel_instances: Option<ParallelInstances>,

    /// Run each test file in its own host instance
    #[arg(long)]
    independent: bool,

    /// Run the test engine in this process instead of launching the host
    #[arg(long, conflicts_with = "independent")]
    in_process: bool,

    /// Extra argument passed to the test engine (repeatable)
    #[arg(long = "test-arg", value_name = "ARG", allow_hyphen_values = true)]
    test_args: Vec<String>,

    /// Show the host's main window and leave it un-minimized
    #[arg(long, conflicts_with = "no_window")]
    show_window: bool,

    /// Start the host without its main window
    #[arg(long)]
    no_window: bool,

    /// Leave the host open once its tests are done
    #[arg(long)]
    keep_open: bool,
}

impl RunnerOpts {
    fn run_mode(&self) -> RunMode {
        if self.in_process {
            RunMode::InProcess
        } else {
            RunMode::Subprocess
        }
    }

    fn apply(&self, mut settings: RunSettings) -> RunSettings {
        if let Some(instances) = self.parallel_instances {
            settings = settings.with_parallel_instances(instances.compute());
        }
        if self.independent {
            settings = settings.with_run_test_files_independently(true);
        }
        if !self.test_args.is_empty() {
            settings = settings.with_extra_test_args(self.test_args.iter().cloned());
        }
        if self.show_window {
            settings = settings
                .with_use_main_window(true)
                .with_minimize_main_window(false);
        }
        if self.no_window {
            settings = settings.with_use_main_window(false);
        }
        if self.keep_open {
            settings = settings.with_close_host_after_run(false);
        }
        settings
    }
}

#[derive(Debug, Args)]
#[clap(next_help_heading = "COVERAGE OPTIONS")]
struct CoverageOpts {
    /// Measure coverage and write coverage reports once tests are done
    #[arg(long)]
    coverage: bool,

    /// Coverage report format: json, xml, lcov or html (repeatable)
    #[arg(long, value_name = "FORMAT")]
    coverage_format: Vec<CoverageFormat>,

    /// Restrict coverage to this source path or package (repeatable)
    #[arg(long, value_name = "SOURCE")]
    coverage_source: Vec<String>,

    /// Where coverage reports are written [default: the coverage tool's default]
    #[arg(long, value_name = "PATH")]
    coverage_file: Option<Utf8PathBuf>,
}

impl CoverageOpts {
    fn apply(&self, mut settings: RunSettings) -> RunSettings {
        if self.coverage {
            settings = settings.with_coverage(true);
        }
        if !self.coverage_format.is_empty() {
            settings = settings.with_coverage_report_formats(self.coverage_format.iter().copied());
        }
        if !self.coverage_source.is_empty() {
            settings = settings.with_coverage_sources(Some(self.coverage_source.iter()));
        }
        if let Some(path) = &self.coverage_file {
            settings = settings.with_coverage_file_path(Some(path.clone()));
        }
        settings
    }
}

/// A run or collect command with its directory, patterns and config resolved.
struct App<'s> {
    settings: &'s mut ModuleSettings<FileSettingsStore>,
    directory: Utf8PathBuf,
    file_pattern: String,
    function_pattern: String,
    config: HostestConfig,
}

impl<'s> App<'s> {
    fn new(
        settings: &'s mut ModuleSettings<FileSettingsStore>,
        select: SelectOpts,
        config_opts: &ConfigOpts,
        host_opts: &HostOpts,
    ) -> Result<Self> {
        let directory = match select.dir {
            Some(dir) => dir,
            None => settings.last_path(),
        };
        if directory.as_str().is_empty() {
            return Err(ExpectedError::NoDirectory);
        }
        let directory = directory
            .canonicalize_utf8()
            .map_err(|err| ExpectedError::DirectoryNotFound {
                path: directory.clone(),
                err,
            })?;

        let file_pattern = select
            .file_pattern
            .unwrap_or_else(|| settings.last_file_pattern());
        let function_pattern = select
            .function_pattern
            .unwrap_or_else(|| settings.last_function_pattern());

        let mut config = config_opts.make_config(&directory)?;
        if let Some(host) = &host_opts.host {
            config.host_mut().set_executable(host.clone());
        }

        Ok(Self {
            settings,
            directory,
            file_pattern,
            function_pattern,
            config,
        })
    }

    /// The stored run settings, or the defaults with the configured parallelism if none were
    /// ever stored.
    fn base_settings(&self) -> RunSettings {
        if self.settings.has_last_run_settings() {
            self.settings.last_run_settings()
        } else {
            RunSettings::default()
                .with_parallel_instances(self.config.run().parallel_instances().compute())
        }
    }

    fn run_settings(
        &self,
        host_opts: &HostOpts,
        runner_opts: &RunnerOpts,
        coverage_opts: &CoverageOpts,
    ) -> RunSettings {
        let settings = host_opts.apply(self.base_settings());
        coverage_opts.apply(runner_opts.apply(settings))
    }

    fn remember(&mut self, run_settings: Option<&RunSettings>) -> Result<()> {
        self.settings.set_last_path(&self.directory)?;
        self.settings.set_last_file_pattern(&self.file_pattern)?;
        self.settings
            .set_last_function_pattern(&self.function_pattern)?;
        if let Some(run_settings) = run_settings {
            self.settings.set_last_run_settings(run_settings)?;
        }
        Ok(())
    }

    fn request(&self, run_settings: RunSettings) -> TestRequest {
        TestRequest::new(self.directory.clone(), run_settings)
            .with_file_pattern(self.file_pattern.clone())
            .with_function_pattern(self.function_pattern.clone())
    }

    fn reporter(&self, output: OutputContext) -> ResultsReporter {
        let mut reporter = ResultsReporter::new(self.settings.case_filter());
        if output.colorize_stdout() {
            reporter.colorize();
        }
        reporter
    }

    fn exec_run(
        mut self,
        run_settings: RunSettings,
        mode: RunMode,
        junit: Option<&Utf8Path>,
        output: OutputContext,
    ) -> Result<i32> {
        self.remember(Some(&run_settings))?;
        let request = self.request(run_settings);
        let coverage = request
            .settings
            .do_run_coverage()
            .then(|| CoverageReporter::new(self.config.host().python()));
        let mut host = HostRunner::new(self.config.host().clone())?;

        let finished = match mode {
            RunMode::Subprocess => {
                host.ensure_requirements()?;
                drive_request(host, request, coverage.as_ref())?
            }
            RunMode::InProcess => {
                let settings = request.effective_settings();
                info!("running tests in {} in-process", request.directory);
                let results = host.run_and_wait_finished(&request.directory, &settings, mode)?;
                if let Some(coverage) = &coverage {
                    coverage.write_report(&request.directory, &settings);
                }
                FinishedRequest {
                    results,
                    canceled: false,
                }
            }
        };

        let results = finished.results;
        if let Err(err) = self
            .reporter(output)
            .write_results(&results, std::io::stdout().lock())
        {
            warn!("error writing results to stdout: {err}");
        }

        if let Some(path) = junit {
            write_junit(&results, path)?;
            info!("JUnit report written to {path}");
        }

        if finished.canceled {
            Err(ExpectedError::TestRunCanceled)
        } else if results.failures_number() > 0 {
            Err(ExpectedError::TestRunFailed)
        } else if results.executed_number() == 0 {
            Err(ExpectedError::NoTestsRun)
        } else {
            Ok(HostestExitCode::OK)
        }
    }

    fn exec_collect(mut self, run_settings: RunSettings, output: OutputContext) -> Result<i32> {
        self.remember(None)?;
        let request = self.request(run_settings).with_collect_only(true);
        let host = HostRunner::new(self.config.host().clone())?;
        host.ensure_requirements()?;

        let finished = drive_request(host, request, None)?;
        let results = finished.results;
        if let Err(err) = self
            .reporter(output)
            .write_collected(&results, std::io::stdout().lock())
        {
            warn!("error writing collected tests to stdout: {err}");
        }

        if finished.canceled {
            Err(ExpectedError::TestRunCanceled)
        } else if results.is_empty() {
            Err(ExpectedError::NoTestsRun)
        } else {
            Ok(HostestExitCode::OK)
        }
    }
}

struct FinishedRequest {
    results: Results,
    canceled: bool,
}

/// Runs `request` through a [`ParallelRunner`] until it finishes, stopping every worker if a
/// shutdown signal arrives.
fn drive_request(
    host: HostRunner,
    request: TestRequest,
    coverage: Option<&CoverageReporter>,
) -> Result<FinishedRequest> {
    let mut waiter = match SignalWaiter::new() {
        Ok(waiter) => waiter,
        Err(err) => {
            warn!("unable to listen for Ctrl-C, continuing without it: {err}");
            SignalWaiter::noop().map_err(|err| ExpectedError::SignalHandlerSetupError { err })?
        }
    };

    let aggregate = RefCell::new(Results::new(request.directory.as_str()));
    let canceled = {
        let mut runner = ParallelRunner::new(host, CommandSpawner::new());
        runner.subscribe(|event| match event {
            RunnerEvent::ProcessStarted => debug!("request started"),
            RunnerEvent::ProcessFinished => debug!("request finished"),
            RunnerEvent::ResultsAvailable(path) => {
                let results = Results::from_report_file(path);
                debug!("results from {path}: {}", results.summary_string());
                aggregate.borrow_mut().extend(results);
            }
            RunnerEvent::ProgressUpdate { done, total, stage } => {
                info!("{stage}: {done}/{total}");
            }
        });
        runner.start_test(request)?;
        let canceled = runner.wait_for_finished(&mut waiter);

        if let Some(coverage) = coverage {
            if runner.write_coverage(coverage) {
                info!("coverage reports written");
            }
        }
        canceled
    };

    Ok(FinishedRequest {
        results: aggregate.into_inner(),
        canceled,
    })
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Print every remembered setting
    Show,

    /// Change one setting
    ///
    /// FIELD is either a remembered setting (such as lastPath) or a field of the remembered run
    /// settings (such as nParallelInstances). VALUE is JSON: strings must be quoted.
    Set {
        /// The setting or run settings field to change
        #[arg(value_name = "FIELD")]
        field: String,

        /// The new value, as JSON
        #[arg(value_name = "VALUE", allow_hyphen_values = true)]
        value: String,
    },

    /// Forget every remembered setting
    Reset,
}

impl SettingsCommand {
    fn exec<S: SettingsStore>(self, settings: &mut ModuleSettings<S>) -> Result<i32> {
        match self {
            Self::Show => {
                let mut stdout = std::io::stdout().lock();
                if let Err(err) = write_settings(settings, &mut stdout) {
                    warn!("error writing settings to stdout: {err}");
                }
            }
            Self::Set { field, value } => set_setting(settings, &field, &value)?,
            Self::Reset => {
                settings.store_mut().clear()?;
                info!("settings reset");
            }
        }
        Ok(HostestExitCode::OK)
    }
}

/// The key under which run settings are stored.
const LAST_RUN_SETTINGS: &str = "lastRunSettings";

fn write_settings<S: SettingsStore>(
    settings: &ModuleSettings<S>,
    mut writer: impl Write,
) -> std::io::Result<()> {
    for (key, value) in settings.entries() {
        if key == LAST_RUN_SETTINGS {
            continue;
        }
        match value {
            Some(value) => writeln!(writer, "{key} = {value}")?,
            None => writeln!(writer, "{key} = <unset>")?,
        }
    }

    let run_settings = settings.last_run_settings().as_dict();
    if let Some(fields) = run_settings.as_object() {
        for (field, value) in fields {
            writeln!(writer, "{LAST_RUN_SETTINGS}.{field} = {value}")?;
        }
    }
    Ok(())
}

fn set_setting<S: SettingsStore>(
    settings: &mut ModuleSettings<S>,
    field: &str,
    value: &str,
) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(value).map_err(|err| ExpectedError::SettingValueParseError {
            name: field.to_owned(),
            err,
        })?;

    let mut run_settings = settings.last_run_settings().as_dict();
    if let Some(slot) = run_settings
        .as_object_mut()
        .and_then(|fields| fields.get_mut(field))
    {
        *slot = value;
        let updated = RunSettings::from_value(run_settings).map_err(|err| {
            ExpectedError::RunSettingsParseError {
                name: field.to_owned(),
                err,
            }
        })?;
        settings.set_last_run_settings(&updated)?;
        return Ok(());
    }

    if field == LAST_RUN_SETTINGS {
        let updated = RunSettings::from_value(value).map_err(|err| {
            ExpectedError::RunSettingsParseError {
                name: field.to_owned(),
                err,
            }
        })?;
        settings.set_last_run_settings(&updated)?;
        return Ok(());
    }

    if !ModuleSettings::<S>::KEYS.iter().any(|key| *key == field) {
        return Err(ExpectedError::UnknownSetting {
            name: field.to_owned(),
        });
    }
    let stored = match value {
        serde_json::Value::String(value) => value,
        other => other.to_string(),
    };
    settings.store_mut().set(field, stored)?;
    Ok(())
}
