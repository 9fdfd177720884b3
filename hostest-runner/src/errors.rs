// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by hostest.
//!
//! Test failures and unreadable reports are never errors: they surface as counts on
//! [`Results`](crate::results::Results). The errors here cover setup problems that prevent a run
//! from starting at all.

use camino::{FromPathBufError, Utf8PathBuf};
use config::ConfigError;
use std::io;
use thiserror::Error;

/// An error that occurred while parsing the hostest config.
#[derive(Debug, Error)]
#[error("failed to parse hostest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// Error returned while parsing a
/// [`ParallelInstances`](crate::config::ParallelInstances) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for parallel instances: {input}")]
pub struct ParallelInstancesParseError {
    input: String,
}

impl ParallelInstancesParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Error returned while parsing serialized [`RunSettings`](crate::run_settings::RunSettings).
#[derive(Debug, Error)]
#[error("invalid run settings")]
pub struct RunSettingsParseError {
    #[source]
    err: serde_json::Error,
}

impl RunSettingsParseError {
    pub(crate) fn new(err: serde_json::Error) -> Self {
        Self { err }
    }
}

/// Error returned while reading or writing a run settings file.
#[derive(Debug, Error)]
pub enum RunSettingsFileError {
    /// The file couldn't be read.
    #[error("error reading run settings from `{path}`")]
    Read {
        /// The file being read.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The file was read, but its contents are invalid.
    #[error("error parsing run settings at `{path}`")]
    Parse {
        /// The file being read.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: RunSettingsParseError,
    },

    /// The file couldn't be written.
    #[error("error writing run settings to `{path}`")]
    Write {
        /// The file being written.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while preparing the files a worker needs.
#[derive(Debug, Error)]
pub enum PrepareRunError {
    /// The orchestrator's scratch directory couldn't be created.
    #[error("error creating scratch directory")]
    TempDir(#[source] io::Error),

    /// No host executable is configured.
    #[error(
        "no host executable configured (set `host.executable` in {} or HOSTEST_HOST__EXECUTABLE)",
        crate::config::HostestConfig::CONFIG_PATH
    )]
    HostNotConfigured,

    /// A generated file couldn't be written.
    #[error("error writing `{path}`")]
    Write {
        /// The file being written.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The worker invocation couldn't be serialized.
    #[error("error serializing worker invocation")]
    Serialize(#[source] serde_json::Error),
}

/// An error returned by [`ParallelRunner::start_test`](crate::coordinator::ParallelRunner::start_test).
#[derive(Debug, Error)]
pub enum StartTestError {
    /// A request is already in progress.
    #[error("a test request is already running (state: {state})")]
    Busy {
        /// The runner's state when the request was made.
        state: crate::coordinator::RunnerState,
    },

    /// The first worker couldn't be prepared.
    #[error("error preparing worker")]
    Prepare(#[from] PrepareRunError),
}

/// The tooling needed by workers is missing and couldn't be installed.
#[derive(Debug, Error)]
pub enum RequirementsError {
    /// The interpreter used to check or install requirements couldn't be run.
    #[error("error running `{command}`")]
    Exec {
        /// The command line that was run.
        command: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Installing missing packages failed.
    #[error("failed to install {}:\n{detail}", .packages.join(", "))]
    InstallFailed {
        /// The packages that were being installed.
        packages: Vec<String>,
        /// The installer's output.
        detail: String,
    },
}

/// An error that prevented a single run from producing results.
#[derive(Debug, Error)]
pub enum RunError {
    /// Requirements couldn't be satisfied.
    #[error("requirements check failed")]
    Requirements(#[from] RequirementsError),

    /// The worker couldn't be prepared.
    #[error("error preparing worker")]
    Prepare(#[from] PrepareRunError),
}

/// An error that occurred while reading or writing persisted preferences.
#[derive(Debug, Error)]
pub enum SettingsStoreError {
    /// The home directory couldn't be determined.
    #[error("could not determine home directory for the settings file")]
    HomeDir,

    /// The settings path isn't valid UTF-8.
    #[error("settings path is not valid UTF-8")]
    NonUtf8Path(#[source] FromPathBufError),

    /// The settings file couldn't be read.
    #[error("error reading settings from `{path}`")]
    Read {
        /// The file being read.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The settings file isn't valid TOML.
    #[error("error parsing settings at `{path}`")]
    Parse {
        /// The file being read.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: toml::de::Error,
    },

    /// The settings couldn't be serialized.
    #[error("error serializing settings")]
    Serialize(#[source] toml::ser::Error),

    /// The settings file couldn't be written.
    #[error("error writing settings to `{path}`")]
    Write {
        /// The file being written.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },

    /// The settings file's directory couldn't be created.
    #[error("error creating directory `{path}`")]
    CreateDir {
        /// The directory being created.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while writing a JUnit report.
#[derive(Debug, Error)]
pub enum JunitExportError {
    /// The report's directory couldn't be created.
    #[error("error creating directory `{path}`")]
    CreateDir {
        /// The directory being created.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The report couldn't be written.
    #[error("error writing JUnit report to `{path}`")]
    Write {
        /// The file being written.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: atomicwrites::Error<quick_junit::SerializeError>,
    },
}

/// An error that occurred while running the coverage tool.
#[derive(Debug, Error)]
pub enum CoverageReportError {
    /// The coverage tool couldn't be run.
    #[error("error running `{command}`")]
    Exec {
        /// The command line that was run.
        command: String,
        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The coverage tool ran but failed.
    #[error("`{command}` exited with {status}:\n{stderr}")]
    Failed {
        /// The command line that was run.
        command: String,
        /// The exit status, formatted.
        status: String,
        /// The tool's standard error.
        stderr: String,
    },
}
