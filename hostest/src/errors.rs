// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use hostest_metadata::HostestExitCode;
use hostest_runner::errors::{
    ConfigParseError, JunitExportError, PrepareRunError, RequirementsError, RunError,
    RunSettingsParseError, SettingsStoreError, StartTestError,
};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::{error, warn};

/// An error that hostest expects may happen, with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("no test directory given")]
    NoDirectory,
    #[error("test directory `{path}` not found")]
    DirectoryNotFound {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("settings store error")]
    SettingsStoreError {
        #[from]
        err: SettingsStoreError,
    },
    #[error("unknown setting `{name}`")]
    UnknownSetting { name: String },
    #[error("invalid JSON value for setting `{name}`")]
    SettingValueParseError {
        name: String,
        #[source]
        err: serde_json::Error,
    },
    #[error("invalid value for setting `{name}`")]
    RunSettingsParseError {
        name: String,
        #[source]
        err: RunSettingsParseError,
    },
    #[error("error preparing worker")]
    PrepareRunError {
        #[from]
        err: PrepareRunError,
    },
    #[error("error starting test request")]
    StartTestError {
        #[from]
        err: StartTestError,
    },
    #[error("requirements check failed")]
    RequirementsError {
        #[from]
        err: RequirementsError,
    },
    #[error("error setting up signal handler")]
    SignalHandlerSetupError {
        #[source]
        err: std::io::Error,
    },
    #[error("error writing JUnit report")]
    JunitExportError {
        #[from]
        err: JunitExportError,
    },
    #[error("test run failed")]
    TestRunFailed,
    #[error("test run canceled")]
    TestRunCanceled,
    #[error("no tests to run")]
    NoTestsRun,
}

impl From<RunError> for ExpectedError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Requirements(err) => Self::RequirementsError { err },
            RunError::Prepare(err) => Self::PrepareRunError { err },
        }
    }
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::NoDirectory
            | Self::DirectoryNotFound { .. }
            | Self::ConfigParseError { .. }
            | Self::SettingsStoreError { .. }
            | Self::UnknownSetting { .. }
            | Self::SettingValueParseError { .. }
            | Self::RunSettingsParseError { .. }
            | Self::PrepareRunError { .. }
            | Self::StartTestError { .. }
            | Self::SignalHandlerSetupError { .. } => HostestExitCode::SETUP_ERROR,
            Self::RequirementsError { .. } => HostestExitCode::REQUIREMENTS_FAILED,
            Self::JunitExportError { .. } => HostestExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed => HostestExitCode::TEST_RUN_FAILED,
            Self::TestRunCanceled => HostestExitCode::CANCELED,
            Self::NoTestsRun => HostestExitCode::NO_TESTS_RUN,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::NoDirectory => {
                error!(
                    "no test directory given, and none remembered from a previous run \
                     (pass {})",
                    "DIR".style(styles.bold)
                );
                None
            }
            Self::DirectoryNotFound { path, err } => {
                error!("test directory `{}` not found", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse hostest config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::SettingsStoreError { err } => {
                error!("{err}");
                err.source()
            }
            Self::UnknownSetting { name } => {
                error!("unknown setting `{}`", name.style(styles.bold));
                error!(
                    target: NO_HEADING_TARGET,
                    "(run `hostest settings show` for the list of settings)"
                );
                None
            }
            Self::SettingValueParseError { name, err } => {
                error!(
                    "value for setting `{}` is not valid JSON",
                    name.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::RunSettingsParseError { name, err } => {
                error!("invalid value for setting `{}`", name.style(styles.bold));
                err.source()
            }
            Self::PrepareRunError { err } => {
                error!("{err}");
                err.source()
            }
            Self::StartTestError { err } => {
                error!("{err}");
                err.source()
            }
            Self::RequirementsError { err } => {
                error!("{err}");
                err.source()
            }
            Self::SignalHandlerSetupError { err } => {
                error!("error setting up signal handler");
                Some(err as &dyn Error)
            }
            Self::JunitExportError { err } => {
                error!("{err}");
                err.source()
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
            Self::TestRunCanceled => {
                warn!("test run canceled");
                None
            }
            Self::NoTestsRun => {
                warn!(
                    "{}",
                    "no tests were run (check the directory and patterns)"
                        .style(styles.warning_text)
                );
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ExpectedError::NoDirectory, HostestExitCode::SETUP_ERROR ; "no directory")]
    #[test_case(
        ExpectedError::UnknownSetting { name: "foo".to_owned() },
        HostestExitCode::SETUP_ERROR
        ; "unknown setting"
    )]
    #[test_case(
        ExpectedError::PrepareRunError { err: PrepareRunError::HostNotConfigured },
        HostestExitCode::SETUP_ERROR
        ; "host not configured"
    )]
    #[test_case(
        ExpectedError::RequirementsError {
            err: RequirementsError::InstallFailed {
                packages: vec!["pytest".to_owned()],
                detail: String::new(),
            },
        },
        HostestExitCode::REQUIREMENTS_FAILED
        ; "requirements"
    )]
    #[test_case(ExpectedError::TestRunFailed, HostestExitCode::TEST_RUN_FAILED ; "test run failed")]
    #[test_case(ExpectedError::TestRunCanceled, HostestExitCode::CANCELED ; "canceled")]
    #[test_case(ExpectedError::NoTestsRun, HostestExitCode::NO_TESTS_RUN ; "no tests run")]
    fn exit_codes(error: ExpectedError, expected: i32) {
        assert_eq!(error.process_exit_code(), expected);
    }

    #[test]
    fn run_errors_keep_their_exit_codes() {
        let error = ExpectedError::from(RunError::Prepare(PrepareRunError::HostNotConfigured));
        assert_eq!(error.process_exit_code(), HostestExitCode::SETUP_ERROR);

        let error = ExpectedError::from(RunError::Requirements(RequirementsError::InstallFailed {
            packages: Vec::new(),
            detail: String::new(),
        }));
        assert_eq!(error.process_exit_code(), HostestExitCode::REQUIREMENTS_FAILED);
    }
}
