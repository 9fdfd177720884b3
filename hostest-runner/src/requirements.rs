// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checks that the tooling workers need is installed.

use crate::{
    errors::RequirementsError,
    python_cli::{PythonCli, output_detail},
};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

/// Makes sure the packages workers import are available before anything is launched.
pub trait EnsureRequirements {
    /// Checks for the required packages, installing missing ones if possible.
    fn ensure(&self) -> Result<(), RequirementsError>;
}

/// A Python module workers import, and the package that provides it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Requirement {
    /// The importable module name.
    pub module: &'static str,
    /// The name to install the module under.
    pub package: &'static str,
}

/// The packages every worker needs.
pub const REQUIREMENTS: [Requirement; 4] = [
    Requirement {
        module: "pytest",
        package: "pytest",
    },
    Requirement {
        module: "pytest_jsonreport",
        package: "pytest-json-report",
    },
    Requirement {
        module: "pytest_html",
        package: "pytest-html",
    },
    Requirement {
        module: "coverage",
        package: "coverage",
    },
];

// Prints the arguments that can't be imported, one per line.
const FIND_MISSING: &str = "import importlib.util, sys\n\
     for m in sys.argv[1:]:\n    \
     if importlib.util.find_spec(m) is None: print(m)";

/// Checks requirements with a Python interpreter and installs missing ones with pip.
#[derive(Clone, Debug)]
pub struct PythonRequirements {
    python: Utf8PathBuf,
}

impl PythonRequirements {
    /// Creates a checker for `python`.
    pub fn new(python: impl Into<Utf8PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    /// The interpreter requirements are checked against.
    pub fn python(&self) -> &Utf8Path {
        &self.python
    }

    /// Returns the requirements that can't currently be imported.
    pub fn missing(&self) -> Result<Vec<Requirement>, RequirementsError> {
        let mut cli = PythonCli::code(&self.python, FIND_MISSING);
        cli.add_args(REQUIREMENTS.iter().map(|req| req.module));
        let output = cli.read().map_err(|error| RequirementsError::Exec {
            command: cli.command_line(),
            error,
        })?;
        if !output.status.success() {
            return Err(RequirementsError::InstallFailed {
                packages: vec![],
                detail: output_detail(&output),
            });
        }
        Ok(parse_missing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn install(&self, missing: &[Requirement]) -> Result<(), RequirementsError> {
        let packages: Vec<_> = missing.iter().map(|req| req.package.to_owned()).collect();
        info!("installing missing packages: {}", packages.join(", "));

        let mut cli = PythonCli::module(&self.python, "pip");
        cli.add_args(["install", "-q"]).add_args(packages.iter().map(String::as_str));
        let output = cli.read().map_err(|error| RequirementsError::Exec {
            command: cli.command_line(),
            error,
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RequirementsError::InstallFailed {
                packages,
                detail: output_detail(&output),
            })
        }
    }
}

impl EnsureRequirements for PythonRequirements {
    fn ensure(&self) -> Result<(), RequirementsError> {
        let missing = self.missing()?;
        if missing.is_empty() {
            debug!("all requirements available in {}", self.python);
            return Ok(());
        }
        self.install(&missing)?;

        // pip can succeed without making the module importable, e.g. with a different target.
        let still_missing = self.missing()?;
        if still_missing.is_empty() {
            Ok(())
        } else {
            Err(RequirementsError::InstallFailed {
                packages: still_missing
                    .iter()
                    .map(|req| req.package.to_owned())
                    .collect(),
                detail: format!("still not importable with {} after installing", self.python),
            })
        }
    }
}

/// Skips the requirements check entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssumeInstalled;

impl EnsureRequirements for AssumeInstalled {
    fn ensure(&self) -> Result<(), RequirementsError> {
        Ok(())
    }
}

fn parse_missing(stdout: &str) -> Vec<Requirement> {
    stdout
        .lines()
        .map(str::trim)
        .filter_map(|module| REQUIREMENTS.iter().find(|req| req.module == module))
        .copied()
        .collect()
}
