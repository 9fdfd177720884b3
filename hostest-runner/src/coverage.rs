// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns the coverage data left behind by workers into reports.
//!
//! Workers running under coverage each write a `.coverage.<suffix>` fragment into the test
//! directory. [`CoverageReporter::write_report`] combines them, writes one report per resolved
//! format, and deletes the fragments.

use crate::{
    errors::CoverageReportError,
    python_cli::{PythonCli, output_detail},
    run_settings::{CoverageFormat, RunSettings},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{collections::BTreeSet, fs};
use tracing::{debug, warn};

/// Local coverage config files, in the order the coverage tool looks for them.
pub const COVERAGE_CONFIG_FILES: [&str; 4] = [".coveragerc", "setup.cfg", "tox.ini", "pyproject.toml"];

const FRAGMENT_PREFIX: &str = ".coverage.";

/// Writes coverage reports using the coverage tool of a Python interpreter.
#[derive(Clone, Debug)]
pub struct CoverageReporter {
    python: Utf8PathBuf,
}

impl CoverageReporter {
    /// Creates a reporter that runs `python -m coverage`.
    pub fn new(python: impl Into<Utf8PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    /// Writes the coverage reports for a run over `directory`.
    ///
    /// Does nothing unless `settings` enables coverage and `directory` exists. Tool failures are
    /// logged and reported by returning false.
    pub fn write_report(&self, directory: &Utf8Path, settings: &RunSettings) -> bool {
        if !settings.do_run_coverage() || !directory.is_dir() {
            return false;
        }

        let formats = resolve_formats(directory, settings);
        match self.combine_and_report(directory, settings.coverage_file_path(), &formats) {
            Ok(()) => {
                remove_fragments(directory);
                true
            }
            Err(error) => {
                warn!("failed to write coverage report: {error}");
                false
            }
        }
    }

    fn combine_and_report(
        &self,
        directory: &Utf8Path,
        output: Option<&Utf8Path>,
        formats: &BTreeSet<CoverageFormat>,
    ) -> Result<(), CoverageReportError> {
        self.run(directory, &["combine"])?;
        for format in formats {
            let mut args = vec![format.name()];
            if let Some(output) = output {
                args.push(if format.is_directory() { "-d" } else { "-o" });
                args.push(output.as_str());
            }
            self.run(directory, &args)?;
            debug!("wrote {format} coverage report");
        }
        Ok(())
    }

    fn run(&self, directory: &Utf8Path, args: &[&str]) -> Result<(), CoverageReportError> {
        let mut cli = PythonCli::module(&self.python, "coverage");
        cli.add_args(args.iter().copied()).current_dir(directory);
        let output = cli.read().map_err(|error| CoverageReportError::Exec {
            command: cli.command_line(),
            error,
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(CoverageReportError::Failed {
                command: cli.command_line(),
                status: output.status.to_string(),
                stderr: output_detail(&output),
            })
        }
    }
}

/// The formats to write: those requested in `settings` plus those configured locally.
pub fn resolve_formats(directory: &Utf8Path, settings: &RunSettings) -> BTreeSet<CoverageFormat> {
    let mut formats = settings.coverage_report_formats().clone();
    formats.extend(configured_formats(directory));
    formats
}

/// The formats referenced by the first local coverage config file in `directory`.
///
/// A format counts as referenced if the file contains its name followed by `]`, which matches
/// the `[html]`, `[coverage:html]` and `[tool.coverage.html]` section styles.
pub fn configured_formats(directory: &Utf8Path) -> BTreeSet<CoverageFormat> {
    let Some(config) = COVERAGE_CONFIG_FILES
        .iter()
        .map(|name| directory.join(name))
        .find(|path| path.is_file())
    else {
        return BTreeSet::new();
    };

    match fs::read_to_string(&config) {
        Ok(contents) => CoverageFormat::ALL
            .into_iter()
            .filter(|format| contents.contains(&format!("{}]", format.name())))
            .collect(),
        Err(error) => {
            debug!("error reading coverage config {config}: {error}");
            BTreeSet::new()
        }
    }
}

/// Deletes the per-worker `.coverage.*` data fragments in `directory`.
pub fn remove_fragments(directory: &Utf8Path) {
    let entries = match directory.read_dir_utf8() {
        Ok(entries) => entries,
        Err(error) => {
            warn!("error listing {directory} for coverage fragments: {error}");
            return;
        }
    };
    for entry in entries.flatten() {
        if entry.file_name().starts_with(FRAGMENT_PREFIX) && entry.path().is_file() {
            if let Err(error) = fs::remove_file(entry.path()) {
                warn!("error removing coverage fragment {}: {error}", entry.path());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn formats(names: &[&str]) -> BTreeSet<CoverageFormat> {
        names
            .iter()
            .map(|name| name.parse().expect("valid format"))
            .collect()
    }

    #[test]
    fn formats_from_coveragerc() {
        let dir = tempdir().expect("created temp dir");
        fs::write(
            dir.path().join(".coveragerc"),
            indoc! {"
                [run]
                branch = True

                [html]
                directory = htmlcov

                [xml]
                output = coverage.xml
            "},
        )
        .expect("wrote .coveragerc");
        assert_eq!(configured_formats(dir.path()), formats(&["xml", "html"]));
    }

    #[test]
    fn first_config_file_wins() {
        let dir = tempdir().expect("created temp dir");
        fs::write(dir.path().join("tox.ini"), "[coverage:json]\n").expect("wrote tox.ini");
        fs::write(dir.path().join("pyproject.toml"), "[tool.coverage.lcov]\n")
            .expect("wrote pyproject.toml");
        assert_eq!(configured_formats(dir.path()), formats(&["json"]));
    }

    #[test]
    fn no_config_file() {
        let dir = tempdir().expect("created temp dir");
        assert!(configured_formats(dir.path()).is_empty());
    }

    #[test]
    fn resolved_formats_are_a_union() {
        let dir = tempdir().expect("created temp dir");
        fs::write(dir.path().join("pyproject.toml"), "[tool.coverage.html]\n")
            .expect("wrote pyproject.toml");
        let settings = RunSettings::default()
            .with_coverage_report_formats([CoverageFormat::Json, CoverageFormat::Html]);
        assert_eq!(
            resolve_formats(dir.path(), &settings),
            formats(&["json", "html"])
        );
    }

    #[test]
    fn write_report_requires_coverage_and_directory() {
        let dir = tempdir().expect("created temp dir");
        let reporter = CoverageReporter::new("hostest-no-such-python");

        assert!(!reporter.write_report(dir.path(), &RunSettings::default()));
        assert!(!reporter.write_report(
            &dir.path().join("missing"),
            &RunSettings::default().with_coverage(true)
        ));
        // The interpreter is missing, so the attempt fails without raising.
        assert!(!reporter.write_report(dir.path(), &RunSettings::default().with_coverage(true)));
    }

    #[test]
    fn removes_only_fragments() {
        let dir = tempdir().expect("created temp dir");
        for name in [".coverage.host.123.X1x", ".coverage.host.456.X2x", ".coverage", ".coveragerc"] {
            fs::write(dir.path().join(name), "").expect("wrote fragment");
        }
        remove_fragments(dir.path());

        let mut remaining: Vec<_> = dir
            .path()
            .read_dir_utf8()
            .expect("temp dir is readable")
            .map(|entry| entry.expect("dir entry is readable").file_name().to_owned())
            .collect();
        remaining.sort();
        assert_eq!(remaining, [".coverage", ".coveragerc"]);
    }
}
