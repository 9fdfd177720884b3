// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Settings describing how a single run is launched.

use crate::errors::{RunSettingsFileError, RunSettingsParseError};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

/// A coverage report format.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum CoverageFormat {
    /// JSON report, written to a file.
    Json,
    /// Cobertura XML report, written to a file.
    Xml,
    /// LCOV report, written to a file.
    Lcov,
    /// HTML report, written to a directory.
    Html,
}

impl CoverageFormat {
    /// All formats.
    pub const ALL: [Self; 4] = [Self::Json, Self::Xml, Self::Lcov, Self::Html];

    /// The format's name, also the coverage tool's report subcommand.
    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Lcov => "lcov",
            Self::Html => "html",
        }
    }

    /// Returns true if the report is a directory rather than a single file.
    pub fn is_directory(self) -> bool {
        matches!(self, Self::Html)
    }
}

impl fmt::Display for CoverageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CoverageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| format!("unknown coverage format `{s}` (expected json, xml, lcov or html)"))
    }
}

/// Immutable configuration for one run.
///
/// Serializes to a flat key-value document whose keys are the field names in camel case. This is
/// the form handed to workers and persisted between sessions.
///
/// List-valued fields never contain empty entries: they are dropped on construction and on
/// deserialization.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunSettings {
    do_close_host_after_run: bool,
    do_use_main_window: bool,
    do_minimize_main_window: bool,
    #[serde(deserialize_with = "arg_list")]
    extra_host_args: Vec<String>,
    #[serde(deserialize_with = "arg_list")]
    extra_test_args: Vec<String>,
    do_run_coverage: bool,
    coverage_report_formats: BTreeSet<CoverageFormat>,
    #[serde(deserialize_with = "optional_arg_list")]
    coverage_sources: Option<Vec<String>>,
    coverage_file_path: Option<Utf8PathBuf>,
    #[serde(deserialize_with = "at_least_one")]
    n_parallel_instances: usize,
    do_run_test_files_independently: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            do_close_host_after_run: true,
            do_use_main_window: true,
            do_minimize_main_window: true,
            extra_host_args: Vec::new(),
            extra_test_args: Vec::new(),
            do_run_coverage: false,
            coverage_report_formats: BTreeSet::new(),
            coverage_sources: None,
            coverage_file_path: None,
            n_parallel_instances: 1,
            do_run_test_files_independently: false,
        }
    }
}

impl RunSettings {
    /// Parses settings from their JSON form. An empty string yields the defaults.
    pub fn from_json(input: &str) -> Result<Self, RunSettingsParseError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(input).map_err(RunSettingsParseError::new)
    }

    /// Parses settings from their key-value form.
    pub fn from_value(value: serde_json::Value) -> Result<Self, RunSettingsParseError> {
        serde_json::from_value(value).map_err(RunSettingsParseError::new)
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> String {
        self.as_dict().to_string()
    }

    /// Returns the key-value form of these settings.
    pub fn as_dict(&self) -> serde_json::Value {
        // Every field is a plain value with a string key, which always serializes.
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Reads settings from a JSON file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, RunSettingsFileError> {
        let contents =
            std::fs::read_to_string(path).map_err(|error| RunSettingsFileError::Read {
                path: path.to_owned(),
                error,
            })?;
        Self::from_json(&contents).map_err(|error| RunSettingsFileError::Parse {
            path: path.to_owned(),
            error,
        })
    }

    /// Writes settings to a JSON file.
    pub fn to_file(&self, path: &Utf8Path) -> Result<(), RunSettingsFileError> {
        std::fs::write(path, self.to_json()).map_err(|error| RunSettingsFileError::Write {
            path: path.to_owned(),
            error,
        })
    }

    /// Whether the host exits once the test engine returns.
    pub fn do_close_host_after_run(&self) -> bool {
        self.do_close_host_after_run
    }

    /// Whether the host shows its main window.
    pub fn do_use_main_window(&self) -> bool {
        self.do_use_main_window
    }

    /// Whether the host's main window is minimized during the run.
    pub fn do_minimize_main_window(&self) -> bool {
        self.do_minimize_main_window
    }

    /// Extra arguments passed to the host executable.
    pub fn extra_host_args(&self) -> &[String] {
        &self.extra_host_args
    }

    /// Extra arguments passed to the test engine.
    pub fn extra_test_args(&self) -> &[String] {
        &self.extra_test_args
    }

    /// Whether the test engine runs under coverage instrumentation.
    pub fn do_run_coverage(&self) -> bool {
        self.do_run_coverage
    }

    /// Explicitly requested coverage report formats.
    pub fn coverage_report_formats(&self) -> &BTreeSet<CoverageFormat> {
        &self.coverage_report_formats
    }

    /// Coverage source packages. `None` defers to the local coverage config file.
    pub fn coverage_sources(&self) -> Option<&[String]> {
        self.coverage_sources.as_deref()
    }

    /// Where coverage reports are written.
    pub fn coverage_file_path(&self) -> Option<&Utf8Path> {
        self.coverage_file_path.as_deref()
    }

    /// Number of workers allowed to run at once. Always at least 1.
    pub fn n_parallel_instances(&self) -> usize {
        self.n_parallel_instances
    }

    /// Whether each test file runs in its own worker after a collection pass.
    pub fn do_run_test_files_independently(&self) -> bool {
        self.do_run_test_files_independently
    }

    /// Sets whether the host exits once the test engine returns.
    pub fn with_close_host_after_run(mut self, value: bool) -> Self {
        self.do_close_host_after_run = value;
        self
    }

    /// Sets whether the host shows its main window.
    pub fn with_use_main_window(mut self, value: bool) -> Self {
        self.do_use_main_window = value;
        self
    }

    /// Sets whether the host's main window is minimized.
    pub fn with_minimize_main_window(mut self, value: bool) -> Self {
        self.do_minimize_main_window = value;
        self
    }

    /// Replaces the extra host arguments. Empty entries are dropped.
    pub fn with_extra_host_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_host_args = clean_args(args);
        self
    }

    /// Replaces the extra test engine arguments. Empty entries are dropped.
    pub fn with_extra_test_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_test_args = clean_args(args);
        self
    }

    /// Appends to the extra test engine arguments. Empty entries are dropped.
    pub fn push_extra_test_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_test_args.extend(clean_args(args));
        self
    }

    /// Sets whether the test engine runs under coverage.
    pub fn with_coverage(mut self, value: bool) -> Self {
        self.do_run_coverage = value;
        self
    }

    /// Replaces the requested coverage formats.
    pub fn with_coverage_report_formats(
        mut self,
        formats: impl IntoIterator<Item = CoverageFormat>,
    ) -> Self {
        self.coverage_report_formats = formats.into_iter().collect();
        self
    }

    /// Sets the coverage source packages. Empty entries are dropped.
    pub fn with_coverage_sources<I, S>(mut self, sources: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.coverage_sources = sources.map(clean_args);
        self
    }

    /// Sets where coverage reports are written.
    pub fn with_coverage_file_path(mut self, path: Option<Utf8PathBuf>) -> Self {
        self.coverage_file_path = path;
        self
    }

    /// Sets the number of parallel workers, clamped to at least 1.
    pub fn with_parallel_instances(mut self, n: usize) -> Self {
        self.n_parallel_instances = n.max(1);
        self
    }

    /// Sets whether each test file runs in its own worker.
    pub fn with_run_test_files_independently(mut self, value: bool) -> Self {
        self.do_run_test_files_independently = value;
        self
    }

    /// Test engine arguments restricting collection to files matching `pattern`.
    pub fn file_filter_args(pattern: &str) -> Vec<String> {
        ini_filter_args("python_files", pattern)
    }

    /// Test engine arguments restricting collection to classes matching `pattern`.
    pub fn class_filter_args(pattern: &str) -> Vec<String> {
        ini_filter_args("python_classes", pattern)
    }

    /// Test engine arguments restricting collection to functions matching `pattern`.
    pub fn function_filter_args(pattern: &str) -> Vec<String> {
        ini_filter_args("python_functions", pattern)
    }

    /// Test engine arguments selecting tests whose names match the expression `pattern`.
    pub fn pattern_filter_args(pattern: &str) -> Vec<String> {
        if pattern.is_empty() {
            return Vec::new();
        }
        vec!["-k".to_owned(), pattern.to_owned()]
    }
}

fn ini_filter_args(option: &str, pattern: &str) -> Vec<String> {
    if pattern.is_empty() {
        return Vec::new();
    }
    vec!["-o".to_owned(), format!("{option}='{pattern}'")]
}

fn clean_args(args: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    args.into_iter()
        .map(Into::into)
        .filter(|arg| !arg.is_empty())
        .collect()
}

fn arg_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let args = Option::<Vec<Option<String>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(clean_args(args.into_iter().flatten()))
}

fn optional_arg_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let args = Option::<Vec<Option<String>>>::deserialize(deserializer)?;
    Ok(args.map(|args| clean_args(args.into_iter().flatten())))
}

fn at_least_one<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<usize>::deserialize(deserializer)?
        .unwrap_or(1)
        .max(1))
}
