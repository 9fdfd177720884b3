// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregated results of one or more worker runs.

use crate::case::{Case, CasePhase, Outcome, node_id_parts};
use camino::Utf8Path;
use hostest_metadata::RawReport;
use indexmap::IndexSet;
use std::collections::{BTreeMap, HashSet};
use swrite::{SWrite, swrite};
use tracing::{debug, warn};

/// File name marking a directory as a package. Never a test file of its own.
const PACKAGE_MARKER: &str = "__init__.py";

/// A collection of [`Case`]s parsed from one or more reports.
///
/// Cases are kept in report order, which is not necessarily hierarchical.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Results {
    root: String,
    cases: Vec<Case>,
}

impl Results {
    /// Creates an empty aggregate for the given root.
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            cases: Vec::new(),
        }
    }

    /// Creates an aggregate from already-built cases.
    pub fn from_cases(root: impl Into<String>, cases: impl IntoIterator<Item = Case>) -> Self {
        Self {
            root: root.into(),
            cases: cases.into_iter().collect(),
        }
    }

    /// Reads and parses the report at `path`.
    ///
    /// A missing, unreadable or malformed report yields an aggregate with no cases: a worker that
    /// failed to launch or crashed before writing its report looks the same as a run that found
    /// nothing. Callers check counts, not errors.
    pub fn from_report_file(path: &Utf8Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) => {
                debug!("no readable report at {path}: {error}");
                return Self::default();
            }
        };

        match RawReport::parse(&contents) {
            Ok(report) => Self::from_report(&report),
            Err(error) => {
                warn!("ignoring malformed report at {path}: {error}");
                Self::default()
            }
        }
    }

    /// Builds an aggregate from a parsed report.
    ///
    /// Executed entries come first. Collection errors become failing cases in the
    /// [`CasePhase::Collection`] phase. Collected leaf items that weren't also executed are added
    /// last. Package markers are skipped throughout.
    pub fn from_report(report: &RawReport) -> Self {
        let mut results = Self::new(report.root.clone());

        results.cases.extend(
            report
                .tests
                .iter()
                .filter(|entry| !is_package_marker(&entry.nodeid))
                .map(Case::from_executed_entry),
        );

        let executed: HashSet<&str> = report.tests.iter().map(|t| t.nodeid.as_str()).collect();
        let collectors: HashSet<&str> = report
            .collectors
            .iter()
            .map(|c| c.nodeid.as_str())
            .collect();

        for collector in &report.collectors {
            if is_package_marker(&collector.nodeid) {
                continue;
            }
            if collector.is_error() {
                results.cases.push(Case::from_collection_error(collector));
                continue;
            }
            results.cases.extend(
                collector
                    .result
                    .iter()
                    .filter(|item| {
                        !collectors.contains(item.nodeid.as_str())
                            && !executed.contains(item.nodeid.as_str())
                            && !is_package_marker(&item.nodeid)
                    })
                    .map(Case::from_collected_entry),
            );
        }

        results
    }

    /// The root directory or label of this aggregate.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// All cases, in report order.
    pub fn all_cases(&self) -> &[Case] {
        &self.cases
    }

    /// Failing cases, deduplicated by node id.
    ///
    /// When several failing cases share a node id, the first one added wins. Since executed
    /// entries are added before collection errors, an executed failure is preferred.
    pub fn failing_cases(&self) -> Vec<&Case> {
        let mut seen = HashSet::new();
        self.cases
            .iter()
            .filter(|case| case.outcome.is_failed())
            .filter(|case| seen.insert(case.node_id.as_str()))
            .collect()
    }

    /// Number of executed cases: passed, failed or skipped.
    pub fn executed_number(&self) -> usize {
        self.count(Outcome::is_executed)
    }

    /// Number of passed cases.
    pub fn passed_number(&self) -> usize {
        self.count(Outcome::is_passed)
    }

    /// Number of failed cases, collection errors included.
    pub fn failures_number(&self) -> usize {
        self.count(Outcome::is_failed)
    }

    /// Number of skipped cases.
    pub fn ignored_number(&self) -> usize {
        self.count(Outcome::is_ignored)
    }

    /// Number of cases collected without being executed.
    pub fn collected_number(&self) -> usize {
        self.count(Outcome::is_collected)
    }

    fn count(&self, predicate: impl Fn(Outcome) -> bool) -> usize {
        self.cases.iter().filter(|case| predicate(case.outcome)).count()
    }

    /// Returns true if this aggregate has no cases at all.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// A one-line human summary of the counts.
    pub fn summary_string(&self) -> String {
        let mut out = format!(
            "{} executed: {} passed, {} failed, {} skipped",
            self.executed_number(),
            self.passed_number(),
            self.failures_number(),
            self.ignored_number(),
        );
        let collected = self.collected_number();
        if collected > 0 {
            swrite!(out, ", {collected} collected");
        }
        out
    }

    /// The detail sections of every failing case, separated by blank lines.
    pub fn failing_cases_string(&self) -> String {
        self.failing_cases()
            .into_iter()
            .map(Case::debug_string)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Distinct file parts of every case, in first-seen order.
    ///
    /// Drives fan-out runs: each listed file is run by its own worker.
    pub fn file_paths(&self) -> Vec<&str> {
        let paths: IndexSet<&str> = self
            .cases
            .iter()
            .filter(|case| case.phase == CasePhase::Execution)
            .map(Case::file_path)
            .filter(|path| !path.is_empty() && !is_package_marker(path))
            .collect();
        paths.into_iter().collect()
    }

    /// Appends the cases of another aggregate.
    pub fn extend(&mut self, other: Results) {
        if self.root.is_empty() {
            self.root = other.root;
        }
        self.cases.extend(other.cases);
    }

    /// Computes the outcome of every node id and every ancestor id.
    ///
    /// An ancestor's outcome is the rollup of the outcomes of the cases below it.
    pub fn rollup_outcomes(&self) -> BTreeMap<String, Outcome> {
        let mut outcomes = BTreeMap::new();
        for case in &self.cases {
            let parts = node_id_parts(&case.node_id);
            for depth in 1..=parts.len() {
                let id = parts[..depth].join(crate::case::NODE_ID_SEPARATOR);
                outcomes
                    .entry(id)
                    .and_modify(|outcome: &mut Outcome| *outcome = (*outcome).min(case.outcome))
                    .or_insert(case.outcome);
            }
        }
        outcomes
    }

    /// Returns the cases accepted by `filter`.
    pub fn filtered<'a>(&'a self, filter: &'a CaseFilter) -> impl Iterator<Item = &'a Case> + 'a {
        self.cases.iter().filter(move |case| filter.accepts(case))
    }
}

/// Hides categories of cases from display. Failing and unknown cases are always shown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CaseFilter {
    /// Show passed cases.
    pub show_passed: bool,
    /// Show skipped cases.
    pub show_ignored: bool,
    /// Show collected cases.
    pub show_collected: bool,
}

impl Default for CaseFilter {
    fn default() -> Self {
        Self {
            show_passed: true,
            show_ignored: true,
            show_collected: true,
        }
    }
}

impl CaseFilter {
    /// Returns true if `case` should be displayed.
    pub fn accepts(&self, case: &Case) -> bool {
        let outcome = case.outcome;
        if outcome.is_passed() {
            self.show_passed
        } else if outcome.is_ignored() {
            self.show_ignored
        } else if outcome.is_collected() {
            self.show_collected
        } else {
            true
        }
    }
}

fn is_package_marker(node_id: &str) -> bool {
    let file = node_id_parts(node_id).first().copied().unwrap_or("");
    Utf8Path::new(file).file_name() == Some(PACKAGE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Results {
        Results::from_report(&RawReport::parse(input).expect("valid report"))
    }

    const EXECUTED: &str = indoc! {r#"
        {
            "root": "/tmp/suite",
            "tests": [
                {"nodeid": "test_a.py::test_ok", "outcome": "passed",
                 "call": {"duration": 0.1, "outcome": "passed"}},
                {"nodeid": "test_a.py::test_bad", "outcome": "failed",
                 "call": {"duration": 0.2, "outcome": "failed", "longrepr": "assert False",
                          "stdout": "printed"}},
                {"nodeid": "pkg/test_b.py::TestX::test_skip", "outcome": "skipped"}
            ]
        }
    "#};

    #[test]
    fn executed_counts() {
        let results = parse(EXECUTED);
        assert_eq!(results.root(), "/tmp/suite");
        assert_eq!(results.all_cases().len(), 3);
        assert_eq!(results.executed_number(), 3);
        assert_eq!(results.passed_number(), 1);
        assert_eq!(results.failures_number(), 1);
        assert_eq!(results.ignored_number(), 1);
        assert_eq!(results.collected_number(), 0);
        assert_eq!(
            results.summary_string(),
            "3 executed: 1 passed, 1 failed, 1 skipped"
        );

        let failing = results.failing_cases();
        assert_eq!(failing.len(), 1);
        assert_eq!(failing[0].node_id, "test_a.py::test_bad");

        let detail = results.failing_cases_string();
        assert!(detail.contains("assert False"), "detail: {detail}");
        assert!(detail.contains("printed"), "detail: {detail}");
    }

    #[test]
    fn collect_only_report() {
        let results = parse(indoc! {r#"
            {
                "collectors": [
                    {"nodeid": "", "outcome": "passed", "result": [
                        {"nodeid": "pkg/__init__.py", "type": "Package"},
                        {"nodeid": "test_a.py", "type": "Module"},
                        {"nodeid": "pkg/test_b.py", "type": "Module"}
                    ]},
                    {"nodeid": "pkg/__init__.py", "outcome": "passed", "result": []},
                    {"nodeid": "test_a.py", "outcome": "passed", "result": [
                        {"nodeid": "test_a.py::test_one", "type": "Function"},
                        {"nodeid": "test_a.py::TestC", "type": "Class"}
                    ]},
                    {"nodeid": "test_a.py::TestC", "outcome": "passed", "result": [
                        {"nodeid": "test_a.py::TestC::test_two", "type": "Function"}
                    ]},
                    {"nodeid": "pkg/test_b.py", "outcome": "passed", "result": [
                        {"nodeid": "pkg/test_b.py::test_three", "type": "Function"}
                    ]}
                ]
            }
        "#});

        assert_eq!(results.collected_number(), 3);
        assert_eq!(results.executed_number(), 0);
        assert_eq!(results.file_paths(), ["test_a.py", "pkg/test_b.py"]);
        assert_eq!(results.summary_string(), "0 executed: 0 passed, 0 failed, 0 skipped, 3 collected");
    }

    #[test]
    fn collection_errors_are_failures() {
        let results = parse(indoc! {r#"
            {
                "tests": [],
                "collectors": [
                    {"nodeid": "", "outcome": "passed", "result": [
                        {"nodeid": "test_a.py", "type": "Module"},
                        {"nodeid": "test_b.py", "type": "Module"}
                    ]},
                    {"nodeid": "test_a.py", "outcome": "failed", "longrepr": "ImportError", "result": []},
                    {"nodeid": "test_b.py", "outcome": "failed", "longrepr": "SyntaxError", "result": []}
                ]
            }
        "#});

        assert_eq!(results.failures_number(), 2);
        assert_eq!(results.collected_number(), 0);
        assert_eq!(results.executed_number(), 2);
        assert!(
            results
                .all_cases()
                .iter()
                .all(|case| case.phase == CasePhase::Collection),
            "every case is a collection error"
        );
        assert!(results.file_paths().is_empty());
    }

    #[test]
    fn executed_failure_preferred_over_collection_error() {
        let results = parse(indoc! {r#"
            {
                "tests": [{"nodeid": "test_a.py", "outcome": "failed",
                           "call": {"longrepr": "executed"}}],
                "collectors": [{"nodeid": "test_a.py", "outcome": "failed", "longrepr": "collection"}]
            }
        "#});

        assert_eq!(results.failures_number(), 2);
        let failing = results.failing_cases();
        assert_eq!(failing.len(), 1);
        assert_eq!(failing[0].message, "executed");
        assert_eq!(failing[0].phase, CasePhase::Execution);
    }

    #[test]
    fn collected_items_that_also_ran_are_not_duplicated() {
        let results = parse(indoc! {r#"
            {
                "tests": [{"nodeid": "test_a.py::test_one", "outcome": "passed"}],
                "collectors": [
                    {"nodeid": "test_a.py", "outcome": "passed", "result": [
                        {"nodeid": "test_a.py::test_one", "type": "Function"},
                        {"nodeid": "test_a.py::test_two", "type": "Function"}
                    ]}
                ]
            }
        "#});

        let ids: Vec<_> = results.all_cases().iter().map(|c| c.node_id.as_str()).collect();
        assert_eq!(ids, ["test_a.py::test_one", "test_a.py::test_two"]);
        assert_eq!(results.passed_number(), 1);
        assert_eq!(results.collected_number(), 1);
    }

    #[test]
    fn rollup_outcomes() {
        let results = parse(EXECUTED);
        let outcomes = results.rollup_outcomes();
        assert_eq!(outcomes["test_a.py"], Outcome::Failed);
        assert_eq!(outcomes["test_a.py::test_ok"], Outcome::Passed);
        assert_eq!(outcomes["pkg/test_b.py"], Outcome::Skipped);
        assert_eq!(outcomes["pkg/test_b.py::TestX"], Outcome::Skipped);
        assert_eq!(outcomes.len(), 6);
    }

    #[test]
    fn case_filter() {
        let results = parse(EXECUTED);
        let filter = CaseFilter {
            show_passed: false,
            show_ignored: false,
            show_collected: true,
        };
        let shown: Vec<_> = results.filtered(&filter).map(|c| c.name()).collect();
        assert_eq!(shown, ["test_bad"]);
        assert_eq!(results.filtered(&CaseFilter::default()).count(), 3);
    }

    #[test]
    fn extend_accumulates() {
        let mut results = Results::default();
        results.extend(parse(EXECUTED));
        results.extend(Results::from_cases("", [Case::new("test_c.py::test", Outcome::Passed)]));
        assert_eq!(results.root(), "/tmp/suite");
        assert_eq!(results.passed_number(), 2);
        assert_eq!(
            results.file_paths(),
            ["test_a.py", "pkg/test_b.py", "test_c.py"]
        );
    }

    #[test]
    fn unreadable_reports_are_empty() {
        let dir = tempdir().expect("tempdir created");

        let missing = Results::from_report_file(&dir.path().join("missing.json"));
        assert!(missing.is_empty());

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{ not json").expect("wrote garbage");
        assert!(Results::from_report_file(&garbage).is_empty());

        let valid = dir.path().join("valid.json");
        std::fs::write(&valid, EXECUTED).expect("wrote report");
        assert_eq!(Results::from_report_file(&valid).executed_number(), 3);
    }
}
