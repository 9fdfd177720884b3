// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Individual test results and their outcomes.
//!
//! The main structure in this module is [`Case`], built from one entry of a worker's report.

use hostest_metadata::{RawCollectedItem, RawCollector, RawTestEntry};
use std::{fmt, time::Duration};
use swrite::{SWrite, swrite};

/// Separates the parts of a node id: `test_file.py::TestClass::test_fn`.
pub const NODE_ID_SEPARATOR: &str = "::";

/// The outcome of a test or of a group of tests.
///
/// Variants are ordered by priority: the outcome of a group is the *smallest* outcome among its
/// members (see [`Outcome::rollup`]). A single failing child therefore makes its parent failed
/// even if every sibling passed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum Outcome {
    /// The outcome name wasn't recognized.
    Unknown,
    /// The test errored outside of its body, or collection failed.
    Error,
    /// The test failed.
    Failed,
    /// The test was skipped.
    Skipped,
    /// The test passed.
    Passed,
    /// The test was expected to fail but passed.
    Xpassed,
    /// The test was expected to fail and did.
    Xfailed,
    /// The test was collected but not executed.
    Collected,
}

impl Outcome {
    /// All outcomes, in priority order.
    pub const ALL: [Self; 8] = [
        Self::Unknown,
        Self::Error,
        Self::Failed,
        Self::Skipped,
        Self::Passed,
        Self::Xpassed,
        Self::Xfailed,
        Self::Collected,
    ];

    /// Maps a report outcome name to an outcome. Unrecognized names map to [`Outcome::Unknown`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "error" => Self::Error,
            "failed" => Self::Failed,
            "skipped" => Self::Skipped,
            "passed" => Self::Passed,
            "xpassed" => Self::Xpassed,
            "xfailed" => Self::Xfailed,
            "collected" => Self::Collected,
            _ => Self::Unknown,
        }
    }

    /// Returns the report name of this outcome.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Error => "error",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Passed => "passed",
            Self::Xpassed => "xpassed",
            Self::Xfailed => "xfailed",
            Self::Collected => "collected",
        }
    }

    /// Passed, xfailed and xpassed.
    pub fn is_passed(self) -> bool {
        matches!(self, Self::Passed | Self::Xfailed | Self::Xpassed)
    }

    /// Error and failed.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Error | Self::Failed)
    }

    /// Skipped.
    pub fn is_ignored(self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Collected without being executed.
    pub fn is_collected(self) -> bool {
        matches!(self, Self::Collected)
    }

    /// Any outcome produced by actually running the test.
    pub fn is_executed(self) -> bool {
        self.is_passed() || self.is_failed() || self.is_ignored()
    }

    /// Aggregates child outcomes into their parent's outcome: the minimum in priority order.
    ///
    /// Returns [`Outcome::Unknown`] if there are no children.
    pub fn rollup(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        outcomes.into_iter().min().unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which step of a run produced a case.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CasePhase {
    /// The case was executed, or collected by a collect-only run.
    Execution,
    /// The case stands for a collection error: the file or class couldn't be collected.
    Collection,
}

/// One test result.
#[derive(Clone, Debug, PartialEq)]
pub struct Case {
    /// The hierarchical node id.
    pub node_id: String,
    /// The outcome.
    pub outcome: Outcome,
    /// Total time spent in setup, call and teardown.
    pub duration: Duration,
    /// Failure detail, empty if the test passed.
    pub message: String,
    /// Captured standard output of the call phase.
    pub stdout: String,
    /// Captured standard error of the call phase.
    pub stderr: String,
    /// Captured log records of the call phase, formatted as `[LEVEL] message`.
    pub logs: Vec<String>,
    /// Which step of the run produced this case.
    pub phase: CasePhase,
}

impl Case {
    /// Creates a case with the given id and outcome and no other data.
    pub fn new(node_id: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            node_id: node_id.into(),
            outcome,
            duration: Duration::ZERO,
            message: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            logs: Vec::new(),
            phase: CasePhase::Execution,
        }
    }

    /// Builds a case from an executed-test entry.
    pub fn from_executed_entry(entry: &RawTestEntry) -> Self {
        let seconds: f64 = entry.phases().map(|phase| phase.duration).sum();
        let mut case = Self::new(&entry.nodeid, Outcome::from_name(&entry.outcome));
        case.duration = Duration::try_from_secs_f64(seconds).unwrap_or_default();

        if let Some(call) = &entry.call {
            case.message = call.longrepr.clone();
            case.stdout = call.stdout.clone();
            case.stderr = call.stderr.clone();
            case.logs = call
                .log
                .iter()
                .map(|record| format!("[{}] {}", record.levelname, record.msg))
                .collect();
        }
        case
    }

    /// Builds a case from a collected item. The outcome defaults to [`Outcome::Collected`].
    pub fn from_collected_entry(item: &RawCollectedItem) -> Self {
        let outcome = item
            .outcome
            .as_deref()
            .map_or(Outcome::Collected, Outcome::from_name);
        let mut case = Self::new(&item.nodeid, outcome);
        case.message = item.longrepr.clone();
        case
    }

    /// Builds a synthetic failing case for a collector that failed to collect.
    pub fn from_collection_error(collector: &RawCollector) -> Self {
        let mut case = Self::new(&collector.nodeid, Outcome::Error);
        case.message = collector.longrepr.clone();
        case.phase = CasePhase::Collection;
        case
    }

    /// Returns the id of this case's parent.
    pub fn parent_id(&self) -> &str {
        parent_id(&self.node_id)
    }

    /// Returns the last part of this case's id.
    pub fn name(&self) -> &str {
        name_from_id(&self.node_id)
    }

    /// Returns the file part of this case's id.
    pub fn file_path(&self) -> &str {
        node_id_parts(&self.node_id).first().copied().unwrap_or("")
    }

    /// Returns a description of this case with its outcome, message and captured output.
    pub fn debug_string(&self) -> String {
        let mut out = format!("{} [{}]", self.node_id, self.outcome.name().to_uppercase());
        if self.phase == CasePhase::Collection {
            out.push_str(" (collection)");
        }
        if !self.message.is_empty() {
            swrite!(out, "\n{}", self.message);
        }
        out.push_str(&self.log_string());
        out
    }

    /// Returns the captured stdout, stderr and log sections, or an empty string if nothing was
    /// captured.
    pub fn log_string(&self) -> String {
        if self.stdout.is_empty() && self.stderr.is_empty() && self.logs.is_empty() {
            return String::new();
        }

        let pad = "-".repeat(40);
        format!(
            "\n\n{pad}[STD OUT]{pad}\n{}\n\n{pad}[STD ERR]{pad}\n{}\n\n{pad}[LOGGING]{pad}\n{}",
            self.stdout,
            self.stderr,
            self.logs.join("\n"),
        )
    }
}

/// Splits a node id into its parts.
///
/// A trailing parametrization in brackets stays attached to the last part even if it contains
/// the separator: `t.py::test[A::B]` splits into `["t.py", "test[A::B]"]`.
pub fn node_id_parts(node_id: &str) -> Vec<&str> {
    if node_id.is_empty() {
        return Vec::new();
    }
    match last_separator(node_id) {
        Some(idx) => {
            let mut parts: Vec<_> = node_id[..idx].split(NODE_ID_SEPARATOR).collect();
            parts.push(&node_id[idx + NODE_ID_SEPARATOR.len()..]);
            parts
        }
        None => vec![node_id],
    }
}

/// Returns the node id with its last part removed.
pub fn parent_id(node_id: &str) -> &str {
    match last_separator(node_id) {
        Some(idx) => &node_id[..idx],
        None => "",
    }
}

/// Returns the last part of a node id.
pub fn name_from_id(node_id: &str) -> &str {
    match last_separator(node_id) {
        Some(idx) => &node_id[idx + NODE_ID_SEPARATOR.len()..],
        None => node_id,
    }
}

/// Index of the last separator outside the parametrization brackets.
fn last_separator(node_id: &str) -> Option<usize> {
    let head_len = node_id.find('[').unwrap_or(node_id.len());
    node_id[..head_len].rfind(NODE_ID_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostest_metadata::{RawLogRecord, RawPhase};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;
    use test_strategy::proptest;

    #[test_case("", &[], "", "" ; "empty")]
    #[test_case("test_file.py", &["test_file.py"], "", "test_file.py" ; "file only")]
    #[test_case(
        "test_file.py::TestClass::test_fn",
        &["test_file.py", "TestClass", "test_fn"],
        "test_file.py::TestClass",
        "test_fn"
        ; "class method"
    )]
    #[test_case(
        "t.py::test::parametrized[A::B::C]",
        &["t.py", "test", "parametrized[A::B::C]"],
        "t.py::test",
        "parametrized[A::B::C]"
        ; "separator inside parametrization"
    )]
    #[test_case(
        "sub/test-file.py::test_fn[a-b c]",
        &["sub/test-file.py", "test_fn[a-b c]"],
        "sub/test-file.py",
        "test_fn[a-b c]"
        ; "punctuation in path and parameters"
    )]
    fn node_id_splitting(node_id: &str, parts: &[&str], parent: &str, name: &str) {
        assert_eq!(node_id_parts(node_id), parts);
        assert_eq!(parent_id(node_id), parent);
        assert_eq!(name_from_id(node_id), name);
    }

    #[proptest(cases = 256)]
    fn parent_and_name_rebuild_node_id(
        #[strategy("[a-z_./]{1,8}(::[A-Za-z_]{1,8}){0,3}(\\[[A-Z:]{0,8}\\])?")] node_id: String,
    ) {
        let parent = parent_id(&node_id);
        let name = name_from_id(&node_id);
        if parent.is_empty() {
            prop_assert_eq!(name, node_id.as_str());
        } else {
            prop_assert_eq!(format!("{parent}{NODE_ID_SEPARATOR}{name}"), node_id.clone());
        }
        prop_assert_eq!(node_id_parts(&node_id).join(NODE_ID_SEPARATOR), node_id);
    }

    #[proptest(cases = 64)]
    fn predicates_partition_outcomes(outcome: Outcome) {
        let memberships = [
            outcome.is_passed(),
            outcome.is_failed(),
            outcome.is_ignored(),
            outcome.is_collected(),
            outcome == Outcome::Unknown,
        ];
        prop_assert_eq!(memberships.iter().filter(|m| **m).count(), 1);
        prop_assert_eq!(
            outcome.is_executed(),
            outcome.is_passed() || outcome.is_failed() || outcome.is_ignored()
        );
        prop_assert_eq!(Outcome::from_name(outcome.name()), outcome);
    }

    #[test_case(&[Outcome::Passed, Outcome::Xfailed, Outcome::Xpassed], Outcome::Passed ; "all passing")]
    #[test_case(&[Outcome::Passed, Outcome::Failed], Outcome::Failed ; "one failure")]
    #[test_case(&[Outcome::Collected, Outcome::Skipped], Outcome::Skipped ; "skipped before collected")]
    #[test_case(&[Outcome::Failed, Outcome::Error], Outcome::Error ; "error before failed")]
    #[test_case(&[], Outcome::Unknown ; "no children")]
    fn rollup(children: &[Outcome], expected: Outcome) {
        assert_eq!(Outcome::rollup(children.iter().copied()), expected);
    }

    #[test]
    fn unknown_outcome_name() {
        assert_eq!(Outcome::from_name("exploded"), Outcome::Unknown);
        assert_eq!(Outcome::from_name(""), Outcome::Unknown);
    }

    #[test]
    fn executed_entry() {
        let phase = |duration| RawPhase {
            duration,
            ..Default::default()
        };
        let entry = RawTestEntry {
            nodeid: "test_a.py::test_fail".to_owned(),
            outcome: "failed".to_owned(),
            setup: Some(phase(0.5)),
            call: Some(RawPhase {
                duration: 1.0,
                longrepr: "assert False".to_owned(),
                stdout: "STD OUT".to_owned(),
                stderr: "STD ERR".to_owned(),
                log: vec![
                    RawLogRecord {
                        levelname: "ERROR".to_owned(),
                        msg: "LOGGING EXCEPTION".to_owned(),
                    },
                    RawLogRecord {
                        levelname: "DEBUG".to_owned(),
                        msg: "LOGGING DEBUG".to_owned(),
                    },
                ],
                ..Default::default()
            }),
            teardown: Some(phase(0.25)),
        };

        let case = Case::from_executed_entry(&entry);
        assert_eq!(case.outcome, Outcome::Failed);
        assert_eq!(case.duration, Duration::from_millis(1750));
        assert_eq!(case.message, "assert False");
        assert_eq!(case.logs, ["[ERROR] LOGGING EXCEPTION", "[DEBUG] LOGGING DEBUG"]);
        assert_eq!(case.phase, CasePhase::Execution);

        let debug = case.debug_string();
        assert!(debug.starts_with("test_a.py::test_fail [FAILED]\nassert False"), "{debug}");
        assert!(debug.contains("[STD OUT]"), "{debug}");
        assert!(debug.contains("STD ERR"), "{debug}");
    }

    #[test]
    fn executed_entry_without_phases() {
        let entry = RawTestEntry {
            nodeid: "test_a.py::test_ok".to_owned(),
            outcome: "passed".to_owned(),
            ..Default::default()
        };
        let case = Case::from_executed_entry(&entry);
        assert_eq!(case.duration, Duration::ZERO);
        assert_eq!(case.log_string(), "");
        assert_eq!(case.debug_string(), "test_a.py::test_ok [PASSED]");
    }

    #[test]
    fn collected_entry_defaults_to_collected() {
        let item = RawCollectedItem {
            nodeid: "test_a.py::test_ok".to_owned(),
            kind: "Function".to_owned(),
            ..Default::default()
        };
        assert_eq!(Case::from_collected_entry(&item).outcome, Outcome::Collected);

        let item = RawCollectedItem {
            outcome: Some("bogus".to_owned()),
            ..item
        };
        assert_eq!(Case::from_collected_entry(&item).outcome, Outcome::Unknown);
    }

    #[test]
    fn collection_error_is_failing() {
        let collector = RawCollector {
            nodeid: "test_broken.py".to_owned(),
            outcome: "failed".to_owned(),
            longrepr: "SyntaxError".to_owned(),
            result: Vec::new(),
        };
        let case = Case::from_collection_error(&collector);
        assert!(case.outcome.is_failed());
        assert_eq!(case.phase, CasePhase::Collection);
        assert_eq!(case.file_path(), "test_broken.py");
    }
}
