// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    case::{Case, CasePhase, Outcome},
    errors::JunitExportError,
    results::Results,
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::Utf8Path;
use indexmap::IndexMap;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use tracing::debug;

static DEFAULT_SUITE: &str = "hostest";
static COLLECTION_ERROR: &str = "collection error";

/// Builds a JUnit report from `results`.
///
/// Every distinct file becomes a test suite. Cases that were only collected carry no outcome and
/// are left out.
pub fn junit_report(name: &str, results: &Results) -> Report {
    let mut suites: IndexMap<&str, TestSuite> = IndexMap::new();
    for case in results.all_cases() {
        let Some(status) = testcase_status(case) else {
            continue;
        };

        let mut testcase = TestCase::new(case.name(), status);
        testcase
            .set_classname(case.parent_id())
            .set_time(case.duration);
        if !case.stdout.is_empty() {
            testcase.set_system_out(case.stdout.as_str());
        }
        if !case.stderr.is_empty() {
            testcase.set_system_err(case.stderr.as_str());
        }

        let suite_name = match case.file_path() {
            "" => DEFAULT_SUITE,
            file => file,
        };
        suites
            .entry(suite_name)
            .or_insert_with(|| TestSuite::new(suite_name))
            .add_test_case(testcase);
    }

    let mut report = Report::new(name);
    report.add_test_suites(suites.into_values());
    report
}

/// Writes `results` as a JUnit XML report to `path`, replacing any existing file.
pub fn write_junit(results: &Results, path: &Utf8Path) -> Result<(), JunitExportError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|error| JunitExportError::CreateDir {
            path: dir.to_owned(),
            error,
        })?;
    }

    let report = junit_report(DEFAULT_SUITE, results);
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|file| report.serialize(file))
        .map_err(|error| JunitExportError::Write {
            path: path.to_owned(),
            error,
        })?;
    debug!("wrote JUnit report to {path}");
    Ok(())
}

fn testcase_status(case: &Case) -> Option<TestCaseStatus> {
    let kind = match case.outcome {
        Outcome::Collected => return None,
        Outcome::Passed | Outcome::Xpassed | Outcome::Xfailed => {
            return Some(TestCaseStatus::success());
        }
        Outcome::Skipped => {
            let mut status = TestCaseStatus::skipped();
            if !case.message.is_empty() {
                status.set_message(case.message.as_str());
            }
            return Some(status);
        }
        Outcome::Failed => NonSuccessKind::Failure,
        Outcome::Error | Outcome::Unknown => NonSuccessKind::Error,
    };

    let mut status = TestCaseStatus::non_success(kind);
    status.set_type(match (case.phase, case.outcome) {
        (CasePhase::Collection, _) => COLLECTION_ERROR,
        (_, outcome) => outcome.name(),
    });
    if let Some(first_line) = case.message.lines().next() {
        status.set_message(first_line);
    }
    if !case.message.is_empty() {
        status.set_description(case.message.as_str());
    }
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use std::time::Duration;

    fn case(node_id: &str, outcome: Outcome) -> Case {
        Case::new(node_id, outcome)
    }

    #[test]
    fn suites_per_file() {
        let mut failed = case("test_a.py::TestMath::test_sub", Outcome::Failed);
        failed.message = "assert 1 == 2\nfull traceback".to_owned();
        failed.stdout = "printed".to_owned();
        failed.duration = Duration::from_millis(250);

        let results = Results::from_cases(
            "/tests",
            [
                case("test_a.py::TestMath::test_add", Outcome::Passed),
                failed,
                case("pkg/test_b.py::test_skip", Outcome::Skipped),
                case("pkg/test_b.py::test_listed", Outcome::Collected),
                case("test_a.py::test_xfail", Outcome::Xfailed),
            ],
        );

        let report = junit_report("hostest", &results);
        assert_eq!(report.tests, 4, "collected cases are left out");
        assert_eq!(report.failures, 1);
        assert_eq!(report.errors, 0);

        let names: Vec<_> = report
            .test_suites
            .iter()
            .map(|suite| suite.name.as_str())
            .collect();
        assert_eq!(names, ["test_a.py", "pkg/test_b.py"]);

        let xml = report.to_string().expect("report serializes");
        assert!(xml.contains(r#"classname="test_a.py::TestMath""#), "{xml}");
        assert!(xml.contains(r#"message="assert 1 == 2""#), "{xml}");
        assert!(xml.contains("<system-out>printed</system-out>"), "{xml}");
    }

    #[test]
    fn collection_errors_are_errors() {
        let mut error = case("test_broken.py", Outcome::Error);
        error.phase = CasePhase::Collection;
        error.message = "ImportError: no module named foo".to_owned();
        let results = Results::from_cases("/tests", [error]);

        let report = junit_report("hostest", &results);
        assert_eq!(report.errors, 1);
        let xml = report.to_string().expect("report serializes");
        assert!(xml.contains(r#"type="collection error""#), "{xml}");
    }

    #[test]
    fn writes_report_file() {
        let dir = tempdir().expect("tempdir created");
        let path = dir.path().join("out/junit.xml");
        let results = Results::from_cases("/tests", [case("test_a.py::test_add", Outcome::Passed)]);

        write_junit(&results, &path).expect("report written");
        let xml = std::fs::read_to_string(&path).expect("report readable");
        assert!(xml.contains(r#"<testsuite name="test_a.py""#), "{xml}");

        // Writing again replaces the file.
        write_junit(&Results::new("/tests"), &path).expect("report rewritten");
        let xml = std::fs::read_to_string(&path).expect("report readable");
        assert!(!xml.contains("test_a.py"), "{xml}");
    }
}
