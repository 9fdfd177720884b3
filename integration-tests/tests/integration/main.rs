// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These tests run the hostest CLI (as `hostest-dup`, a copy of its main.rs built in this package)
//! against temporary suites. The suites' config points at `fake-host`, a stand-in host
//! application that reads each worker's invocation and writes a report without needing a real
//! host or test engine. See test-helpers/fake-host.rs for what it understands.

use fs_err as fs;
use hostest_metadata::HostestExitCode;
use pretty_assertions::assert_eq;

mod fixtures;

use fixtures::*;

#[test]
fn run_reports_failures_and_writes_junit() {
    let suite = sample_suite();
    let junit = suite.scratch_path("out/junit.xml");

    let output = hostest(&suite)
        .args(["run", suite.dir().as_str(), "--junit", junit.as_str()])
        .unchecked(true)
        .output();

    assert_eq!(
        output.exit_code(),
        Some(HostestExitCode::TEST_RUN_FAILED),
        "{output}"
    );
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("PASS"), "{output}");
    assert!(stdout.contains("test_math.py::test_add"), "{output}");
    assert!(stdout.contains("--- test_math.py::test_sub"), "{output}");
    assert!(stdout.contains(FULL_SUMMARY), "{output}");

    let launches = suite.launches().expect("read launches");
    assert_eq!(launches.len(), 1, "a direct run uses one host instance");
    assert!(!launches[0].is_collect());

    let junit = fs::read_to_string(&junit).expect("JUnit report written");
    assert!(junit.contains(r#"name="test_math.py""#), "{junit}");
    assert!(junit.contains(r#"name="pkg/test_cls.py""#), "{junit}");
    assert!(junit.contains(r#"name="test_sub""#), "{junit}");
    assert!(junit.contains("<failure"), "{junit}");
    assert!(junit.contains("<skipped"), "{junit}");
}

#[test]
fn independent_run_fans_out_per_file() {
    let suite = sample_suite();

    let output = hostest(&suite)
        .args(["run", suite.dir().as_str(), "--independent", "-j", "2"])
        .unchecked(true)
        .output();

    assert_eq!(
        output.exit_code(),
        Some(HostestExitCode::TEST_RUN_FAILED),
        "{output}"
    );
    assert!(output.stdout_as_str().contains(FULL_SUMMARY), "{output}");

    let launches = suite.launches().expect("read launches");
    assert_eq!(launches.len(), 3, "one collecting instance, then one per file");
    assert_eq!(launches.iter().filter(|launch| launch.is_collect()).count(), 1);

    let mut file_filters: Vec<_> = launches
        .iter()
        .filter(|launch| !launch.is_collect())
        .filter_map(|launch| {
            launch
                .engine_args()
                .into_iter()
                .find(|arg| arg.starts_with("python_files="))
        })
        .collect();
    file_filters.sort();
    assert_eq!(
        file_filters,
        ["python_files='pkg/test_cls.py'", "python_files='test_math.py'"]
    );
}

#[test]
fn crashed_worker_does_not_sink_the_run() {
    let suite = empty_suite();
    suite
        .write_file("test_ok.py", "def test_fine():\n    assert True\n")
        .and_then(|suite| {
            suite.write_file(
                "test_crash.py",
                "# fake-host: crash\ndef test_never():\n    assert True\n",
            )
        })
        .expect("wrote test files");

    let output = hostest(&suite)
        .args(["run", suite.dir().as_str(), "--independent"])
        .output();

    let stdout = output.stdout_as_str();
    assert!(stdout.contains("test_ok.py::test_fine"), "{output}");
    assert!(!stdout.contains("test_never"), "{output}");
    assert!(
        stdout.contains("Summary 1 executed: 1 passed, 0 failed, 0 skipped"),
        "{output}"
    );
}

#[test]
fn collect_prints_tree() {
    let suite = sample_suite();

    let output = hostest(&suite)
        .args(["collect", suite.dir().as_str()])
        .output();

    assert_eq!(
        output.stdout_as_str(),
        "pkg/test_cls.py\n    TestThing::test_one\n\
         test_math.py\n    test_add\n    test_sub\n    test_skip\n"
    );
    let launches = suite.launches().expect("read launches");
    assert_eq!(launches.len(), 1);
    assert!(launches[0].is_collect());
}

#[test]
fn patterns_are_remembered() {
    let suite = sample_suite();

    let output = hostest(&suite)
        .args(["run", suite.dir().as_str(), "-E", "test_math*", "-k", "add"])
        .output();
    assert!(
        output
            .stdout_as_str()
            .contains("Summary 1 executed: 1 passed, 0 failed, 0 skipped"),
        "{output}"
    );

    // No directory or patterns: the last ones are used.
    let output = hostest(&suite).arg("run").output();
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("test_math.py::test_add"), "{output}");
    assert!(!stdout.contains("test_one"), "{output}");

    let dir = suite.dir().canonicalize_utf8().expect("suite dir exists");
    let output = hostest(&suite).args(["settings", "show"]).output();
    let stdout = output.stdout_as_str();
    assert!(stdout.contains(&format!("lastPath = {dir}\n")), "{output}");
    assert!(stdout.contains("lastFilePattern = test_math*\n"), "{output}");
    assert!(stdout.contains("lastFunctionPattern = add\n"), "{output}");

    // An explicit empty expression clears the remembered one.
    let output = hostest(&suite)
        .args(["run", "-k", "", "-E", ""])
        .unchecked(true)
        .output();
    assert!(output.stdout_as_str().contains(FULL_SUMMARY), "{output}");
}

#[test]
fn excluding_expression() {
    let suite = sample_suite();

    let output = hostest(&suite)
        .args(["run", suite.dir().as_str(), "-k", "not sub"])
        .output();

    let stdout = output.stdout_as_str();
    assert!(!stdout.contains("test_sub"), "{output}");
    assert!(
        stdout.contains("Summary 3 executed: 2 passed, 0 failed, 1 skipped"),
        "{output}"
    );
}

#[test]
fn no_tests_run() {
    let suite = empty_suite();

    let output = hostest(&suite)
        .args(["run", suite.dir().as_str()])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_code(),
        Some(HostestExitCode::NO_TESTS_RUN),
        "{output}"
    );

    let output = hostest(&suite)
        .args(["collect", suite.dir().as_str()])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_code(),
        Some(HostestExitCode::NO_TESTS_RUN),
        "{output}"
    );
}

#[test]
fn setup_errors() {
    let suite = sample_suite();

    let missing = suite.scratch_path("does-not-exist");
    let output = hostest(&suite)
        .args(["run", missing.as_str()])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_code(),
        Some(HostestExitCode::SETUP_ERROR),
        "{output}"
    );
    assert!(output.stderr_as_str().contains("not found"), "{output}");

    // Nothing was remembered, so a bare run has no directory.
    let output = hostest(&suite).arg("run").unchecked(true).output();
    assert_eq!(
        output.exit_code(),
        Some(HostestExitCode::SETUP_ERROR),
        "{output}"
    );

    let config = suite.scratch_path("no-host.toml");
    fs::write(&config, "[host]\ncheck-requirements = false\n").expect("wrote config");
    let output = hostest(&suite)
        .args([
            "run",
            suite.dir().as_str(),
            "--config-file",
            config.as_str(),
        ])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_code(),
        Some(HostestExitCode::SETUP_ERROR),
        "{output}"
    );
    assert!(suite.launches().expect("read launches").is_empty());
}

#[test]
fn settings_commands() {
    let suite = sample_suite();

    hostest(&suite)
        .args(["settings", "set", "nParallelInstances", "3"])
        .output();
    hostest(&suite)
        .args(["settings", "set", "lastFunctionPattern", r#""add""#])
        .output();
    let output = hostest(&suite).args(["settings", "show"]).output();
    let stdout = output.stdout_as_str();
    assert!(
        stdout.contains("lastRunSettings.nParallelInstances = 3\n"),
        "{output}"
    );
    assert!(stdout.contains("lastFunctionPattern = add\n"), "{output}");

    let output = hostest(&suite)
        .args(["settings", "set", "noSuchSetting", "1"])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_code(),
        Some(HostestExitCode::SETUP_ERROR),
        "{output}"
    );
    assert!(output.stderr_as_str().contains("unknown setting"), "{output}");

    let output = hostest(&suite)
        .args(["settings", "set", "nParallelInstances", "three"])
        .unchecked(true)
        .output();
    assert_eq!(
        output.exit_code(),
        Some(HostestExitCode::SETUP_ERROR),
        "{output}"
    );

    hostest(&suite).args(["settings", "reset"]).output();
    let output = hostest(&suite).args(["settings", "show"]).output();
    let stdout = output.stdout_as_str();
    assert!(stdout.contains("lastFunctionPattern = <unset>\n"), "{output}");
    assert!(
        stdout.contains("lastRunSettings.nParallelInstances = 1\n"),
        "{output}"
    );
}

#[cfg(unix)]
#[test]
fn interrupt_stops_workers() {
    use integration_tests::hostest_cli::HostestOutput;
    use std::time::{Duration, Instant};

    let suite = empty_suite();
    suite
        .write_file(
            "test_slow.py",
            "# fake-host: sleep 60\ndef test_slow():\n    assert True\n",
        )
        .expect("wrote test file");

    let (command, child) = hostest(&suite)
        .args(["run", suite.dir().as_str()])
        .spawn();

    // Wait for the host to start.
    let deadline = Instant::now() + Duration::from_secs(30);
    let launch = loop {
        if let Some(launch) = suite.launches().ok().and_then(|l| l.into_iter().next()) {
            break launch;
        }
        assert!(Instant::now() < deadline, "host never started");
        std::thread::sleep(Duration::from_millis(50));
    };
    let host_pid = launch.pid().expect("launch records a pid") as libc::pid_t;

    let hostest_pid = child.id() as libc::pid_t;
    // SAFETY: sending a signal to a child process this test owns.
    let ret = unsafe { libc::kill(hostest_pid, libc::SIGINT) };
    assert_eq!(ret, 0, "sent SIGINT");

    let output = HostestOutput::from_child(command, child);
    assert_eq!(output.exit_code(), Some(HostestExitCode::CANCELED), "{output}");

    // The killed host may take a moment to be reaped.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        // SAFETY: signal 0 only checks whether the process exists.
        let alive = unsafe { libc::kill(host_pid, 0) } == 0;
        if !alive {
            break;
        }
        assert!(Instant::now() < deadline, "host {host_pid} still running");
        std::thread::sleep(Duration::from_millis(50));
    }
}
