// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The generated files a worker runs from.

use camino::Utf8Path;
use chrono::{DateTime, Local};
use hostest_metadata::WorkerInvocation;
use swrite::{SWrite, swriteln};

/// Placeholder in extra engine arguments replaced by the launch time.
pub const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";

/// Placeholder in extra engine arguments replaced by a suffix unique to each launch.
pub const FILENAME_SUFFIX_PLACEHOLDER: &str = "{filename_suffix}";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S.%6f";

/// The full argument list for the test engine.
///
/// The target directory comes first, followed by the report outputs and capture options, then
/// `extra` with placeholders substituted. The JUnit and HTML reports sit next to the JSON report.
pub fn engine_args(
    target: &Utf8Path,
    report_path: &Utf8Path,
    extra: &[String],
    now: DateTime<Local>,
    suffix: &str,
) -> Vec<String> {
    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    let mut args = vec![
        target.to_string(),
        "--json-report".to_owned(),
        format!("--json-report-file={report_path}"),
        format!("--junitxml={}", report_path.with_extension("xml")),
        format!("--html={}", report_path.with_extension("html")),
        "--capture=tee-sys".to_owned(),
        "--cache-clear".to_owned(),
    ];
    args.extend(extra.iter().map(|arg| {
        arg.replace(TIMESTAMP_PLACEHOLDER, &timestamp)
            .replace(FILENAME_SUFFIX_PLACEHOLDER, suffix)
    }));
    args
}

/// Renders the script the host application runs.
///
/// The script loads the invocation at `invocation_path`, changes into the test directory,
/// minimizes the host's main window if asked to, and runs the engine, optionally under coverage.
/// It exits the host with the engine's exit code only if the settings ask for it.
pub fn render_script(invocation_path: &Utf8Path, host_module: Option<&str>) -> String {
    let host_module = match host_module {
        Some(module) => serde_json::to_string(module).unwrap_or_else(|_| "None".to_owned()),
        None => "None".to_owned(),
    };

    let mut script = String::new();
    swriteln!(script, "# Generated by hostest. Do not edit.");
    swriteln!(script, "import importlib");
    swriteln!(script, "import json");
    swriteln!(script, "import os");
    swriteln!(script, "import sys");
    swriteln!(script, "import traceback");
    script.push('\n');
    swriteln!(script, "{}", WorkerInvocation::script_line(invocation_path));
    swriteln!(script, "HOST_MODULE = {host_module}");
    script.push_str(SCRIPT_BODY);
    script
}

const SCRIPT_BODY: &str = r#"
with open(INVOCATION_PATH, encoding="utf-8") as f:
    invocation = json.load(f)
settings = invocation["run-settings"]
os.chdir(invocation["directory"])

exit_f = sys.exit
if HOST_MODULE:
    try:
        host = importlib.import_module(HOST_MODULE)
        window = host.util.mainWindow()
        if window and settings.get("doMinimizeMainWindow", True):
            window.showMinimized()
        exit_f = host.util.exit
    except (ImportError, AttributeError):
        pass


def run_engine():
    try:
        import pytest

        return int(pytest.main(invocation["engine-args"]))
    except Exception:
        traceback.print_exc()
        return 1


if settings.get("doRunCoverage", False):
    try:
        from coverage import Coverage

        cov = Coverage(source=settings.get("coverageSources"), data_suffix=True)
        cov.start()
        ret = run_engine()
        cov.stop()
        cov.save()
    except Exception:
        traceback.print_exc()
        ret = 1
else:
    ret = run_engine()

if settings.get("doCloseHostAfterRun", True):
    exit_f(ret)
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn engine_args_order_and_substitution() {
        let now = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("unambiguous local time");
        let args = engine_args(
            Utf8Path::new("/tests"),
            Utf8Path::new("/tmp/hostest_report_3.json"),
            &[
                "--cov-report=cov_{timestamp}.xml".to_owned(),
                "--data={filename_suffix}".to_owned(),
                "-x".to_owned(),
            ],
            now,
            "123.7",
        );
        assert_eq!(
            args,
            [
                "/tests",
                "--json-report",
                "--json-report-file=/tmp/hostest_report_3.json",
                "--junitxml=/tmp/hostest_report_3.xml",
                "--html=/tmp/hostest_report_3.html",
                "--capture=tee-sys",
                "--cache-clear",
                "--cov-report=cov_2024-03-09_14-05-07.000000.xml",
                "--data=123.7",
                "-x",
            ]
        );
    }

    #[test]
    fn script_names_its_invocation() {
        let invocation = Utf8Path::new("/tmp/scratch/hostest_invocation_0.json");
        let script = render_script(invocation, Some("slicer"));
        assert_eq!(
            WorkerInvocation::path_from_script(&script).as_deref(),
            Some(invocation)
        );
        assert!(script.contains("HOST_MODULE = \"slicer\"\n"));
        assert!(script.contains("exit_f(ret)"));
    }

    #[test]
    fn script_without_host_module() {
        let script = render_script(Utf8Path::new("/tmp/i.json"), None);
        assert!(script.contains("HOST_MODULE = None\n"));
    }
}
