// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A fake host application for testing hostest without a real host or test engine.
//!
//! It is launched the way hostest launches any host: `fake-host --python-script SCRIPT [ARGS]`.
//! Instead of running the script, it reads the worker invocation the script names and acts as the
//! test engine would:
//!
//! - Test files are `test_*.py` under the invocation's directory, or the files matching a
//!   `-o python_files=PATTERN` engine argument. A pattern containing `/` is matched against the
//!   path relative to the directory, otherwise against the file name.
//! - Tests are `def test_*` functions, optionally inside `class Test*` blocks.
//! - A test fails if its body contains `assert False` and is skipped if it contains
//!   `pytest.skip`. Every other test passes.
//! - `-k EXPR` keeps tests whose names contain EXPR, or with `not EXPR`, those that don't.
//! - `--collect-only` reports collected items instead of running them.
//!
//! Test files may carry directives:
//!
//! - `# fake-host: sleep N` sleeps N seconds before the report is written.
//! - `# fake-host: crash` exits with code 3 without writing a report, unless only collecting.
//! - `# fake-host: collection-error` reports the file as failing to collect.
//!
//! If `FAKE_HOST_LOG_DIR` is set, every launch writes its command line and pid there, to a file
//! named after its report.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{
    Result,
    eyre::{Context, bail, eyre},
};
use fs_err as fs;
use globset::{Glob, GlobMatcher};
use hostest_metadata::{
    RawCollectedItem, RawCollector, RawPhase, RawReport, RawTestEntry, WorkerInvocation,
};
use std::{process::exit, time::Duration};

const RUN_SCRIPT_FLAG: &str = "--python-script";
const DEFAULT_FILE_PATTERN: &str = "test_*.py";
const DIRECTIVE: &str = "# fake-host:";

fn main() -> Result<()> {
    color_eyre::install()?;

    let args: Vec<String> = std::env::args().collect();
    let invocation = read_invocation(&args)?;
    log_launch(&args, &invocation)?;

    let options = EngineOptions::parse(&invocation.engine_args)?;
    let files = find_test_files(&invocation.directory, &options.file_matcher()?)?;

    let mut report = RawReport {
        root: invocation.directory.to_string(),
        ..Default::default()
    };
    let mut sleep = Duration::ZERO;
    let mut session_items = Vec::new();
    let mut any_failed = false;

    for file in &files {
        let source = fs::read_to_string(invocation.directory.join(file))?;
        let directives = Directives::parse(&source);
        if directives.crash && !options.collect_only {
            eprintln!("[fake-host] crashing while running {file}");
            exit(3);
        }
        sleep = sleep.max(directives.sleep);

        session_items.push(RawCollectedItem {
            nodeid: file.to_string(),
            kind: "Module".to_owned(),
            ..Default::default()
        });
        if directives.collection_error {
            any_failed = true;
            report.collectors.push(RawCollector {
                nodeid: file.to_string(),
                outcome: "failed".to_owned(),
                longrepr: format!("ImportError while importing test module '{file}'"),
                result: Vec::new(),
            });
            continue;
        }

        let tests: Vec<_> = parse_tests(file.as_str(), &source)
            .into_iter()
            .filter(|test| options.selects(&test.nodeid))
            .collect();
        if options.collect_only {
            report.collectors.push(RawCollector {
                nodeid: file.to_string(),
                outcome: "passed".to_owned(),
                longrepr: String::new(),
                result: tests
                    .iter()
                    .map(|test| RawCollectedItem {
                        nodeid: test.nodeid.clone(),
                        kind: "Function".to_owned(),
                        ..Default::default()
                    })
                    .collect(),
            });
        } else {
            for test in tests {
                any_failed |= test.outcome == "failed";
                report.tests.push(test.into_entry());
            }
        }
    }

    if options.collect_only {
        report.collectors.insert(
            0,
            RawCollector {
                nodeid: String::new(),
                outcome: "passed".to_owned(),
                longrepr: String::new(),
                result: session_items,
            },
        );
    }

    if !sleep.is_zero() {
        std::thread::sleep(sleep);
    }

    let json = report.to_json()?;
    fs::write(&invocation.report_path, json)?;

    let code = if report.tests.is_empty() && report.collectors.is_empty() {
        5
    } else if any_failed {
        1
    } else {
        0
    };
    exit(code)
}

fn read_invocation(args: &[String]) -> Result<WorkerInvocation> {
    let script = args
        .iter()
        .position(|arg| arg == RUN_SCRIPT_FLAG)
        .and_then(|idx| args.get(idx + 1))
        .ok_or_else(|| eyre!("expected {RUN_SCRIPT_FLAG} SCRIPT in {args:?}"))?;
    let script = fs::read_to_string(script)?;
    let path = WorkerInvocation::path_from_script(&script)
        .ok_or_else(|| eyre!("script doesn't name an invocation file"))?;
    let invocation = fs::read_to_string(&path)?;
    serde_json::from_str(&invocation).wrap_err_with(|| format!("invalid invocation at {path}"))
}

fn log_launch(args: &[String], invocation: &WorkerInvocation) -> Result<()> {
    let Some(dir) = std::env::var_os("FAKE_HOST_LOG_DIR") else {
        return Ok(());
    };
    let dir = Utf8PathBuf::try_from(std::path::PathBuf::from(dir))?;
    let name = invocation
        .report_path
        .file_name()
        .ok_or_else(|| eyre!("report path has no file name"))?;
    let record = serde_json::json!({
        "pid": std::process::id(),
        "args": args,
        "engine-args": invocation.engine_args,
    });
    fs::write(dir.join(name), record.to_string())?;
    Ok(())
}

#[derive(Debug, Default)]
struct EngineOptions {
    collect_only: bool,
    expression: Option<String>,
    file_pattern: Option<String>,
}

impl EngineOptions {
    fn parse(engine_args: &[String]) -> Result<Self> {
        let mut options = Self::default();
        // The first argument is the target directory.
        let mut args = engine_args.iter().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--collect-only" => options.collect_only = true,
                "-k" => {
                    let expr = args.next().ok_or_else(|| eyre!("-k needs a value"))?;
                    options.expression = Some(expr.clone());
                }
                "-o" => {
                    let value = args.next().ok_or_else(|| eyre!("-o needs a value"))?;
                    // The engine reads ini values shell-style, so quotes are stripped.
                    let words = shell_words::split(value)?;
                    for word in words {
                        if let Some(pattern) = word.strip_prefix("python_files=") {
                            options.file_pattern = Some(pattern.to_owned());
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(options)
    }

    fn file_matcher(&self) -> Result<FileMatcher> {
        let pattern = self.file_pattern.as_deref().unwrap_or(DEFAULT_FILE_PATTERN);
        Ok(FileMatcher {
            matcher: Glob::new(pattern)?.compile_matcher(),
            full_path: pattern.contains('/'),
        })
    }

    fn selects(&self, nodeid: &str) -> bool {
        let name = nodeid.rsplit("::").next().unwrap_or(nodeid);
        match self.expression.as_deref() {
            None => true,
            Some(expr) => match expr.strip_prefix("not ") {
                Some(excluded) => !name.contains(excluded.trim()),
                None => name.contains(expr.trim()),
            },
        }
    }
}

struct FileMatcher {
    matcher: GlobMatcher,
    full_path: bool,
}

impl FileMatcher {
    fn is_match(&self, relative: &Utf8Path) -> bool {
        if self.full_path {
            self.matcher.is_match(relative.as_std_path())
        } else {
            relative
                .file_name()
                .is_some_and(|name| self.matcher.is_match(name))
        }
    }
}

/// Returns the matching files below `root`, relative to it, in sorted order.
fn find_test_files(root: &Utf8Path, matcher: &FileMatcher) -> Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![Utf8PathBuf::new()];
    while let Some(relative) = pending.pop() {
        for entry in root.join(&relative).read_dir_utf8()? {
            let entry = entry?;
            let name = entry.file_name();
            if name.starts_with('.') {
                continue;
            }
            let path = relative.join(name);
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if path.extension() == Some("py") && matcher.is_match(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    if files.is_empty() && !root.is_dir() {
        bail!("{root} is not a directory");
    }
    Ok(files)
}

#[derive(Debug, Default)]
struct Directives {
    sleep: Duration,
    crash: bool,
    collection_error: bool,
}

impl Directives {
    fn parse(source: &str) -> Self {
        let mut directives = Self::default();
        for line in source.lines() {
            let Some(directive) = line.trim().strip_prefix(DIRECTIVE) else {
                continue;
            };
            let mut words = directive.split_whitespace();
            match words.next() {
                Some("sleep") => {
                    let secs = words.next().and_then(|n| n.parse().ok()).unwrap_or(0);
                    directives.sleep = Duration::from_secs(secs);
                }
                Some("crash") => directives.crash = true,
                Some("collection-error") => directives.collection_error = true,
                _ => {}
            }
        }
        directives
    }
}

struct FakeTest {
    nodeid: String,
    outcome: &'static str,
    longrepr: String,
}

impl FakeTest {
    fn into_entry(self) -> RawTestEntry {
        let phase = |outcome: &str, longrepr: String| RawPhase {
            duration: 0.001,
            outcome: outcome.to_owned(),
            longrepr,
            ..Default::default()
        };
        RawTestEntry {
            outcome: self.outcome.to_owned(),
            setup: Some(phase("passed", String::new())),
            call: Some(phase(self.outcome, self.longrepr)),
            teardown: Some(phase("passed", String::new())),
            nodeid: self.nodeid,
        }
    }
}

/// Finds the tests in a file, in source order.
fn parse_tests(file: &str, source: &str) -> Vec<FakeTest> {
    let lines: Vec<&str> = source.lines().collect();
    let mut tests = Vec::new();
    let mut class: Option<(&str, usize)> = None;

    for (idx, line) in lines.iter().enumerate() {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        if class.is_some_and(|(_, class_indent)| indent <= class_indent) {
            class = None;
        }

        if let Some(rest) = trimmed.strip_prefix("class ") {
            let name = rest.split(['(', ':']).next().unwrap_or("").trim();
            if name.starts_with("Test") {
                class = Some((name, indent));
            }
            continue;
        }

        let Some(rest) = trimmed.strip_prefix("def ") else {
            continue;
        };
        let name = rest.split('(').next().unwrap_or("").trim();
        if !name.starts_with("test") {
            continue;
        }

        let body: Vec<&str> = lines[idx + 1..]
            .iter()
            .take_while(|body_line| {
                body_line.trim().is_empty()
                    || body_line.len() - body_line.trim_start().len() > indent
            })
            .copied()
            .collect();
        let (outcome, longrepr) = if body.iter().any(|l| l.contains("assert False")) {
            ("failed", format!("{file}: AssertionError in {name}"))
        } else if body.iter().any(|l| l.contains("pytest.skip")) {
            ("skipped", format!("Skipped: {name}"))
        } else {
            ("passed", String::new())
        };

        let nodeid = match class {
            Some((class, _)) => format!("{file}::{class}::{name}"),
            None => format!("{file}::{name}"),
        };
        tests.push(FakeTest {
            nodeid,
            outcome,
            longrepr,
        });
    }
    tests
}
