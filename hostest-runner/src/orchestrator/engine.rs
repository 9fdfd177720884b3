// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::python_cli::PythonCli;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;

/// One call to the test engine.
#[derive(Clone, Copy, Debug)]
pub struct EngineRequest<'a> {
    /// The directory to run tests in.
    pub target: &'a Utf8Path,
    /// Where the engine writes its report.
    pub report_path: &'a Utf8Path,
    /// The full engine argument list, target first.
    pub args: &'a [String],
    /// `Some` to run under coverage instrumentation. The inner value lists the sources to
    /// measure; `None` defers to the local coverage config.
    pub coverage: Option<Option<&'a [String]>>,
}

/// Runs the underlying test engine and returns its exit code.
pub trait TestEngine {
    /// Runs the engine to completion.
    fn run(&self, request: &EngineRequest<'_>) -> io::Result<i32>;
}

/// Runs the engine as `python -m pytest`, wrapped by `python -m coverage run` when coverage is
/// requested.
#[derive(Clone, Debug)]
pub struct PythonEngine {
    python: Utf8PathBuf,
}

impl PythonEngine {
    /// Creates an engine using `python`.
    pub fn new(python: impl Into<Utf8PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn cli<'a>(&self, request: &EngineRequest<'a>) -> PythonCli<'a> {
        let mut cli = match request.coverage {
            Some(coverage_sources) => {
                let mut cli = PythonCli::module(&self.python, "coverage");
                cli.add_args(["run", "--parallel-mode"]);
                if let Some(coverage_sources) = coverage_sources {
                    cli.add_arg(format!("--source={}", coverage_sources.join(",")));
                }
                cli.add_args(["-m", "pytest"]);
                cli
            }
            None => PythonCli::module(&self.python, "pytest"),
        };
        cli.add_args(request.args.iter().map(String::as_str))
            .current_dir(request.target);
        cli
    }
}

impl TestEngine for PythonEngine {
    fn run(&self, request: &EngineRequest<'_>) -> io::Result<i32> {
        let code = self.cli(request).run_inherited()?;
        // Terminated by a signal: report a generic failure.
        Ok(code.unwrap_or(1))
    }
}

/// Terminates the host process once a run is over.
pub trait HostExit {
    /// Exits with `code`. Implementations running inside a real host never return.
    fn exit(&self, code: i32);
}

/// Exits the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessExit;

impl HostExit for ProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_line(coverage: Option<Option<&[String]>>) -> String {
        let args = ["/tests".to_owned(), "-x".to_owned()];
        let request = EngineRequest {
            target: Utf8Path::new("/tests"),
            report_path: Utf8Path::new("/tmp/report.json"),
            args: &args,
            coverage,
        };
        PythonEngine::new("python3").cli(&request).command_line()
    }

    #[test]
    fn plain_engine() {
        assert_eq!(command_line(None), "python3 -m pytest /tests -x");
    }

    #[test]
    fn engine_under_coverage() {
        assert_eq!(
            command_line(Some(None)),
            "python3 -m coverage run --parallel-mode -m pytest /tests -x"
        );
        let sources = ["pkg".to_owned(), "lib".to_owned()];
        assert_eq!(
            command_line(Some(Some(&sources))),
            "python3 -m coverage run --parallel-mode --source=pkg,lib -m pytest /tests -x"
        );
    }
}
