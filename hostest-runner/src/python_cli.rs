// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use std::{borrow::Cow, io, process::Output};
use tracing::{debug, trace};

/// A call to the configured Python interpreter.
#[derive(Clone, Debug)]
pub struct PythonCli<'a> {
    python: Utf8PathBuf,
    args: Vec<Cow<'a, str>>,
    current_dir: Option<&'a Utf8Path>,
}

impl<'a> PythonCli<'a> {
    /// Create a call: `python -m <module>`.
    pub fn module(python: &Utf8Path, module: &'a str) -> Self {
        let mut cli = Self::new(python);
        cli.add_arg("-m").add_arg(module);
        cli
    }

    /// Create a call: `python -c <source>`.
    pub fn code(python: &Utf8Path, source: &'a str) -> Self {
        let mut cli = Self::new(python);
        cli.add_arg("-c").add_arg(source);
        cli
    }

    fn new(python: &Utf8Path) -> Self {
        Self {
            python: python.to_owned(),
            args: vec![],
            current_dir: None,
        }
    }

    /// Appends an argument.
    pub fn add_arg(&mut self, arg: impl Into<Cow<'a, str>>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn add_args<I>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Cow<'a, str>>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the interpreter in `dir`.
    pub fn current_dir(&mut self, dir: &'a Utf8Path) -> &mut Self {
        self.current_dir = Some(dir);
        self
    }

    /// The command line, quoted for display.
    pub fn command_line(&self) -> String {
        shell_words::join(
            std::iter::once(self.python.as_str()).chain(self.args.iter().map(|arg| &**arg)),
        )
    }

    /// Convert the call to a [`duct::Expression`].
    pub fn to_expression(&self) -> duct::Expression {
        let expression = duct::cmd(self.python.as_str(), self.args.iter().map(|arg| &**arg));
        match self.current_dir {
            Some(dir) => expression.dir(dir.as_std_path()),
            None => expression,
        }
    }

    /// Runs the call to completion, capturing standard output and error. A non-zero exit status
    /// is not an error.
    pub fn read(&self) -> io::Result<Output> {
        let expression = self.to_expression();
        trace!("executing command: {:?}", expression);
        let output = expression
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()?;
        if !output.status.success() {
            debug!("`{}` failed with {}", self.command_line(), output.status);
            debug!("stderr:\n{}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(output)
    }

    /// Runs the call to completion with inherited standard streams and returns its exit code, or
    /// `None` if it was terminated by a signal.
    pub fn run_inherited(&self) -> io::Result<Option<i32>> {
        let expression = self.to_expression();
        trace!("executing command: {:?}", expression);
        let output = expression.unchecked().run()?;
        Ok(output.status.code())
    }
}

/// Formats captured output for error messages.
pub(crate) fn output_detail(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim(), stderr.trim()) {
        ("", "") => format!("(no output, {})", output.status),
        (out, "") => out.to_owned(),
        ("", err) => err.to_owned(),
        (out, err) => format!("{out}\n{err}"),
    }
}
