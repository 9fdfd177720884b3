// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable display of results.

use hostest_runner::{
    case::{Case, Outcome},
    results::{CaseFilter, Results},
};
use itertools::Itertools;
use owo_colors::{OwoColorize, Style, style};
use std::io::{self, Write};

/// Writes results to a terminal.
#[derive(Debug)]
pub(crate) struct ResultsReporter {
    filter: CaseFilter,
    styles: Styles,
}

impl ResultsReporter {
    pub(crate) fn new(filter: CaseFilter) -> Self {
        Self {
            filter,
            styles: Styles::default(),
        }
    }

    pub(crate) fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Writes one status line per displayed case, then the details of every failing case, then a
    /// summary line.
    pub(crate) fn write_results(&self, results: &Results, mut writer: impl Write) -> io::Result<()> {
        for case in results.filtered(&self.filter) {
            self.write_status_line(case, &mut writer)?;
        }

        let failing = results.failing_cases();
        if !failing.is_empty() {
            writeln!(writer)?;
            for case in &failing {
                writeln!(
                    writer,
                    "{} {}",
                    "---".style(self.styles.fail),
                    case.node_id.style(self.styles.bold)
                )?;
                writeln!(writer, "{}\n", case.debug_string())?;
            }
        }

        let summary_style = if failing.is_empty() {
            self.styles.pass
        } else {
            self.styles.fail
        };
        writeln!(writer, "{}", "------------".style(summary_style))?;
        writeln!(
            writer,
            "{} {}",
            "Summary".style(summary_style),
            results.summary_string()
        )
    }

    /// Writes the collected test tree: each file, then its test ids indented below it.
    pub(crate) fn write_collected(&self, results: &Results, mut writer: impl Write) -> io::Result<()> {
        let by_file = results
            .all_cases()
            .iter()
            .into_group_map_by(|case| case.file_path().to_owned());
        for file in results.file_paths() {
            writeln!(writer, "{}", file.style(self.styles.bold))?;
            for case in by_file.get(file).into_iter().flatten() {
                let rest = case
                    .node_id
                    .strip_prefix(file)
                    .and_then(|rest| rest.strip_prefix("::"))
                    .unwrap_or(&case.node_id);
                writeln!(writer, "    {rest}")?;
            }
        }

        // Collection errors have no file of their own in the tree.
        for case in results.failing_cases() {
            writeln!(writer, "{}", case.debug_string().style(self.styles.fail))?;
        }
        Ok(())
    }

    fn write_status_line(&self, case: &Case, writer: &mut impl Write) -> io::Result<()> {
        let (label, label_style) = match case.outcome {
            Outcome::Passed => ("PASS", self.styles.pass),
            Outcome::Xfailed => ("XFAIL", self.styles.pass),
            Outcome::Xpassed => ("XPASS", self.styles.pass),
            Outcome::Failed => ("FAIL", self.styles.fail),
            Outcome::Error => ("ERROR", self.styles.fail),
            Outcome::Unknown => ("UNKNOWN", self.styles.fail),
            Outcome::Skipped => ("SKIP", self.styles.skip),
            Outcome::Collected => ("COLLECT", self.styles.skip),
        };
        writeln!(
            writer,
            "{:>12} [{:>8.3}s] {}",
            label.style(label_style),
            case.duration.as_secs_f64(),
            case.node_id
        )
    }
}

#[derive(Debug, Default)]
struct Styles {
    bold: Style,
    pass: Style,
    fail: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.bold = style().bold();
        self.pass = style().green().bold();
        self.fail = style().red().bold();
        self.skip = style().yellow().bold();
    }
}
