// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Everything a worker's bootstrap script needs to run the test engine.
///
/// Written by the orchestrator next to the bootstrap script, and read back by the script once the
/// host application has started.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerInvocation {
    /// The directory the test engine runs in.
    pub directory: Utf8PathBuf,

    /// Where the test engine writes its report.
    pub report_path: Utf8PathBuf,

    /// The full argument list handed to the test engine, target directory first.
    pub engine_args: Vec<String>,

    /// The run settings, in their serialized key-value form.
    pub run_settings: serde_json::Value,
}

impl WorkerInvocation {
    /// Prefix of the line in a bootstrap script that names its invocation file.
    pub const SCRIPT_MARKER: &'static str = "INVOCATION_PATH = ";

    /// Returns the bootstrap script line naming `path`.
    ///
    /// The path is written as a JSON string, which is also a valid Python string literal.
    pub fn script_line(path: &Utf8Path) -> String {
        // Serializing a string can't fail.
        let literal = serde_json::to_string(path.as_str()).unwrap_or_default();
        format!("{}{literal}", Self::SCRIPT_MARKER)
    }

    /// Finds the invocation path named by a bootstrap script, if any.
    pub fn path_from_script(script: &str) -> Option<Utf8PathBuf> {
        script.lines().find_map(|line| {
            let literal = line.strip_prefix(Self::SCRIPT_MARKER)?;
            serde_json::from_str::<String>(literal.trim_end())
                .ok()
                .map(Utf8PathBuf::from)
        })
    }
}
