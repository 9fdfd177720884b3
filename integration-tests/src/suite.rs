// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::hostest_cli::HostestCli;
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::Result;
use fs_err as fs;
use serde_json::Value;

/// A temporary test suite, configured to run under the fake host.
///
/// The temporary directory holds the suite itself, a settings file private to the suite and a
/// directory the fake host logs its launches to.
#[derive(Debug)]
pub struct TempSuite {
    temp_dir: Utf8TempDir,
    dir: Utf8PathBuf,
    settings_file: Utf8PathBuf,
    log_dir: Utf8PathBuf,
}

impl TempSuite {
    /// Creates an empty suite whose config points at `fake_host`.
    pub fn new(fake_host: &Utf8Path) -> Result<Self> {
        let temp_dir = camino_tempfile::Builder::new()
            .prefix("hostest-suite-")
            .tempdir()?;
        let dir = temp_dir.path().join("suite");
        let log_dir = temp_dir.path().join("launches");
        fs::create_dir_all(dir.join(".config"))?;
        fs::create_dir_all(&log_dir)?;

        // Literal strings, so Windows paths don't need escaping.
        let config = format!(
            "[host]\n\
             executable = '{fake_host}'\n\
             check-requirements = false\n"
        );
        fs::write(dir.join(".config/hostest.toml"), config)?;

        let settings_file = temp_dir.path().join("settings.toml");
        Ok(Self {
            temp_dir,
            dir,
            settings_file,
            log_dir,
        })
    }

    /// Writes a test file at `relative` within the suite.
    pub fn write_file(&self, relative: &str, contents: &str) -> Result<&Self> {
        let path = self.dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(self)
    }

    /// The suite directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// The settings file hostest uses for this suite.
    pub fn settings_file(&self) -> &Utf8Path {
        &self.settings_file
    }

    /// A path within the temporary directory but outside the suite.
    pub fn scratch_path(&self, name: &str) -> Utf8PathBuf {
        self.temp_dir.path().join(name)
    }

    /// A hostest command using this suite's settings file and launch log.
    pub fn cli(&self, bin: &str) -> HostestCli {
        let mut cli = HostestCli::new(bin);
        cli.env("HOSTEST_SETTINGS_FILE", self.settings_file.as_str())
            .env("FAKE_HOST_LOG_DIR", self.log_dir.as_str());
        cli
    }

    /// Every host launch the fake host logged, sorted by report name.
    pub fn launches(&self) -> Result<Vec<Launch>> {
        let mut launches = Vec::new();
        for entry in self.log_dir.read_dir_utf8()? {
            let entry = entry?;
            let record: Value = serde_json::from_str(&fs::read_to_string(entry.path())?)?;
            launches.push(Launch {
                name: entry.file_name().to_owned(),
                record,
            });
        }
        launches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(launches)
    }
}

/// One launch of the fake host.
#[derive(Clone, Debug)]
pub struct Launch {
    pub name: String,
    pub record: Value,
}

impl Launch {
    /// The process id of the launched host.
    pub fn pid(&self) -> Option<u64> {
        self.record["pid"].as_u64()
    }

    /// The arguments handed to the test engine.
    pub fn engine_args(&self) -> Vec<String> {
        self.record["engine-args"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|arg| arg.as_str().map(str::to_owned))
            .collect()
    }

    pub fn is_collect(&self) -> bool {
        self.engine_args().iter().any(|arg| arg == "--collect-only")
    }
}
