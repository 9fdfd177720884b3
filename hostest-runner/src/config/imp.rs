// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ParallelInstances;
use crate::errors::ConfigParseError;
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use tracing::debug;

/// Overall configuration for hostest.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostestConfig {
    host: HostConfig,
    run: RunConfig,
}

impl HostestConfig {
    /// The default location of the config within a test directory.
    pub const CONFIG_PATH: &'static str = ".config/hostest.toml";

    /// Contains the default config as a TOML file.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Environment configuration uses this prefix, plus a _. Nested keys are separated by `__`.
    pub const ENVIRONMENT_PREFIX: &'static str = "HOSTEST";

    /// Reads the config for tests in `directory`.
    ///
    /// If `config_file` is given it must exist. Otherwise `.config/hostest.toml` in `directory` is
    /// used if present.
    pub fn from_sources(
        directory: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, required) = match config_file {
            Some(file) => (file.to_owned(), true),
            None => (directory.join(Self::CONFIG_PATH), false),
        };
        debug!("reading config from {config_file} (required: {required})");

        let builder = Self::make_default_config()
            .add_source(File::new(config_file.as_str(), FileFormat::Toml).required(required))
            .add_source(Environment::with_prefix(Self::ENVIRONMENT_PREFIX).separator("__"));
        Self::build_and_deserialize_config(&builder)
            .map_err(|err| ConfigParseError::new(config_file, err))
    }

    /// Returns the default config, with no files or environment applied.
    pub fn default_config() -> Result<Self, ConfigParseError> {
        Self::build_and_deserialize_config(&Self::make_default_config())
            .map_err(|err| ConfigParseError::new("<default config>", err))
    }

    /// The host section.
    pub fn host(&self) -> &HostConfig {
        &self.host
    }

    /// Mutable access to the host section, for command-line overrides.
    pub fn host_mut(&mut self) -> &mut HostConfig {
        &mut self.host
    }

    /// The run section.
    pub fn run(&self) -> &RunConfig {
        &self.run
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder.build_cloned()?.try_deserialize()
    }
}

/// How to launch the host application.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct HostConfig {
    #[serde(default)]
    executable: Option<Utf8PathBuf>,
    python: Utf8PathBuf,
    #[serde(alias = "run_script_flag")]
    run_script_flag: String,
    #[serde(alias = "no_main_window_flag")]
    no_main_window_flag: String,
    #[serde(default, alias = "host_module")]
    host_module: Option<String>,
    #[serde(default = "default_true", alias = "check_requirements")]
    check_requirements: bool,
}

fn default_true() -> bool {
    true
}

impl HostConfig {
    /// Creates a host config for the given executable with the default flags.
    pub fn new(executable: impl Into<Utf8PathBuf>, python: impl Into<Utf8PathBuf>) -> Self {
        Self {
            executable: Some(executable.into()),
            python: python.into(),
            run_script_flag: "--python-script".to_owned(),
            no_main_window_flag: "--no-main-window".to_owned(),
            host_module: None,
            check_requirements: true,
        }
    }

    /// The host executable, if configured.
    pub fn executable(&self) -> Option<&Utf8Path> {
        self.executable.as_deref()
    }

    /// Overrides the host executable.
    pub fn set_executable(&mut self, executable: impl Into<Utf8PathBuf>) -> &mut Self {
        self.executable = Some(executable.into());
        self
    }

    /// The interpreter used outside the host.
    pub fn python(&self) -> &Utf8Path {
        &self.python
    }

    /// The flag telling the host to run a script.
    pub fn run_script_flag(&self) -> &str {
        &self.run_script_flag
    }

    /// The flag telling the host not to show its main window.
    pub fn no_main_window_flag(&self) -> &str {
        &self.no_main_window_flag
    }

    /// The scripting module available inside the host, if any.
    pub fn host_module(&self) -> Option<&str> {
        self.host_module.as_deref()
    }

    /// Whether the tooling workers need is checked (and installed if missing) before a run.
    pub fn check_requirements(&self) -> bool {
        self.check_requirements
    }

    /// Sets whether requirements are checked before a run.
    pub fn set_check_requirements(&mut self, check: bool) -> &mut Self {
        self.check_requirements = check;
        self
    }

    /// Sets the scripting module available inside the host.
    pub fn set_host_module(&mut self, module: Option<String>) -> &mut Self {
        self.host_module = module;
        self
    }
}

/// Defaults for runs.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    #[serde(alias = "parallel_instances")]
    parallel_instances: ParallelInstances,
}

impl RunConfig {
    /// The configured number of parallel workers.
    pub fn parallel_instances(&self) -> ParallelInstances {
        self.parallel_instances
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;

    #[test]
    fn default_config_is_valid() {
        let config = HostestConfig::default_config().expect("default config is valid");
        assert_eq!(config.host().executable(), None);
        assert_eq!(config.host().run_script_flag(), "--python-script");
        assert_eq!(config.host().no_main_window_flag(), "--no-main-window");
        assert_eq!(config.host().host_module(), None);
        assert!(config.host().check_requirements());
        assert_eq!(config.run().parallel_instances(), ParallelInstances::Count(1));
    }

    #[test]
    fn repository_config_overrides_defaults() {
        let dir = tempdir().expect("tempdir created");
        std::fs::create_dir(dir.path().join(".config")).expect("created .config");
        std::fs::write(
            dir.path().join(HostestConfig::CONFIG_PATH),
            indoc! {r#"
                [host]
                executable = "/opt/host/HostApp"
                host-module = "slicer"
                check-requirements = false

                [run]
                parallel-instances = "num-cpus"
            "#},
        )
        .expect("wrote config");

        let config = HostestConfig::from_sources(dir.path(), None).expect("config parses");
        assert_eq!(
            config.host().executable(),
            Some(Utf8Path::new("/opt/host/HostApp"))
        );
        assert_eq!(config.host().host_module(), Some("slicer"));
        assert!(!config.host().check_requirements());
        assert_eq!(config.host().python(), "python3", "unset keys keep defaults");
        assert_eq!(config.run().parallel_instances(), ParallelInstances::NumCpus);
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = tempdir().expect("tempdir created");
        let missing = dir.path().join("missing.toml");
        let error = HostestConfig::from_sources(dir.path(), Some(&missing))
            .expect_err("missing explicit config is an error");
        assert_eq!(error.config_file(), &missing);

        HostestConfig::from_sources(dir.path(), None)
            .expect("missing repository config falls back to defaults");
    }

    #[test]
    fn invalid_config_is_an_error() {
        let dir = tempdir().expect("tempdir created");
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "[run]\nparallel-instances = 0\n").expect("wrote config");
        HostestConfig::from_sources(dir.path(), Some(&file)).expect_err("zero instances rejected");
    }
}
