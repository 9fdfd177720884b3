// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted user preferences.
//!
//! Preferences live behind the [`SettingsStore`] key-value interface so the orchestration core
//! never touches global state directly. [`ModuleSettings`] layers typed accessors with defaults on
//! top of any store.

use crate::{errors::SettingsStoreError, results::CaseFilter, run_settings::RunSettings};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use etcetera::{BaseStrategy, HomeDirError, base_strategy::Xdg};
use std::{collections::BTreeMap, io::Write};
use tracing::{debug, warn};

/// A key-value store for preferences.
pub trait SettingsStore {
    /// Returns the stored value for `name`, if any.
    fn get(&self, name: &str) -> Option<String>;

    /// Stores `value` under `name`.
    fn set(&mut self, name: &str, value: String) -> Result<(), SettingsStoreError>;

    /// Removes every stored value.
    fn clear(&mut self) -> Result<(), SettingsStoreError>;
}

/// A store that only lives as long as the process.
#[derive(Clone, Debug, Default)]
pub struct MemorySettingsStore {
    values: BTreeMap<String, String>,
}

impl MemorySettingsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: String) -> Result<(), SettingsStoreError> {
        self.values.insert(name.to_owned(), value);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SettingsStoreError> {
        self.values.clear();
        Ok(())
    }
}

/// A store backed by a TOML file, rewritten atomically on every change.
#[derive(Clone, Debug)]
pub struct FileSettingsStore {
    path: Utf8PathBuf,
    values: BTreeMap<String, String>,
}

impl FileSettingsStore {
    /// Returns the default location of the settings file:
    /// `$XDG_CONFIG_HOME/hostest/settings.toml`, or `~/.config/hostest/settings.toml`.
    pub fn default_path() -> Result<Utf8PathBuf, SettingsStoreError> {
        let strategy = match Xdg::new() {
            Ok(strategy) => strategy,
            Err(HomeDirError) => return Err(SettingsStoreError::HomeDir),
        };
        let path = strategy.config_dir().join("hostest").join("settings.toml");
        Utf8PathBuf::try_from(path).map_err(SettingsStoreError::NonUtf8Path)
    }

    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, SettingsStoreError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|error| SettingsStoreError::Parse {
                    path: path.clone(),
                    error,
                })?
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("settings file {path} not found, starting empty");
                BTreeMap::new()
            }
            Err(error) => return Err(SettingsStoreError::Read { path, error }),
        };
        Ok(Self { path, values })
    }

    /// The file backing this store.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn persist(&self) -> Result<(), SettingsStoreError> {
        let contents = toml::to_string(&self.values).map_err(SettingsStoreError::Serialize)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| SettingsStoreError::CreateDir {
                path: parent.to_owned(),
                error,
            })?;
        }
        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|file| file.write_all(contents.as_bytes()))
            .map_err(|error| SettingsStoreError::Write {
                path: self.path.clone(),
                error,
            })
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: String) -> Result<(), SettingsStoreError> {
        self.values.insert(name.to_owned(), value);
        self.persist()
    }

    fn clear(&mut self) -> Result<(), SettingsStoreError> {
        self.values.clear();
        self.persist()
    }
}

/// Typed access to the preferences hostest remembers between sessions.
#[derive(Debug)]
pub struct ModuleSettings<S> {
    store: S,
}

impl<S: SettingsStore> ModuleSettings<S> {
    const LAST_PATH: &'static str = "lastPath";
    const LAST_FILE_PATTERN: &'static str = "lastFilePattern";
    const LAST_CLASS_PATTERN: &'static str = "lastClassPattern";
    const LAST_FUNCTION_PATTERN: &'static str = "lastFunctionPattern";
    const LAST_RUN_SETTINGS: &'static str = "lastRunSettings";
    const SHOW_PASSED: &'static str = "showPassedChecked";
    const SHOW_IGNORED: &'static str = "showIgnoredChecked";
    const SHOW_COLLECTED: &'static str = "showCollectedChecked";

    /// Every key this type reads and writes.
    pub const KEYS: [&'static str; 8] = [
        Self::LAST_PATH,
        Self::LAST_FILE_PATTERN,
        Self::LAST_CLASS_PATTERN,
        Self::LAST_FUNCTION_PATTERN,
        Self::LAST_RUN_SETTINGS,
        Self::SHOW_PASSED,
        Self::SHOW_IGNORED,
        Self::SHOW_COLLECTED,
    ];

    /// Wraps a store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the underlying store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The last tested directory. Empty if never set.
    pub fn last_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.store.get(Self::LAST_PATH).unwrap_or_default())
    }

    /// Remembers the last tested directory.
    pub fn set_last_path(&mut self, path: &Utf8Path) -> Result<(), SettingsStoreError> {
        self.store.set(Self::LAST_PATH, path.as_str().to_owned())
    }

    /// The last file pattern.
    pub fn last_file_pattern(&self) -> String {
        self.store.get(Self::LAST_FILE_PATTERN).unwrap_or_default()
    }

    /// Remembers the last file pattern.
    pub fn set_last_file_pattern(&mut self, pattern: &str) -> Result<(), SettingsStoreError> {
        self.store.set(Self::LAST_FILE_PATTERN, pattern.to_owned())
    }

    /// The last class pattern.
    pub fn last_class_pattern(&self) -> String {
        self.store.get(Self::LAST_CLASS_PATTERN).unwrap_or_default()
    }

    /// Remembers the last class pattern.
    pub fn set_last_class_pattern(&mut self, pattern: &str) -> Result<(), SettingsStoreError> {
        self.store.set(Self::LAST_CLASS_PATTERN, pattern.to_owned())
    }

    /// The last function pattern.
    pub fn last_function_pattern(&self) -> String {
        self.store.get(Self::LAST_FUNCTION_PATTERN).unwrap_or_default()
    }

    /// Remembers the last function pattern.
    pub fn set_last_function_pattern(&mut self, pattern: &str) -> Result<(), SettingsStoreError> {
        self.store.set(Self::LAST_FUNCTION_PATTERN, pattern.to_owned())
    }

    /// The last run settings. Falls back to the defaults if none were stored or the stored value
    /// is invalid.
    pub fn last_run_settings(&self) -> RunSettings {
        let stored = self.store.get(Self::LAST_RUN_SETTINGS).unwrap_or_default();
        RunSettings::from_json(&stored).unwrap_or_else(|error| {
            warn!("ignoring stored run settings: {error}");
            RunSettings::default()
        })
    }

    /// Returns true if run settings were ever stored.
    pub fn has_last_run_settings(&self) -> bool {
        self.store.get(Self::LAST_RUN_SETTINGS).is_some()
    }

    /// Remembers the last run settings.
    pub fn set_last_run_settings(&mut self, settings: &RunSettings) -> Result<(), SettingsStoreError> {
        self.store.set(Self::LAST_RUN_SETTINGS, settings.to_json())
    }

    /// Which categories of cases are displayed. Every category is shown by default.
    pub fn case_filter(&self) -> CaseFilter {
        CaseFilter {
            show_passed: self.get_bool(Self::SHOW_PASSED, true),
            show_ignored: self.get_bool(Self::SHOW_IGNORED, true),
            show_collected: self.get_bool(Self::SHOW_COLLECTED, true),
        }
    }

    /// Remembers which categories of cases are displayed.
    pub fn set_case_filter(&mut self, filter: CaseFilter) -> Result<(), SettingsStoreError> {
        self.store.set(Self::SHOW_PASSED, filter.show_passed.to_string())?;
        self.store.set(Self::SHOW_IGNORED, filter.show_ignored.to_string())?;
        self.store.set(Self::SHOW_COLLECTED, filter.show_collected.to_string())
    }

    /// Returns every stored key and value, in key order.
    pub fn entries(&self) -> Vec<(&'static str, Option<String>)> {
        Self::KEYS
            .into_iter()
            .map(|key| (key, self.store.get(key)))
            .collect()
    }

    fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.store.get(name) {
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                warn!("ignoring invalid boolean `{value}` for setting {name}");
                default
            }),
            None => default,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn typed_defaults() {
        let settings = ModuleSettings::new(MemorySettingsStore::new());
        assert_eq!(settings.last_path(), Utf8PathBuf::new());
        assert_eq!(settings.last_file_pattern(), "");
        assert_eq!(settings.last_class_pattern(), "");
        assert_eq!(settings.last_function_pattern(), "");
        assert_eq!(settings.last_run_settings(), RunSettings::default());
        assert_eq!(settings.case_filter(), CaseFilter::default());
        assert!(!settings.has_last_run_settings());
    }

    #[test]
    fn typed_round_trip() {
        let mut settings = ModuleSettings::new(MemorySettingsStore::new());
        let run_settings = RunSettings::default()
            .with_parallel_instances(4)
            .with_extra_test_args(["-x"]);
        let filter = CaseFilter {
            show_passed: false,
            show_ignored: true,
            show_collected: false,
        };

        settings.set_last_path(Utf8Path::new("/tmp/suite")).expect("set");
        settings.set_last_file_pattern("test_*.py").expect("set");
        settings.set_last_class_pattern("Test*").expect("set");
        settings.set_last_function_pattern("slow").expect("set");
        settings.set_last_run_settings(&run_settings).expect("set");
        settings.set_case_filter(filter).expect("set");

        assert_eq!(settings.last_path(), "/tmp/suite");
        assert_eq!(settings.last_file_pattern(), "test_*.py");
        assert_eq!(settings.last_class_pattern(), "Test*");
        assert_eq!(settings.last_function_pattern(), "slow");
        assert_eq!(settings.last_run_settings(), run_settings);
        assert!(settings.has_last_run_settings());
        assert_eq!(settings.case_filter(), filter);
    }

    #[test]
    fn invalid_stored_values_use_defaults() {
        let mut store = MemorySettingsStore::new();
        store.set("lastRunSettings", "{ not json".to_owned()).expect("set");
        store.set("showPassedChecked", "maybe".to_owned()).expect("set");
        let settings = ModuleSettings::new(store);
        assert_eq!(settings.last_run_settings(), RunSettings::default());
        assert!(settings.case_filter().show_passed);
    }

    #[test_case("true", Some(true))]
    #[test_case("False", Some(false))]
    #[test_case("1", Some(true))]
    #[test_case(" off ", Some(false))]
    #[test_case("maybe", None)]
    fn bool_values(input: &str, expected: Option<bool>) {
        assert_eq!(parse_bool(input), expected);
    }

    #[test]
    fn file_store_persists() {
        let dir = tempdir().expect("tempdir created");
        let path = dir.path().join("nested/settings.toml");

        let mut settings = ModuleSettings::new(FileSettingsStore::open(&path).expect("opens"));
        settings.set_last_file_pattern("test_a*.py").expect("persisted");
        assert!(path.exists(), "settings file created along with its directory");

        let reopened = ModuleSettings::new(FileSettingsStore::open(&path).expect("reopens"));
        assert_eq!(reopened.last_file_pattern(), "test_a*.py");
        assert_eq!(reopened.store().path(), path);

        let mut store = FileSettingsStore::open(&path).expect("reopens");
        store.clear().expect("cleared");
        let cleared = ModuleSettings::new(FileSettingsStore::open(&path).expect("reopens"));
        assert_eq!(cleared.last_file_pattern(), "");
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempdir().expect("tempdir created");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "lastPath = [").expect("wrote garbage");
        FileSettingsStore::open(&path).expect_err("invalid TOML");
    }
}
