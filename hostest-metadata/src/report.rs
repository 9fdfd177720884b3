// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};

/// The report file written by a worker's test engine.
///
/// The format is the JSON report emitted by `pytest-json-report`: a list of executed tests and an
/// optional list of collectors. Parsing is lenient. Missing or `null` fields take their default
/// value, and an entry that doesn't have the expected shape is reduced to whatever identifying
/// fields can still be read from it rather than failing the whole report.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RawReport {
    /// The directory the test engine ran in.
    #[serde(deserialize_with = "null_as_default")]
    pub root: String,

    /// Executed test entries, in report order.
    #[serde(deserialize_with = "lenient_entries")]
    pub tests: Vec<RawTestEntry>,

    /// Collector entries, present for collect-only runs and for collection errors.
    #[serde(deserialize_with = "lenient_entries")]
    pub collectors: Vec<RawCollector>,
}

impl RawReport {
    /// Parses a report from its JSON text.
    ///
    /// Only fails if the input isn't JSON or its top level isn't an object.
    pub fn parse(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Serializes the report back to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// One executed test.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RawTestEntry {
    /// The hierarchical node id, for example `test_file.py::TestClass::test_fn[param]`.
    #[serde(deserialize_with = "null_as_default")]
    pub nodeid: String,

    /// The outcome name, for example `passed` or `failed`.
    #[serde(deserialize_with = "null_as_default")]
    pub outcome: String,

    /// The setup phase, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup: Option<RawPhase>,

    /// The call phase, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<RawPhase>,

    /// The teardown phase, if it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown: Option<RawPhase>,
}

impl RawTestEntry {
    /// Returns the phases that ran, in execution order.
    pub fn phases(&self) -> impl Iterator<Item = &RawPhase> {
        [&self.setup, &self.call, &self.teardown]
            .into_iter()
            .filter_map(Option::as_ref)
    }
}

/// One phase (setup, call or teardown) of an executed test.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RawPhase {
    /// Duration in seconds.
    #[serde(deserialize_with = "null_as_default")]
    pub duration: f64,

    /// The outcome of this phase.
    #[serde(deserialize_with = "null_as_default")]
    pub outcome: String,

    /// Failure representation, empty on success.
    #[serde(deserialize_with = "null_as_default")]
    pub longrepr: String,

    /// Captured standard output.
    #[serde(deserialize_with = "null_as_default")]
    pub stdout: String,

    /// Captured standard error.
    #[serde(deserialize_with = "null_as_default")]
    pub stderr: String,

    /// Captured log records.
    #[serde(deserialize_with = "lenient_entries")]
    pub log: Vec<RawLogRecord>,
}

/// A captured log record.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RawLogRecord {
    /// The level name, for example `WARNING`.
    #[serde(deserialize_with = "null_as_default")]
    pub levelname: String,

    /// The formatted message.
    #[serde(deserialize_with = "null_as_default")]
    pub msg: String,
}

/// A collector: a file, module or class the test engine collected items from.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RawCollector {
    /// The collector's node id. The session collector has an empty node id.
    #[serde(deserialize_with = "null_as_default")]
    pub nodeid: String,

    /// `passed` if collection succeeded, `failed` otherwise.
    #[serde(deserialize_with = "null_as_default")]
    pub outcome: String,

    /// The collection error, empty on success.
    #[serde(deserialize_with = "null_as_default")]
    pub longrepr: String,

    /// The items this collector produced.
    #[serde(deserialize_with = "lenient_entries")]
    pub result: Vec<RawCollectedItem>,
}

impl RawCollector {
    /// Returns true if collection failed for this collector.
    pub fn is_error(&self) -> bool {
        matches!(self.outcome.as_str(), "failed" | "error")
    }
}

/// An item produced by a collector.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RawCollectedItem {
    /// The item's node id.
    #[serde(deserialize_with = "null_as_default")]
    pub nodeid: String,

    /// The item's kind, for example `Module`, `Class` or `Function`.
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,

    /// The outcome, if the producer recorded one. Collected items usually don't.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,

    /// Failure representation, if any.
    #[serde(deserialize_with = "null_as_default")]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub longrepr: String,
}

/// Entries that fall back to their identifying fields when the full shape doesn't parse.
trait Salvage: Default {
    fn salvage(value: &serde_json::Value) -> Self;
}

fn str_field(value: &serde_json::Value, name: &str) -> String {
    value
        .get(name)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

impl Salvage for RawTestEntry {
    fn salvage(value: &serde_json::Value) -> Self {
        Self {
            nodeid: str_field(value, "nodeid"),
            outcome: str_field(value, "outcome"),
            ..Default::default()
        }
    }
}

impl Salvage for RawCollector {
    fn salvage(value: &serde_json::Value) -> Self {
        Self {
            nodeid: str_field(value, "nodeid"),
            outcome: str_field(value, "outcome"),
            longrepr: str_field(value, "longrepr"),
            result: Vec::new(),
        }
    }
}

impl Salvage for RawCollectedItem {
    fn salvage(value: &serde_json::Value) -> Self {
        Self {
            nodeid: str_field(value, "nodeid"),
            kind: str_field(value, "type"),
            ..Default::default()
        }
    }
}

impl Salvage for RawLogRecord {
    fn salvage(value: &serde_json::Value) -> Self {
        Self {
            levelname: str_field(value, "levelname"),
            msg: str_field(value, "msg"),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Salvage + DeserializeOwned,
{
    let values = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(values)) => values,
        _ => return Ok(Vec::new()),
    };

    Ok(values
        .into_iter()
        .map(|value| {
            serde_json::from_value::<T>(value.clone()).unwrap_or_else(|_| T::salvage(&value))
        })
        .collect())
}
