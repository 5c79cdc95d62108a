// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log entry types and their on-disk / wire representation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of an entry. Serialized as its integer rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Level {
    Verbose = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(rank: u8) -> Result<Self, String> {
        match rank {
            0 => Ok(Level::Verbose),
            1 => Ok(Level::Debug),
            2 => Ok(Level::Info),
            3 => Ok(Level::Warning),
            4 => Ok(Level::Error),
            other => Err(format!("unknown log level rank {other}")),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Verbose => "verbose",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        f.write_str(name)
    }
}

/// Structured context attached to an entry.
///
/// Untagged, so a value serializes to the plain JSON value it holds. Variant order matters
/// when decoding: integers are tried before floats.
///
/// JSON has no NaN or infinity, so a non-finite `Float` is written as its string form
/// (`"NaN"`, `"inf"`, `"-inf"`) and reads back as `String`. Integers outside the `i64`
/// range decode as `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Integer(i64),
    #[serde(serialize_with = "serialize_float")]
    Float(f64),
    String(String),
    List(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
}

fn serialize_float<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_str(&value.to_string())
    }
}

impl ContextValue {
    /// Converts an arbitrary JSON value, dropping `null`s (which have no counterpart here).
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ContextValue::Bool(b)),
            Value::Number(n) => n
                .as_i64()
                .map(ContextValue::Integer)
                .or_else(|| n.as_f64().map(ContextValue::Float)),
            Value::String(s) => Some(ContextValue::String(s)),
            Value::Array(items) => Some(ContextValue::List(
                items.into_iter().filter_map(ContextValue::from_json).collect(),
            )),
            Value::Object(map) => Some(ContextValue::Map(
                map.into_iter()
                    .filter_map(|(k, v)| ContextValue::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::String(s)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl From<i64> for ContextValue {
    fn from(n: i64) -> Self {
        ContextValue::Integer(n)
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        ContextValue::Float(n)
    }
}

impl From<Vec<ContextValue>> for ContextValue {
    fn from(items: Vec<ContextValue>) -> Self {
        ContextValue::List(items)
    }
}

impl From<BTreeMap<String, ContextValue>> for ContextValue {
    fn from(map: BTreeMap<String, ContextValue>) -> Self {
        ContextValue::Map(map)
    }
}

/// Everything about one log occurrence except the session it belongs to.
///
/// This is the shape an entry takes inside a delivered session group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Epoch seconds.
    pub timestamp: f64,
    pub level: Level,
    pub tag: String,
    pub message: String,
    /// Empty for the main thread.
    pub thread: String,
    /// Basename of the emitting source file.
    pub file: String,
    pub function: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextValue>,
}

impl EntryRecord {
    pub fn new(level: Level, tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: epoch_seconds(),
            level,
            tag: tag.into(),
            message: message.into(),
            thread: String::new(),
            file: String::new(),
            function: String::new(),
            line: 0,
            context: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, file: &str, function: impl Into<String>, line: u32) -> Self {
        self.file = file_basename(file).to_string();
        self.function = function.into();
        self.line = line;
        self
    }

    #[must_use]
    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = thread.into();
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Option<ContextValue>) -> Self {
        self.context = context;
        self
    }
}

/// An entry as persisted in the append log: the record stamped with its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(flatten)]
    pub record: EntryRecord,
}

impl Entry {
    pub fn new(session_id: impl Into<String>, record: EntryRecord) -> Self {
        Self {
            session_id: session_id.into(),
            record,
        }
    }
}

/// Current wall-clock time as fractional epoch seconds.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Strips any directory components from a source path.
pub fn file_basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
