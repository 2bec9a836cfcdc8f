//! Action patterns and their compact string form.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::error::{ActError, ActResult};
use crate::utils::jsonic::parse_relaxed;

/// A mapping that identifies a remote action.
///
/// Keys keep their insertion order. Matching a pattern against handlers is the
/// RPC layer's business; this type only carries and merges it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(Map<String, JsonValue>);

impl Pattern {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse the compact form, e.g. `"role:user,cmd:load"`.
    pub fn parse(text: &str) -> ActResult<Self> {
        parse_relaxed(text).map(Self)
    }

    /// Accept either a JSON object or a compact pattern string.
    pub fn from_value(value: &JsonValue) -> ActResult<Self> {
        match value {
            JsonValue::Object(map) => Ok(Self(map.clone())),
            JsonValue::String(text) => Self::parse(text),
            other => Err(ActError::Parse(format!(
                "pattern must be an object or a string, got {other}"
            ))),
        }
    }

    /// Shallow merge: keys of `additions` override or extend this pattern.
    pub fn merged(&self, additions: &Pattern) -> Pattern {
        let mut merged = self.0.clone();
        for (key, value) in &additions.0 {
            merged.insert(key.clone(), value.clone());
        }
        Pattern(merged)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn into_value(self) -> JsonValue {
        JsonValue::Object(self.0)
    }
}

impl From<Map<String, JsonValue>> for Pattern {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl FromStr for Pattern {
    type Err = ActError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", JsonValue::Object(self.0.clone()))
    }
}

/// A pattern as supplied by callers: structured, or still in compact text.
///
/// Used both for binding templates and for runtime additions.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternSource {
    Text(String),
    Fields(Pattern),
}

/// Runtime parameters merged onto a bound pattern.
pub type Additions = PatternSource;

impl PatternSource {
    /// Resolve into a structured pattern, parsing the compact form if needed.
    pub fn to_pattern(&self) -> ActResult<Pattern> {
        match self {
            PatternSource::Text(text) => Pattern::parse(text),
            PatternSource::Fields(pattern) => Ok(pattern.clone()),
        }
    }

    /// Empty text behaves like no additions at all.
    pub fn is_blank(&self) -> bool {
        matches!(self, PatternSource::Text(text) if text.trim().is_empty())
    }
}

impl From<&str> for PatternSource {
    fn from(text: &str) -> Self {
        PatternSource::Text(text.to_string())
    }
}

impl From<String> for PatternSource {
    fn from(text: String) -> Self {
        PatternSource::Text(text)
    }
}

impl From<Pattern> for PatternSource {
    fn from(pattern: Pattern) -> Self {
        PatternSource::Fields(pattern)
    }
}

impl From<Map<String, JsonValue>> for PatternSource {
    fn from(map: Map<String, JsonValue>) -> Self {
        PatternSource::Fields(Pattern(map))
    }
}

impl TryFrom<JsonValue> for PatternSource {
    type Error = ActError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Object(map) => Ok(PatternSource::Fields(Pattern(map))),
            JsonValue::String(text) => Ok(PatternSource::Text(text)),
            other => Err(ActError::Parse(format!(
                "pattern must be an object or a string, got {other}"
            ))),
        }
    }
}
