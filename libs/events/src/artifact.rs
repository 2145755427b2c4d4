//! Artifacts: key/value side-channel data attached to events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::EventError;

const REDACTED: &str = "******";

/// A key/value datum passed between plugins on an event.
///
/// `secret` is advisory. The bus never enforces it; it only masks the value in
/// `Debug` output and in [`crate::Event::dump`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Plugin that produced the artifact; empty for artifacts set by the emitter.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub secret: bool,
}

impl Artifact {
    pub fn new(key: impl Into<String>, value: impl Into<Value>, secret: bool) -> Self {
        Self {
            source: String::new(),
            key: key.into(),
            value: value.into(),
            secret,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Case-insensitive key comparison, the way artifact lookups work.
    pub fn has_key(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }

    pub fn as_str(&self) -> Result<&str, EventError> {
        self.value.as_str().ok_or_else(|| self.type_error("string"))
    }

    /// Integer value. Numeric strings are accepted since most emitters stringify ports
    /// and counts.
    pub fn as_int(&self) -> Result<i64, EventError> {
        match &self.value {
            Value::Number(n) => n.as_i64().ok_or_else(|| self.type_error("integer")),
            Value::String(s) => s.trim().parse().map_err(|_| self.type_error("integer")),
            _ => Err(self.type_error("integer")),
        }
    }

    pub fn as_map(&self) -> Result<&Map<String, Value>, EventError> {
        self.value.as_object().ok_or_else(|| self.type_error("map"))
    }

    pub fn as_list(&self) -> Result<&[Value], EventError> {
        self.value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| self.type_error("list"))
    }

    /// Copy with the value masked when the artifact is secret.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.secret {
            copy.value = Value::String(REDACTED.to_string());
        }
        copy
    }

    fn type_error(&self, expected: &'static str) -> EventError {
        EventError::ArtifactType {
            key: self.key.clone(),
            expected,
        }
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Artifact");
        if !self.source.is_empty() {
            s.field("source", &self.source);
        }
        s.field("key", &self.key);
        if self.secret {
            s.field("value", &REDACTED);
        } else {
            s.field("value", &self.value);
        }
        s.field("secret", &self.secret).finish()
    }
}
