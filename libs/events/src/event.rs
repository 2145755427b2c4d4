//! The event: a named, payload-carrying message flowing through the bus.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchyard_id::EventId;

use crate::{Action, Artifact, EventError, Payload, State};

const WAITING_MESSAGE: &str = "Waiting for event to run";

/// Where an event was constructed. Debug provenance only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub file: String,
    pub line: u32,
}

impl Caller {
    #[track_caller]
    fn here() -> Self {
        let location = std::panic::Location::caller();
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }
}

/// Builds the routing name `Type[:Action][:Slug]`.
pub fn compose_name(event_type: &str, action: Option<Action>, slug: Option<&str>) -> String {
    let mut name = event_type.to_string();
    if let Some(action) = action {
        name.push(':');
        name.push_str(action.as_str());
    }
    if let Some(slug) = slug {
        name.push(':');
        name.push_str(slug);
    }
    name
}

/// A named event.
///
/// The name, payload and action are fixed at construction. State, message and artifacts
/// are set by the emitter before the event is pushed onto the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: EventId,
    parent_id: Option<EventId>,
    name: String,
    action: Option<Action>,
    state: State,
    state_message: String,
    payload: Payload,
    artifacts: Vec<Artifact>,
    created_at: DateTime<Utc>,
    caller: Option<Caller>,
}

impl Event {
    /// Creates a root event in the `waiting` state.
    #[track_caller]
    pub fn new(payload: impl Into<Payload>, action: Option<Action>) -> Self {
        let payload = payload.into();
        let name = compose_name(&payload.event_type(), action, payload.slug());
        Self {
            id: EventId::new(),
            parent_id: None,
            name,
            action,
            state: State::Waiting,
            state_message: WAITING_MESSAGE.to_string(),
            payload,
            artifacts: Vec::new(),
            created_at: Utc::now(),
            caller: Some(Caller::here()),
        }
    }

    #[track_caller]
    pub fn create(payload: impl Into<Payload>) -> Self {
        Self::new(payload, Some(Action::Create))
    }

    #[track_caller]
    pub fn update(payload: impl Into<Payload>) -> Self {
        Self::new(payload, Some(Action::Update))
    }

    #[track_caller]
    pub fn delete(payload: impl Into<Payload>) -> Self {
        Self::new(payload, Some(Action::Delete))
    }

    #[track_caller]
    pub fn status(payload: impl Into<Payload>, state: State, message: impl Into<String>) -> Self {
        Self::new(payload, Some(Action::Status)).with_state(state, message)
    }

    /// Creates an event reporting a failure: state `failed`, message from the error.
    #[track_caller]
    pub fn from_error(
        payload: impl Into<Payload>,
        action: Option<Action>,
        err: &dyn std::error::Error,
    ) -> Self {
        Self::new(payload, action).with_state(State::Failed, err.to_string())
    }

    /// Creates a continuation of this event: same payload, new action and state,
    /// `parent_id` set to this event's id. Artifacts are not inherited.
    #[track_caller]
    pub fn child(&self, action: Action, state: State, message: impl Into<String>) -> Self {
        let mut event = Self::new(self.payload.clone(), Some(action)).with_state(state, message);
        event.parent_id = Some(self.id);
        event
    }

    pub fn with_state(mut self, state: State, message: impl Into<String>) -> Self {
        self.state = state;
        self.state_message = message.into();
        self
    }

    pub fn with_artifacts(mut self, artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn parent_id(&self) -> Option<EventId> {
        self.parent_id
    }

    /// Routing name, `Type[:Action][:Slug]`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> Option<Action> {
        self.action
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn state_message(&self) -> &str {
        &self.state_message
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_model(&self) -> &str {
        self.payload.model()
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    /// True if the pattern finds a match anywhere in the event name.
    pub fn matches(&self, pattern: &Regex) -> bool {
        pattern.is_match(&self.name)
    }

    /// Appends an artifact, even if one with the same key exists.
    pub fn push_artifact(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
    }

    /// Replaces every artifact whose key matches (case-insensitively), or appends.
    pub fn set_artifact(&mut self, key: &str, value: impl Into<Value>, secret: bool) {
        let artifact = Artifact::new(key, value, secret);
        let mut replaced = false;
        for existing in self.artifacts.iter_mut().filter(|a| a.has_key(key)) {
            *existing = artifact.clone();
            replaced = true;
        }
        if !replaced {
            self.artifacts.push(artifact);
        }
    }

    /// First emitter-set artifact (no source) with this key.
    pub fn artifact(&self, key: &str) -> Result<&Artifact, EventError> {
        self.artifacts
            .iter()
            .find(|a| a.source.is_empty() && a.has_key(key))
            .ok_or_else(|| EventError::ArtifactNotFound(key.to_string()))
    }

    /// First artifact with this key produced by `source`.
    pub fn artifact_from_source(&self, key: &str, source: &str) -> Result<&Artifact, EventError> {
        self.artifacts
            .iter()
            .find(|a| a.source.eq_ignore_ascii_case(source) && a.has_key(key))
            .ok_or_else(|| EventError::ArtifactNotFound(format!("{}/{}", source, key)))
    }

    /// JSON rendering with secret artifact values masked.
    pub fn dump(&self) -> Result<String, EventError> {
        let mut redacted = self.clone();
        redacted.artifacts = self.artifacts.iter().map(Artifact::redacted).collect();
        Ok(serde_json::to_string(&EventRecord::try_from(&redacted)?)?)
    }
}

// =============================================================================
// Wire Format
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<EventId>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<Action>,
    #[serde(default)]
    state: State,
    #[serde(default)]
    state_message: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    payload_model: String,
    /// Type and slug of a raw payload; typed payloads derive both from their body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_slug: Option<String>,
    #[serde(default)]
    artifacts: Vec<Artifact>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    caller: Option<Caller>,
}

impl TryFrom<&Event> for EventRecord {
    type Error = EventError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        let (payload_type, payload_slug) = match &event.payload {
            Payload::Raw(raw) => (Some(raw.event_type.clone()), raw.slug.clone()),
            _ => (None, None),
        };
        Ok(Self {
            id: event.id,
            parent_id: event.parent_id,
            name: event.name.clone(),
            action: event.action,
            state: event.state,
            state_message: event.state_message.clone(),
            payload: event.payload.to_value()?,
            payload_model: event.payload.model().to_string(),
            payload_type,
            payload_slug,
            artifacts: event.artifacts.clone(),
            created_at: event.created_at,
            caller: event.caller.clone(),
        })
    }
}

impl TryFrom<EventRecord> for Event {
    type Error = EventError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        // The name was fixed by the producer; it is carried, never recomputed.
        let (event_type, slug) = match record.payload_type {
            Some(event_type) => (event_type, record.payload_slug),
            None => split_name(&record.name, record.action),
        };
        let payload = Payload::decode(
            &record.payload_model,
            record.payload,
            &event_type,
            slug.as_deref(),
        )?;
        Ok(Self {
            id: record.id,
            parent_id: record.parent_id,
            name: record.name,
            action: record.action,
            state: record.state,
            state_message: record.state_message,
            payload,
            artifacts: record.artifacts,
            created_at: record.created_at,
            caller: record.caller,
        })
    }
}

/// Recovers `(type, slug)` from a `Type[:Action][:Slug]` name.
fn split_name(name: &str, action: Option<Action>) -> (String, Option<String>) {
    let Some(action) = action else {
        return (name.to_string(), None);
    };
    let infix = format!(":{}:", action);
    if let Some(at) = name.rfind(&infix) {
        let slug = &name[at + infix.len()..];
        return (name[..at].to_string(), Some(slug.to_string()));
    }
    match name.strip_suffix(&infix[..infix.len() - 1]) {
        Some(event_type) => (event_type.to_string(), None),
        None => (name.to_string(), None),
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        EventRecord::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let record = EventRecord::deserialize(deserializer)?;
        Event::try_from(record).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
