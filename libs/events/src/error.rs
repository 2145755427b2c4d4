//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when building, decoding or inspecting events.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EventError {
    /// The action string is not one of create/update/delete/status.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The state string is not a known event state.
    #[error("unknown state: {0}")]
    UnknownState(String),

    /// The payload does not decode into its declared model.
    #[error("invalid payload for model {model}: {reason}")]
    InvalidPayload { model: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No artifact with this key exists on the event.
    #[error("artifact {0} not found")]
    ArtifactNotFound(String),

    /// The artifact exists but its value has a different shape.
    #[error("artifact {key} is not a {expected}")]
    ArtifactType { key: String, expected: &'static str },
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
