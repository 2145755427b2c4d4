//! Payload tagged union and its per-model decoders.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    EventError, GitSync, Heartbeat, Notification, ProjectExtension, Release, ReleaseExtension,
};

/// Model tags written to `payloadModel`.
pub mod models {
    pub const PROJECT_EXTENSION: &str = "project_extension";
    pub const RELEASE_EXTENSION: &str = "release_extension";
    pub const RELEASE: &str = "release";
    pub const GIT_SYNC: &str = "git_sync";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const NOTIFICATION: &str = "notification";
}

/// Payload whose model is not one of the built-in ones, or an event with no subject.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawPayload {
    /// Model tag; empty for bare events.
    pub model: String,
    /// Event type used for the event name.
    pub event_type: String,
    pub slug: Option<String>,
    pub data: Value,
}

/// What an event is about.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    ProjectExtension(ProjectExtension),
    ReleaseExtension(ReleaseExtension),
    Release(Release),
    GitSync(GitSync),
    Heartbeat(Heartbeat),
    Notification(Notification),
    Raw(RawPayload),
}

impl Payload {
    /// A payload carrying only an event type, e.g. a status report with no subject.
    pub fn bare(event_type: impl Into<String>) -> Self {
        Payload::Raw(RawPayload {
            event_type: event_type.into(),
            data: Value::Null,
            ..Default::default()
        })
    }

    /// The `payloadModel` tag.
    pub fn model(&self) -> &str {
        match self {
            Payload::ProjectExtension(_) => models::PROJECT_EXTENSION,
            Payload::ReleaseExtension(_) => models::RELEASE_EXTENSION,
            Payload::Release(_) => models::RELEASE,
            Payload::GitSync(_) => models::GIT_SYNC,
            Payload::Heartbeat(_) => models::HEARTBEAT,
            Payload::Notification(_) => models::NOTIFICATION,
            Payload::Raw(raw) => &raw.model,
        }
    }

    /// The `Type` segment of the event name.
    pub fn event_type(&self) -> Cow<'_, str> {
        match self {
            Payload::ProjectExtension(ext) => Cow::Owned(format!("project:{}", ext.extension)),
            Payload::ReleaseExtension(ext) => Cow::Owned(format!("release:{}", ext.extension)),
            Payload::Release(_) => Cow::Borrowed("release"),
            Payload::GitSync(_) => Cow::Borrowed("gitsync"),
            Payload::Heartbeat(_) => Cow::Borrowed("heartbeat"),
            Payload::Notification(_) => Cow::Borrowed("notification"),
            Payload::Raw(raw) => Cow::Borrowed(&raw.event_type),
        }
    }

    /// The optional `Slug` segment of the event name.
    pub fn slug(&self) -> Option<&str> {
        match self {
            Payload::Heartbeat(hb) if !hb.tick.is_empty() => Some(&hb.tick),
            Payload::Raw(raw) => raw.slug.as_deref(),
            _ => None,
        }
    }

    /// Encodes the payload body (without its tag).
    pub fn to_value(&self) -> Result<Value, EventError> {
        let value = match self {
            Payload::ProjectExtension(p) => serde_json::to_value(p)?,
            Payload::ReleaseExtension(p) => serde_json::to_value(p)?,
            Payload::Release(p) => serde_json::to_value(p)?,
            Payload::GitSync(p) => serde_json::to_value(p)?,
            Payload::Heartbeat(p) => serde_json::to_value(p)?,
            Payload::Notification(p) => serde_json::to_value(p)?,
            Payload::Raw(raw) => raw.data.clone(),
        };
        Ok(value)
    }

    /// Rebuilds a payload from its tag and body.
    ///
    /// Unknown tags are kept as [`RawPayload`] so a newer producer never breaks an older
    /// consumer; `event_type` and `slug` name such payloads.
    pub fn decode(
        model: &str,
        data: Value,
        event_type: &str,
        slug: Option<&str>,
    ) -> Result<Self, EventError> {
        fn typed<T: serde::de::DeserializeOwned>(model: &str, data: Value) -> Result<T, EventError> {
            serde_json::from_value(data).map_err(|e| EventError::InvalidPayload {
                model: model.to_string(),
                reason: e.to_string(),
            })
        }

        let payload = match model {
            models::PROJECT_EXTENSION => Payload::ProjectExtension(typed(model, data)?),
            models::RELEASE_EXTENSION => Payload::ReleaseExtension(typed(model, data)?),
            models::RELEASE => Payload::Release(typed(model, data)?),
            models::GIT_SYNC => Payload::GitSync(typed(model, data)?),
            models::HEARTBEAT => Payload::Heartbeat(typed(model, data)?),
            models::NOTIFICATION => Payload::Notification(typed(model, data)?),
            other => Payload::Raw(RawPayload {
                model: other.to_string(),
                event_type: event_type.to_string(),
                slug: slug.map(str::to_string),
                data,
            }),
        };
        Ok(payload)
    }
}

macro_rules! payload_from {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::$ty(value)
                }
            }
        )*
    };
}

payload_from!(
    ProjectExtension,
    ReleaseExtension,
    Release,
    GitSync,
    Heartbeat,
    Notification,
);

impl From<RawPayload> for Payload {
    fn from(value: RawPayload) -> Self {
        Payload::Raw(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Project;

    fn database_extension() -> ProjectExtension {
        ProjectExtension {
            id: "ext-1".to_string(),
            extension: "database".to_string(),
            project: Project {
                id: "p-1".to_string(),
                slug: "checkout".to_string(),
                repository: "acme/checkout".to_string(),
            },
            environment: "staging".to_string(),
        }
    }

    #[test]
    fn test_extension_event_type() {
        let payload = Payload::from(database_extension());
        assert_eq!(payload.event_type(), "project:database");
        assert_eq!(payload.model(), models::PROJECT_EXTENSION);
        assert_eq!(payload.slug(), None);
    }

    #[test]
    fn test_heartbeat_slug() {
        let payload = Payload::from(Heartbeat {
            tick: "minute".to_string(),
        });
        assert_eq!(payload.event_type(), "heartbeat");
        assert_eq!(payload.slug(), Some("minute"));

        let empty = Payload::from(Heartbeat::default());
        assert_eq!(empty.slug(), None);
    }

    #[test]
    fn test_decode_known_model() {
        let payload = Payload::from(database_extension());
        let body = payload.to_value().unwrap();
        let decoded = Payload::decode(models::PROJECT_EXTENSION, body, "ignored", None).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_unknown_model_is_raw() {
        let decoded = Payload::decode(
            "plugins.Custom",
            serde_json::json!({"answer": 42}),
            "custom:thing",
            Some("blue"),
        )
        .unwrap();

        match decoded {
            Payload::Raw(raw) => {
                assert_eq!(raw.model, "plugins.Custom");
                assert_eq!(raw.event_type, "custom:thing");
                assert_eq!(raw.slug.as_deref(), Some("blue"));
                assert_eq!(raw.data["answer"], 42);
            }
            other => panic!("expected raw payload, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_mismatched_body_fails() {
        let err = Payload::decode(models::HEARTBEAT, serde_json::json!([1, 2]), "heartbeat", None)
            .unwrap_err();
        assert!(matches!(err, EventError::InvalidPayload { ref model, .. } if model == "heartbeat"));
    }

    #[test]
    fn test_bare_payload() {
        let payload = Payload::bare("project:database");
        assert_eq!(payload.model(), "");
        assert_eq!(payload.event_type(), "project:database");
        assert_eq!(payload.to_value().unwrap(), Value::Null);
    }
}
