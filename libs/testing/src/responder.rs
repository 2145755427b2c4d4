use std::sync::OnceLock;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use switchyard_bus::{EventSender, Plugin, PluginError};
use switchyard_events::{Action, Event, Payload, State};
use tracing::info;

#[derive(Debug, Deserialize)]
struct ResponderSettings {
    extension: String,
    #[serde(default)]
    fail: bool,
}

/// Answers `project:<extension>:create|update|delete` with a
/// `project:<extension>:status` continuation.
///
/// Create and update report `complete` with `<EXT>_ENDPOINT` and `<EXT>_PASSWORD`
/// (secret) artifacts; delete reports `deleted`. With `fail: true` every request is
/// answered with a `failed` status instead.
#[derive(Default)]
pub struct StatusResponder {
    extension: String,
    fail: bool,
    events: OnceLock<EventSender>,
}

impl StatusResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory() -> impl Fn() -> Box<dyn Plugin> + Send + Sync + 'static {
        || -> Box<dyn Plugin> { Box::new(StatusResponder::new()) }
    }

    fn respond(&self, event: &Event) -> Event {
        if self.fail {
            return event.child(
                Action::Status,
                State::Failed,
                format!("{} {} failed", self.extension, action_label(event)),
            );
        }

        let prefix = self.extension.to_uppercase();
        match event.action() {
            Some(Action::Delete) => event.child(Action::Status, State::Deleted, "deleted"),
            _ => {
                let host = match event.payload() {
                    Payload::ProjectExtension(ext) => {
                        format!("{}.{}.{}.internal", self.extension, ext.project.slug, ext.environment)
                    }
                    _ => format!("{}.internal", self.extension),
                };
                let mut status = event.child(
                    Action::Status,
                    State::Complete,
                    format!("{} {} complete", self.extension, action_label(event)),
                );
                status.set_artifact(&format!("{prefix}_ENDPOINT"), host, false);
                status.set_artifact(&format!("{prefix}_PASSWORD"), "s3cr3t", true);
                status
            }
        }
    }
}

fn action_label(event: &Event) -> &'static str {
    event.action().map(|a| a.as_str()).unwrap_or("request")
}

#[async_trait]
impl Plugin for StatusResponder {
    fn configure(&mut self, settings: &Value) -> Result<(), PluginError> {
        let settings: ResponderSettings = serde_json::from_value(settings.clone())
            .map_err(|e| PluginError::Config(e.to_string()))?;
        self.extension = settings.extension;
        self.fail = settings.fail;
        Ok(())
    }

    async fn start(&self, events: EventSender) -> Result<(), PluginError> {
        let _ = self.events.set(events);
        Ok(())
    }

    async fn stop(&self) {}

    fn subscribe(&self) -> Vec<String> {
        vec![format!("project:{}:(create|update|delete)", self.extension)]
    }

    async fn process(&self, event: Event) -> Result<(), PluginError> {
        let events = self
            .events
            .get()
            .ok_or_else(|| PluginError::Process("responder not started".to_string()))?;

        let status = self.respond(&event);
        info!(event_name = %status.name(), state = %status.state(), "Responding");
        events.send(status).await?;
        Ok(())
    }
}
