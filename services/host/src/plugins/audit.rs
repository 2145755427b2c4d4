//! Logs every matching event, secrets masked.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use switchyard_bus::{EventSender, Plugin, PluginError};
use switchyard_events::Event;
use tracing::info;

#[derive(Debug, Deserialize)]
struct AuditSettings {
    #[serde(default = "default_patterns")]
    patterns: Vec<String>,
}

fn default_patterns() -> Vec<String> {
    vec![".*".to_string()]
}

pub struct AuditPlugin {
    patterns: Vec<String>,
}

impl Default for AuditPlugin {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }
}

#[async_trait]
impl Plugin for AuditPlugin {
    fn configure(&mut self, settings: &Value) -> Result<(), PluginError> {
        let settings: AuditSettings = serde_json::from_value(settings.clone())
            .map_err(|e| PluginError::Config(e.to_string()))?;
        self.patterns = settings.patterns;
        Ok(())
    }

    async fn start(&self, _events: EventSender) -> Result<(), PluginError> {
        Ok(())
    }

    async fn stop(&self) {}

    fn subscribe(&self) -> Vec<String> {
        self.patterns.clone()
    }

    async fn process(&self, event: Event) -> Result<(), PluginError> {
        info!(
            event_id = %event.id(),
            event_name = %event.name(),
            state = %event.state(),
            event = %event.dump()?,
            "Audit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_events::Payload;

    #[test]
    fn test_configure_patterns() {
        let mut plugin = AuditPlugin::default();
        assert_eq!(plugin.subscribe(), vec![".*"]);

        plugin
            .configure(&serde_json::json!({"patterns": ["^project:", "^release:"]}))
            .unwrap();
        assert_eq!(plugin.subscribe(), vec!["^project:", "^release:"]);

        assert!(plugin.configure(&serde_json::json!({"patterns": "nope"})).is_err());
    }

    #[tokio::test]
    async fn test_process_accepts_any_event() {
        let plugin = AuditPlugin::default();
        let mut event = Event::create(Payload::bare("release"));
        event.set_artifact("TOKEN", "abc", true);
        plugin.process(event).await.unwrap();
    }
}
