use async_trait::async_trait;
use switchyard_bus::{EventSender, Plugin, PluginError};
use switchyard_events::Event;

use crate::Recorder;

/// How a [`FailingPlugin`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// `process` returns an error.
    Error,
    /// `process` panics.
    Panic,
    /// `start` returns an error.
    Start,
}

/// A plugin that fails in a chosen way. Every `process` attempt is recorded before
/// failing, so tests can count attempts.
pub struct FailingPlugin {
    patterns: Vec<String>,
    mode: FailureMode,
    recorder: Recorder,
}

impl FailingPlugin {
    pub fn new(patterns: &[&str], mode: FailureMode, recorder: Recorder) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            mode,
            recorder,
        }
    }

    pub fn factory(
        patterns: &[&str],
        mode: FailureMode,
        recorder: &Recorder,
    ) -> impl Fn() -> Box<dyn Plugin> + Send + Sync + 'static {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let recorder = recorder.clone();
        move || -> Box<dyn Plugin> {
            let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
            Box::new(FailingPlugin::new(&patterns, mode, recorder.clone()))
        }
    }
}

#[async_trait]
impl Plugin for FailingPlugin {
    async fn start(&self, _events: EventSender) -> Result<(), PluginError> {
        if self.mode == FailureMode::Start {
            return Err(PluginError::Start("failing plugin refuses to start".to_string()));
        }
        self.recorder.record_start();
        Ok(())
    }

    async fn stop(&self) {
        self.recorder.record_stop();
    }

    fn subscribe(&self) -> Vec<String> {
        self.patterns.clone()
    }

    async fn process(&self, event: Event) -> Result<(), PluginError> {
        let name = event.name().to_string();
        self.recorder.record_attempt(event);
        match self.mode {
            FailureMode::Panic => panic!("failing plugin panicked on {name}"),
            _ => Err(PluginError::Process(format!("failing plugin rejected {name}"))),
        }
    }
}
