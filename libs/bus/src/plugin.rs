//! The plugin contract and the running-plugin supervisor.
//!
//! A plugin is a stage handler (build, deploy, notify, provision). The bus drives it
//! through four hooks:
//! - `configure` once, with the plugin's configuration sub-tree
//! - `start` once, with a handle for emitting events
//! - `process` for every event whose name matches one of its `subscribe` patterns,
//!   possibly many at once
//! - `stop` once, at shutdown

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use regex::Regex;
use serde_json::Value;
use switchyard_events::Event;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use crate::queue::{Job, JobHandler};
use crate::{PluginError, QueueError, SendError};

// =============================================================================
// Plugin Trait
// =============================================================================

#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Decodes the plugin's configuration sub-tree (everything next to `workers` and
    /// `worker_retries`). Called once, before `start`.
    fn configure(&mut self, _settings: &Value) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once before any event is dispatched to the plugin. `events` pushes
    /// onto the bus inbound queue.
    async fn start(&self, events: EventSender) -> Result<(), PluginError>;

    /// Called once at shutdown, after the dispatcher has exited.
    async fn stop(&self);

    /// Regex patterns matched (unanchored) against event names.
    fn subscribe(&self) -> Vec<String>;

    /// Handles one event. May run concurrently with other `process` calls.
    async fn process(&self, event: Event) -> Result<(), PluginError>;
}

// =============================================================================
// Event Sender
// =============================================================================

/// Producer handle for the bus inbound queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    pub(crate) fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Pushes an event, waiting for capacity if the queue is full.
    pub async fn send(&self, event: Event) -> Result<(), SendError> {
        self.tx.send(event).await.map_err(|_| SendError::Closed)
    }

    /// Pushes an event without waiting. A full queue drops the event.
    pub fn try_send(&self, event: Event) -> Result<(), SendError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => {
                warn!(event_name = %event.name(), "Inbound queue full, dropping event");
                SendError::Full
            }
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Remaining inbound capacity.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

// =============================================================================
// Running Plugin
// =============================================================================

/// A plugin instance bound to its resolved configuration and lifecycle state.
pub struct RunningPlugin {
    name: String,
    plugin: Arc<dyn Plugin>,
    workers: usize,
    worker_retries: u32,
    enabled: bool,
    started: bool,
    subscriptions: Arc<[Regex]>,
    permits: Arc<Semaphore>,
}

impl RunningPlugin {
    pub(crate) fn new(
        name: String,
        plugin: Arc<dyn Plugin>,
        workers: usize,
        worker_retries: u32,
        enabled: bool,
    ) -> Self {
        let subscriptions: Vec<Regex> = plugin
            .subscribe()
            .into_iter()
            .filter_map(|pattern| match Regex::new(&pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(plugin = %name, pattern = %pattern, error = %e, "Ignoring invalid subscription pattern");
                    None
                }
            })
            .collect();

        Self {
            name,
            plugin,
            workers,
            worker_retries,
            enabled,
            started: false,
            subscriptions: subscriptions.into(),
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn worker_retries(&self) -> u32 {
        self.worker_retries
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Enabled plugins with at least one worker are started and receive events.
    pub fn is_active(&self) -> bool {
        self.enabled && self.workers > 0
    }

    /// True if any subscription pattern matches the event name.
    pub fn subscribes_to(&self, event: &Event) -> bool {
        self.subscriptions.iter().any(|pattern| event.matches(pattern))
    }

    pub(crate) fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub(crate) fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    pub(crate) fn subscriptions(&self) -> &Arc<[Regex]> {
        &self.subscriptions
    }

    pub(crate) fn set_started(&mut self, started: bool) {
        self.started = started;
    }
}

impl std::fmt::Debug for RunningPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningPlugin")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("worker_retries", &self.worker_retries)
            .field("enabled", &self.enabled)
            .field("started", &self.started)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

// =============================================================================
// Isolated Processing
// =============================================================================

/// Runs `process`, turning a panic into [`PluginError::Panicked`].
pub(crate) async fn process_isolated(plugin: &dyn Plugin, event: Event) -> Result<(), PluginError> {
    match AssertUnwindSafe(plugin.process(event)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(PluginError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Queue worker that decodes an event job and hands it to a plugin.
pub(crate) struct PluginJobHandler {
    name: String,
    plugin: Arc<dyn Plugin>,
}

impl PluginJobHandler {
    pub(crate) fn new(name: String, plugin: Arc<dyn Plugin>) -> Self {
        Self { name, plugin }
    }
}

#[async_trait]
impl JobHandler for PluginJobHandler {
    async fn handle(&self, job: &Job) -> Result<(), QueueError> {
        let event: Event = serde_json::from_value(job.payload.clone())
            .map_err(|e| QueueError::Encoding(e.to_string()))?;
        debug!(plugin = %self.name, job_id = %job.id, event_name = %event.name(), "Processing queued event");
        process_isolated(self.plugin.as_ref(), event)
            .await
            .map_err(|e| QueueError::Handler(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_events::{Action, Payload};

    struct Panicky;

    #[async_trait]
    impl Plugin for Panicky {
        async fn start(&self, _events: EventSender) -> Result<(), PluginError> {
            Ok(())
        }

        async fn stop(&self) {}

        fn subscribe(&self) -> Vec<String> {
            vec!["project:(".to_string(), "^release".to_string()]
        }

        async fn process(&self, event: Event) -> Result<(), PluginError> {
            panic!("cannot handle {}", event.name());
        }
    }

    #[test]
    fn test_invalid_patterns_are_dropped() {
        let running = RunningPlugin::new("p".to_string(), Arc::new(Panicky), 1, 0, true);
        assert_eq!(running.subscriptions().len(), 1);
        assert!(running.subscribes_to(&Event::new(Payload::bare("release"), Some(Action::Create))));
        assert!(!running.subscribes_to(&Event::new(Payload::bare("project:x"), None)));
    }

    #[test]
    fn test_active_requires_workers_and_enabled() {
        assert!(RunningPlugin::new("p".into(), Arc::new(Panicky), 1, 0, true).is_active());
        assert!(!RunningPlugin::new("p".into(), Arc::new(Panicky), 0, 0, true).is_active());
        assert!(!RunningPlugin::new("p".into(), Arc::new(Panicky), 3, 0, false).is_active());
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let event = Event::new(Payload::bare("release"), Some(Action::Create));
        let err = process_isolated(&Panicky, event).await.unwrap_err();
        match err {
            PluginError::Panicked(msg) => assert_eq!(msg, "cannot handle release:create"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_try_send_full() {
        let (tx, _rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        sender.try_send(Event::new(Payload::bare("a"), None)).unwrap();
        assert_eq!(sender.try_send(Event::new(Payload::bare("b"), None)), Err(SendError::Full));
        assert_eq!(sender.capacity(), 0);
    }
}
