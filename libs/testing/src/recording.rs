use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use switchyard_bus::{EventSender, Plugin, PluginError};
use switchyard_events::Event;
use tracing::debug;

/// Shared view of what a [`RecordingPlugin`] saw.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    inner: Arc<RecorderState>,
}

#[derive(Debug, Default)]
struct RecorderState {
    events: Mutex<Vec<Event>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processed events, in completion order.
    pub fn events(&self) -> Vec<Event> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().iter().map(|e| e.name().to_string()).collect()
    }

    pub fn count(&self) -> usize {
        self.inner
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn starts(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `process` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` events were recorded. Returns false on timeout.
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.count() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    pub(crate) fn record_start(&self) {
        self.inner.starts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_stop(&self) {
        self.inner.stops.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_attempt(&self, event: Event) {
        self.inner
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    fn enter(&self) {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self, event: Event) {
        self.record_attempt(event);
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default, Deserialize)]
struct RecordingSettings {
    #[serde(default)]
    delay_ms: u64,
}

/// Records every event it processes, optionally holding each for a while.
pub struct RecordingPlugin {
    patterns: Vec<String>,
    recorder: Recorder,
    delay: Duration,
}

impl RecordingPlugin {
    pub fn new<I, S>(patterns: I, recorder: Recorder) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            recorder,
            delay: Duration::ZERO,
        }
    }

    /// Registry factory producing plugins that share `recorder`.
    pub fn factory(
        patterns: &[&str],
        recorder: &Recorder,
    ) -> impl Fn() -> Box<dyn Plugin> + Send + Sync + 'static {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let recorder = recorder.clone();
        move || -> Box<dyn Plugin> { Box::new(RecordingPlugin::new(patterns.clone(), recorder.clone())) }
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    /// Accepts `delay_ms`: how long each `process` call holds its worker.
    fn configure(&mut self, settings: &Value) -> Result<(), PluginError> {
        let settings: RecordingSettings = serde_json::from_value(settings.clone())
            .map_err(|e| PluginError::Config(e.to_string()))?;
        self.delay = Duration::from_millis(settings.delay_ms);
        Ok(())
    }

    async fn start(&self, _events: EventSender) -> Result<(), PluginError> {
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
        self.recorder.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        debug!(event_name = %event.name(), "Recorded event");
        self.recorder.leave(event);
        Ok(())
    }
}
