//! Periodic `heartbeat:create:<tick>` events.
//!
//! Scheduled plugins (git pollers, cleanup jobs) subscribe to these instead of
//! running their own timers.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use switchyard_bus::{EventSender, Plugin, PluginError};
use switchyard_events::{Event, Heartbeat};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct HeartbeatSettings {
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
    #[serde(default = "default_tick")]
    tick: String,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_tick() -> String {
    "minute".to_string()
}

struct Ticker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Emits a heartbeat event every `interval_secs`.
pub struct HeartbeatPlugin {
    interval: Duration,
    tick: String,
    ticker: Mutex<Option<Ticker>>,
}

impl Default for HeartbeatPlugin {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(default_interval_secs()),
            tick: default_tick(),
            ticker: Mutex::new(None),
        }
    }
}

impl HeartbeatPlugin {
    pub fn new(interval: Duration, tick: impl Into<String>) -> Self {
        Self {
            interval,
            tick: tick.into(),
            ticker: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Plugin for HeartbeatPlugin {
    fn configure(&mut self, settings: &Value) -> Result<(), PluginError> {
        let settings: HeartbeatSettings = serde_json::from_value(settings.clone())
            .map_err(|e| PluginError::Config(e.to_string()))?;
        if settings.interval_secs == 0 {
            return Err(PluginError::Config("interval_secs must be positive".to_string()));
        }
        self.interval = Duration::from_secs(settings.interval_secs);
        self.tick = settings.tick;
        Ok(())
    }

    async fn start(&self, events: EventSender) -> Result<(), PluginError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_ticker(
            events,
            self.interval,
            self.tick.clone(),
            shutdown_rx,
        ));

        let previous = self
            .ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Ticker {
                shutdown: shutdown_tx,
                handle,
            });
        if let Some(previous) = previous {
            let _ = previous.shutdown.send(true);
        }
        Ok(())
    }

    async fn stop(&self) {
        let ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(ticker) = ticker {
            let _ = ticker.shutdown.send(true);
            if let Err(e) = ticker.handle.await {
                warn!(error = %e, "Heartbeat ticker task failed");
            }
        }
    }

    fn subscribe(&self) -> Vec<String> {
        Vec::new()
    }

    async fn process(&self, _event: Event) -> Result<(), PluginError> {
        Ok(())
    }
}

async fn run_ticker(
    events: EventSender,
    interval: Duration,
    tick: String,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), tick = %tick, "Starting heartbeat loop");

    let mut interval_timer = tokio::time::interval(interval);
    // The first tick completes immediately; heartbeats start one interval in.
    interval_timer.tick().await;

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                let event = Event::create(Heartbeat { tick: tick.clone() });
                debug!(event_name = %event.name(), "Heartbeat");
                if events.send(event).await.is_err() {
                    info!("Inbound queue closed, stopping heartbeat loop");
                    break;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Heartbeat loop shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure() {
        let mut plugin = HeartbeatPlugin::default();
        plugin
            .configure(&serde_json::json!({"interval_secs": 5, "tick": "hour"}))
            .unwrap();
        assert_eq!(plugin.interval, Duration::from_secs(5));
        assert_eq!(plugin.tick, "hour");

        let err = plugin.configure(&serde_json::json!({"interval_secs": 0})).unwrap_err();
        assert!(matches!(err, PluginError::Config(_)));
    }

    #[test]
    fn test_producer_only() {
        assert!(HeartbeatPlugin::default().subscribe().is_empty());
    }
}
