//! Test-event capture.
//!
//! A bus built with [`crate::Bus::new_test`] mirrors every event the dispatcher reads
//! into a side channel. Tests wait on it for the event a plugin is expected to emit.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use switchyard_events::Event;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

use crate::CaptureError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Consumer end of the capture channel. Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct EventCapture {
    rx: Option<Arc<Mutex<mpsc::Receiver<Event>>>>,
}

impl EventCapture {
    pub(crate) fn new(rx: mpsc::Receiver<Event>) -> Self {
        Self {
            rx: Some(Arc::new(Mutex::new(rx))),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self { rx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.rx.is_some()
    }

    /// Waits for an event whose name matches the regex `"<name>:<action>"`.
    ///
    /// Events that do not match are consumed and discarded. Polls every 50ms until
    /// `timeout` has elapsed.
    pub async fn capture_named_event(
        &self,
        name: &str,
        action: impl Display,
        timeout: Duration,
    ) -> Result<Event, CaptureError> {
        let rx = self.rx.as_ref().ok_or(CaptureError::Disabled)?;
        let target = format!("{}:{}", name, action);
        let pattern = Regex::new(&target)?;

        let started = Instant::now();
        let mut rx = rx.lock().await;

        loop {
            match rx.try_recv() {
                Ok(event) if event.matches(&pattern) => return Ok(event),
                Ok(event) => {
                    trace!(event_name = %event.name(), wanted = %target, "Discarding captured event");
                }
                Err(mpsc::error::TryRecvError::Empty) => {
                    if started.elapsed() < timeout {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                }
                Err(mpsc::error::TryRecvError::Disconnected) => return Err(CaptureError::Closed),
            }

            // A steady stream of non-matching events must not outlast the timeout.
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(CaptureError::Timeout {
                    name: target,
                    elapsed,
                });
            }
        }
    }

    /// Removes every event currently buffered.
    pub async fn drain(&self) -> Vec<Event> {
        let Some(rx) = &self.rx else {
            return Vec::new();
        };
        let mut rx = rx.lock().await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }
}
