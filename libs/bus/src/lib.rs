//! # switchyard-bus
//!
//! A plugin-hosting event bus for CI/CD stage handlers.
//!
//! Producers push [`Event`]s onto a bounded inbound queue. A single dispatcher reads
//! them in order and, for every running plugin whose subscription patterns match the
//! event name, either spawns an isolated `process` call or enqueues a job on the
//! durable queue. Plugins emit follow-up events through the same inbound queue.
//!
//! ## Components
//!
//! - [`PluginRegistry`]: name to factory mapping, populated at startup
//! - [`RunningPlugin`]: a plugin instance bound to its workers/retries/enabled settings
//! - [`Bus`]: construction, startup/shutdown ordering and the routing loop
//! - [`queue`]: the durable job queue contract and an in-memory backend
//! - [`EventCapture`]: side channel tests use to wait for emitted events
//!
//! ## Delivery
//!
//! At most one dispatch per (event, plugin) pair. Nothing is retried on the direct
//! path; with queueing, failed jobs are redelivered up to the plugin's
//! `worker_retries`. There is no ordering between plugins.

mod bus;
mod capture;
mod config;
mod dispatcher;
mod error;
mod plugin;
mod registry;

pub mod queue;

pub use bus::{Bus, ShutdownHandle};
pub use capture::EventCapture;
pub use config::{Config, PluginConfig, DEFAULT_QUEUE_CAPACITY};
pub use error::{BusError, CaptureError, PluginError, QueueError, SendError};
pub use plugin::{EventSender, Plugin, RunningPlugin};
pub use registry::{PluginFactory, PluginRegistry};

pub use switchyard_events::Event;

/// Resolves once shutdown is signalled or the signal sender is gone.
pub(crate) async fn shutdown_signalled(shutdown: &mut tokio::sync::watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
