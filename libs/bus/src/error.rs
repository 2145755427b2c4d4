//! Error types for the bus, its plugins, the job queue and the capture harness.

use std::time::Duration;

use switchyard_events::EventError;
use thiserror::Error;

/// Fatal errors raised while building or running a bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// No factory is registered under the configured plugin name.
    #[error("plugin {0} is not registered")]
    UnknownPlugin(String),

    /// The plugin rejected its configuration sub-tree.
    #[error("failed to configure plugin {plugin}: {reason}")]
    PluginConfig { plugin: String, reason: String },

    /// The configuration lists no plugins at all.
    #[error("no plugins configured")]
    NoPlugins,

    /// A plugin failed to start; already started plugins have been stopped.
    #[error("failed to start plugin {plugin}: {source}")]
    PluginStart {
        plugin: String,
        #[source]
        source: PluginError,
    },

    /// The durable queue backend failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Errors returned by plugin hooks.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The configuration sub-tree did not decode.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The plugin could not start.
    #[error("start refused: {0}")]
    Start(String),

    /// Processing an event failed.
    #[error("processing failed: {0}")]
    Process(String),

    /// The plugin panicked; the panic was caught at the task boundary.
    #[error("plugin panicked: {0}")]
    Panicked(String),

    /// Building or inspecting an event failed.
    #[error(transparent)]
    Event(#[from] EventError),

    /// Emitting a follow-up event failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Errors pushing an event onto the inbound queue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The queue is at capacity; the event was dropped.
    #[error("inbound queue full")]
    Full,

    /// The bus is gone.
    #[error("inbound queue closed")]
    Closed,
}

/// Errors from a durable queue backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// `run` or `enqueue` was called before `configure`.
    #[error("queue not configured")]
    NotConfigured,

    /// No worker is registered for the queue.
    #[error("no worker registered for queue {0}")]
    UnknownQueue(String),

    /// A worker is already registered for the queue.
    #[error("worker already registered for queue {0}")]
    AlreadyRegistered(String),

    /// The job payload could not be encoded or decoded.
    #[error("job encoding error: {0}")]
    Encoding(String),

    /// The job handler failed.
    #[error("job handler failed: {0}")]
    Handler(String),

    /// The backend has shut down.
    #[error("queue closed")]
    Closed,
}

/// Errors from the test-event harness.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No matching event arrived in time.
    #[error("timed out after {elapsed:?} waiting for event {name}")]
    Timeout { name: String, elapsed: Duration },

    /// The `name:action` pattern is not a valid regex.
    #[error("invalid capture pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The bus was built without a capture channel.
    #[error("event capture is not enabled on this bus")]
    Disabled,

    /// The bus dropped the capture channel.
    #[error("capture channel closed")]
    Closed,
}
