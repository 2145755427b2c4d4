//! Bus configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default inbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Bus configuration. Immutable for the lifetime of a bus.
///
/// ```text
/// plugins:
///   database: { workers: 2, worker_retries: 3, host: "db.internal" }
///   slack:    { workers: 1 }
/// enabled_plugins: [database]
/// queueing: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Plugin name to its settings.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,

    /// Plugins allowed to run. Empty means all.
    #[serde(default)]
    pub enabled_plugins: Vec<String>,

    /// Dispatch through the durable job queue instead of direct tasks.
    #[serde(default)]
    pub queueing: bool,

    /// Worker process name registered with the job queue. Generated when absent.
    #[serde(default)]
    pub process: Option<String>,

    /// Inbound (and capture) queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugins: BTreeMap::new(),
            enabled_plugins: Vec::new(),
            queueing: false,
            process: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin(mut self, name: impl Into<String>, config: PluginConfig) -> Self {
        self.plugins.insert(name.into(), config);
        self
    }

    pub fn enable(mut self, name: impl Into<String>) -> Self {
        self.enabled_plugins.push(name.into());
        self
    }

    pub fn queueing(mut self, queueing: bool) -> Self {
        self.queueing = queueing;
        self
    }

    pub fn process(mut self, process: impl Into<String>) -> Self {
        self.process = Some(process.into());
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Whether the named plugin may run.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_plugins.is_empty() || self.enabled_plugins.iter().any(|n| n == name)
    }
}

/// Settings for one plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Concurrency ceiling. Zero keeps the plugin registered but never started.
    #[serde(default)]
    pub workers: usize,

    /// Queue redeliveries after a failed attempt.
    #[serde(default)]
    pub worker_retries: u32,

    /// Plugin-specific fields, handed to `Plugin::configure`.
    #[serde(flatten)]
    pub settings: BTreeMap<String, Value>,
}

impl PluginConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    pub fn retries(mut self, worker_retries: u32) -> Self {
        self.worker_retries = worker_retries;
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// The plugin-specific fields as a JSON object.
    pub fn settings_value(&self) -> Value {
        Value::Object(self.settings.clone().into_iter().collect())
    }
}
