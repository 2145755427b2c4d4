//! Durable job queue contract.
//!
//! When queueing is enabled the dispatcher does not run plugins directly. Each
//! matched (event, plugin) pair becomes a [`Job`] on the queue named after the
//! plugin, and the backend runs it through the worker registered for that queue,
//! retrying failed attempts up to the job's retry count.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchyard_id::JobId;
use tokio::sync::watch;

use crate::QueueError;

pub use memory::{DeadJob, MemoryQueue};

/// Job type for events routed to a plugin.
pub const EVENT_JOB_TYPE: &str = "Event";

/// A unit of work on a named queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_type: String,
    pub payload: Value,
    /// Zero on first delivery, incremented on each retry.
    #[serde(default)]
    pub attempt: u32,
}

impl Job {
    pub fn new(queue: impl Into<String>, job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: JobId::new(),
            queue: queue.into(),
            job_type: job_type.into(),
            payload,
            attempt: 0,
        }
    }
}

/// Per-job delivery options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueOptions {
    pub retry: bool,
    pub retry_count: u32,
}

impl EnqueueOptions {
    /// Retry enabled iff `retries > 0`.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retry: retries > 0,
            retry_count: retries,
        }
    }
}

/// Runs jobs from one queue.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<(), QueueError>;
}

/// A durable, retrying work queue backend.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Registers this worker process with the backend. Called once, before anything
    /// else.
    async fn configure(&self, process_id: &str) -> Result<(), QueueError>;

    /// Attaches a handler to a queue, running at most `concurrency` jobs at once.
    async fn register_worker(
        &self,
        queue: &str,
        handler: std::sync::Arc<dyn JobHandler>,
        concurrency: usize,
    ) -> Result<(), QueueError>;

    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> Result<JobId, QueueError>;

    /// Processes jobs until `shutdown` flips to true.
    async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), QueueError>;
}

// =============================================================================
// Backoff Policy
// =============================================================================

/// Exponential backoff between retry attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base.saturating_mul(factor).min(self.max)
    }
}
