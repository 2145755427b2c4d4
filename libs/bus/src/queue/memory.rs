//! In-process job queue backend.
//!
//! Jobs live in one bounded channel per queue and are lost when the process exits.
//! Each queue has a worker loop bounded by the registered concurrency; failed jobs
//! are redelivered with exponential backoff and land in a dead list once their
//! retries are exhausted.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use switchyard_id::JobId;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use super::{BackoffPolicy, EnqueueOptions, Job, JobHandler, JobQueue};
use crate::config::DEFAULT_QUEUE_CAPACITY;
use crate::{shutdown_signalled, QueueError};

/// A job that failed on every allowed attempt.
#[derive(Debug, Clone)]
pub struct DeadJob {
    pub job: Job,
    pub error: String,
}

struct Delivery {
    job: Job,
    options: EnqueueOptions,
}

struct Worker {
    rx: mpsc::Receiver<Delivery>,
    handler: Arc<dyn JobHandler>,
    concurrency: usize,
}

struct QueueSlot {
    tx: mpsc::Sender<Delivery>,
    /// Taken by `run`.
    worker: Option<Worker>,
}

struct Inner {
    process_id: Mutex<Option<String>>,
    queues: Mutex<HashMap<String, QueueSlot>>,
    dead: Mutex<Vec<DeadJob>>,
    backoff: BackoffPolicy,
    capacity: usize,
}

/// In-memory [`JobQueue`].
#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_backoff(BackoffPolicy::default())
    }

    pub fn with_backoff(backoff: BackoffPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                process_id: Mutex::new(None),
                queues: Mutex::new(HashMap::new()),
                dead: Mutex::new(Vec::new()),
                backoff,
                capacity: DEFAULT_QUEUE_CAPACITY,
            }),
        }
    }

    /// The process id passed to `configure`, if any.
    pub fn process_id(&self) -> Option<String> {
        lock(&self.inner.process_id).clone()
    }

    /// Jobs that exhausted their retries, oldest first.
    pub fn dead_jobs(&self) -> Vec<DeadJob> {
        lock(&self.inner.dead).clone()
    }

    /// Queues with a registered worker, sorted.
    pub fn queues(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner.queues).keys().cloned().collect();
        names.sort();
        names
    }

    fn ensure_configured(&self) -> Result<(), QueueError> {
        if lock(&self.inner.process_id).is_none() {
            return Err(QueueError::NotConfigured);
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn configure(&self, process_id: &str) -> Result<(), QueueError> {
        info!(process_id = %process_id, "Configured in-memory job queue");
        *lock(&self.inner.process_id) = Some(process_id.to_string());
        Ok(())
    }

    async fn register_worker(
        &self,
        queue: &str,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
    ) -> Result<(), QueueError> {
        self.ensure_configured()?;

        let mut queues = lock(&self.inner.queues);
        if queues.contains_key(queue) {
            return Err(QueueError::AlreadyRegistered(queue.to_string()));
        }

        let (tx, rx) = mpsc::channel(self.inner.capacity);
        queues.insert(
            queue.to_string(),
            QueueSlot {
                tx,
                worker: Some(Worker {
                    rx,
                    handler,
                    concurrency,
                }),
            },
        );
        debug!(queue = %queue, concurrency, "Registered queue worker");
        Ok(())
    }

    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> Result<JobId, QueueError> {
        self.ensure_configured()?;

        let tx = lock(&self.inner.queues)
            .get(&job.queue)
            .map(|slot| slot.tx.clone())
            .ok_or_else(|| QueueError::UnknownQueue(job.queue.clone()))?;

        let id = job.id;
        tx.send(Delivery { job, options })
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(id)
    }

    async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        self.ensure_configured()?;

        let workers: Vec<(String, mpsc::Sender<Delivery>, Worker)> = lock(&self.inner.queues)
            .iter_mut()
            .filter_map(|(name, slot)| {
                slot.worker
                    .take()
                    .map(|worker| (name.clone(), slot.tx.clone(), worker))
            })
            .collect();

        info!(queues = workers.len(), "Job queue running");

        let mut handles = Vec::with_capacity(workers.len());
        for (queue, tx, worker) in workers {
            handles.push(tokio::spawn(worker_loop(
                Arc::clone(&self.inner),
                queue,
                tx,
                worker,
                shutdown.clone(),
            )));
        }

        let mut shutdown = shutdown;
        shutdown_signalled(&mut shutdown).await;

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Queue worker task failed");
            }
        }

        info!("Job queue stopped");
        Ok(())
    }
}

// =============================================================================
// Worker Loop
// =============================================================================

async fn worker_loop(
    inner: Arc<Inner>,
    queue: String,
    retry_tx: mpsc::Sender<Delivery>,
    mut worker: Worker,
    mut shutdown: watch::Receiver<bool>,
) {
    let permits = Arc::new(Semaphore::new(worker.concurrency.max(1)));

    loop {
        let delivery = tokio::select! {
            biased;

            _ = shutdown_signalled(&mut shutdown) => break,

            delivery = worker.rx.recv() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;

            _ = shutdown_signalled(&mut shutdown) => break,

            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        tokio::spawn(run_job(
            Arc::clone(&inner),
            queue.clone(),
            Arc::clone(&worker.handler),
            retry_tx.clone(),
            delivery,
            permit,
        ));
    }

    debug!(queue = %queue, "Queue worker stopped");
}

async fn run_job(
    inner: Arc<Inner>,
    queue: String,
    handler: Arc<dyn JobHandler>,
    retry_tx: mpsc::Sender<Delivery>,
    delivery: Delivery,
    permit: OwnedSemaphorePermit,
) {
    let Delivery { mut job, options } = delivery;

    let result = match AssertUnwindSafe(handler.handle(&job)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(QueueError::Handler("job handler panicked".to_string())),
    };
    drop(permit);

    let err = match result {
        Ok(()) => {
            debug!(queue = %queue, job_id = %job.id, attempt = job.attempt, "Job completed");
            return;
        }
        Err(err) => err,
    };

    if options.retry && job.attempt < options.retry_count {
        let delay = inner.backoff.delay(job.attempt);
        warn!(
            queue = %queue,
            job_id = %job.id,
            attempt = job.attempt,
            delay_ms = millis(delay),
            error = %err,
            "Job failed, scheduling retry"
        );
        tokio::time::sleep(delay).await;
        job.attempt += 1;
        if let Err(mpsc::error::SendError(delivery)) = retry_tx.send(Delivery { job, options }).await {
            bury(&inner, &queue, delivery.job, "queue closed before retry".to_string());
        }
    } else {
        bury(&inner, &queue, job, err.to_string());
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

fn bury(inner: &Inner, queue: &str, job: Job, error: String) {
    error!(
        queue = %queue,
        job_id = %job.id,
        attempts = job.attempt + 1,
        error = %error,
        "Job permanently failed"
    );
    lock(&inner.dead).push(DeadJob { job, error });
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    /// Fails the first `failures` attempts, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for Flaky {
        async fn handle(&self, _job: &Job) -> Result<(), QueueError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(QueueError::Handler(format!("attempt {call} failed")))
            } else {
                Ok(())
            }
        }
    }

    struct Slow {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        done: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for Slow {
        async fn handle(&self, _job: &Job) -> Result<(), QueueError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_queue() -> MemoryQueue {
        MemoryQueue::with_backoff(BackoffPolicy {
            base: Duration::from_millis(1),
            max: Duration::from_millis(5),
        })
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !check() {
            assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn job(queue: &str) -> Job {
        Job::new(queue, "Event", serde_json::json!({"n": 1}))
    }

    #[tokio::test]
    async fn test_requires_configure() {
        let queue = fast_queue();
        let err = queue.enqueue(job("db"), EnqueueOptions::default()).await.unwrap_err();
        assert_eq!(err, QueueError::NotConfigured);
    }

    #[tokio::test]
    async fn test_unknown_queue_and_duplicate_worker() {
        let queue = fast_queue();
        queue.configure("wrk-test").await.unwrap();
        assert_eq!(queue.process_id().as_deref(), Some("wrk-test"));

        let err = queue.enqueue(job("db"), EnqueueOptions::default()).await.unwrap_err();
        assert_eq!(err, QueueError::UnknownQueue("db".to_string()));

        let handler = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        queue.register_worker("db", handler.clone(), 1).await.unwrap();
        let err = queue.register_worker("db", handler, 1).await.unwrap_err();
        assert_eq!(err, QueueError::AlreadyRegistered("db".to_string()));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let queue = fast_queue();
        queue.configure("wrk-test").await.unwrap();
        let handler = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        queue.register_worker("db", handler.clone(), 1).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn({
            let queue = queue.clone();
            async move { queue.run(shutdown_rx).await }
        });

        queue.enqueue(job("db"), EnqueueOptions::with_retries(3)).await.unwrap();
        eventually(|| handler.calls.load(Ordering::SeqCst) == 3).await;
        assert!(queue.dead_jobs().is_empty());

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_exhausted_job_is_dead() {
        let queue = fast_queue();
        queue.configure("wrk-test").await.unwrap();
        let handler = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        queue.register_worker("db", handler.clone(), 1).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn({
            let queue = queue.clone();
            async move { queue.run(shutdown_rx).await }
        });

        let id = queue.enqueue(job("db"), EnqueueOptions::with_retries(2)).await.unwrap();
        eventually(|| !queue.dead_jobs().is_empty()).await;

        let dead = queue.dead_jobs();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.id, id);
        assert_eq!(dead[0].job.attempt, 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_no_retry_without_option() {
        let queue = fast_queue();
        queue.configure("wrk-test").await.unwrap();
        let handler = Arc::new(Flaky {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        queue.register_worker("db", handler.clone(), 1).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn({
            let queue = queue.clone();
            async move { queue.run(shutdown_rx).await }
        });

        queue.enqueue(job("db"), EnqueueOptions::with_retries(0)).await.unwrap();
        eventually(|| queue.dead_jobs().len() == 1).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let queue = fast_queue();
        queue.configure("wrk-test").await.unwrap();
        let handler = Arc::new(Slow {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        });
        queue.register_worker("build", handler.clone(), 2).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn({
            let queue = queue.clone();
            async move { queue.run(shutdown_rx).await }
        });

        for _ in 0..6 {
            queue.enqueue(job("build"), EnqueueOptions::default()).await.unwrap();
        }
        eventually(|| handler.done.load(Ordering::SeqCst) == 6).await;
        assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap().unwrap();
    }
}
