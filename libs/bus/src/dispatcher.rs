//! The routing loop.
//!
//! One task reads the inbound queue in FIFO order and, for every event, hands it to
//! each active plugin whose subscriptions match the event name. The loop never waits
//! on a plugin: direct dispatch spawns a task per (event, plugin) pair and the
//! concurrency ceiling is applied inside that task.

use std::sync::Arc;

use regex::Regex;
use switchyard_events::Event;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::plugin::process_isolated;
use crate::queue::{EnqueueOptions, Job, JobQueue, EVENT_JOB_TYPE};
use crate::{Plugin, RunningPlugin};

/// Snapshot of an active plugin, taken once the lifecycle manager has started it.
pub(crate) struct Route {
    name: String,
    plugin: Arc<dyn Plugin>,
    subscriptions: Arc<[Regex]>,
    permits: Arc<Semaphore>,
    worker_retries: u32,
}

impl Route {
    pub(crate) fn from_running(running: &RunningPlugin) -> Self {
        Self {
            name: running.name().to_string(),
            plugin: Arc::clone(running.plugin()),
            subscriptions: Arc::clone(running.subscriptions()),
            permits: Arc::clone(running.permits()),
            worker_retries: running.worker_retries(),
        }
    }

    fn matches(&self, event: &Event) -> bool {
        self.subscriptions.iter().any(|pattern| event.matches(pattern))
    }
}

pub(crate) struct Dispatcher {
    routes: Vec<Route>,
    queue: Option<Arc<dyn JobQueue>>,
    capture: Option<mpsc::Sender<Event>>,
}

impl Dispatcher {
    pub(crate) fn new(
        routes: Vec<Route>,
        queue: Option<Arc<dyn JobQueue>>,
        capture: Option<mpsc::Sender<Event>>,
    ) -> Self {
        Self {
            routes,
            queue,
            capture,
        }
    }

    /// Routes events until shutdown is signalled or every producer is gone.
    pub(crate) async fn run(self, mut inbound: mpsc::Receiver<Event>, mut shutdown: watch::Receiver<bool>) {
        info!(routes = self.routes.len(), queueing = self.queue.is_some(), "Dispatcher started");

        loop {
            tokio::select! {
                biased;

                _ = crate::shutdown_signalled(&mut shutdown) => {
                    info!("Dispatcher received shutdown signal");
                    break;
                }

                event = inbound.recv() => {
                    match event {
                        Some(event) => self.dispatch(event).await,
                        None => {
                            info!("Inbound queue closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("Dispatcher stopped");
    }

    async fn dispatch(&self, event: Event) {
        let mut handled = false;

        for route in self.routes.iter().filter(|route| route.matches(&event)) {
            handled = true;
            match &self.queue {
                Some(queue) => self.enqueue(queue.as_ref(), route, &event).await,
                None => spawn_process(route, event.clone()),
            }
        }

        match &self.capture {
            Some(capture) => {
                if let Err(mpsc::error::TrySendError::Full(event)) = capture.try_send(event) {
                    warn!(event_name = %event.name(), "Capture channel full, dropping event");
                }
            }
            None if !handled => {
                warn!(event_name = %event.name(), "Event not handled by any plugin");
            }
            None => {}
        }
    }

    async fn enqueue(&self, queue: &dyn JobQueue, route: &Route, event: &Event) {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(plugin = %route.name, event_name = %event.name(), error = %e, "Failed to encode event job");
                return;
            }
        };

        let job = Job::new(route.name.clone(), EVENT_JOB_TYPE, payload);
        match queue.enqueue(job, EnqueueOptions::with_retries(route.worker_retries)).await {
            Ok(job_id) => {
                debug!(plugin = %route.name, event_name = %event.name(), job_id = %job_id, "Enqueued event")
            }
            Err(e) => {
                error!(plugin = %route.name, event_name = %event.name(), error = %e, "Failed to enqueue event")
            }
        }
    }
}

fn spawn_process(route: &Route, event: Event) {
    let name = route.name.clone();
    let plugin = Arc::clone(&route.plugin);
    let permits = Arc::clone(&route.permits);

    tokio::spawn(async move {
        let Ok(_permit) = permits.acquire_owned().await else {
            return;
        };
        let event_name = event.name().to_string();
        debug!(plugin = %name, event_name = %event_name, "Processing event");

        if let Err(e) = process_isolated(plugin.as_ref(), event).await {
            error!(plugin = %name, event_name = %event_name, error = %e, "Plugin failed to process event");
        }
    });
}
