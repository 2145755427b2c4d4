//! Bus construction and lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──► run: configure queue ──► start plugins ──► dispatcher (+ queue loop)
//!                                                          │
//!                         stop plugins ◄── tasks joined ◄──┘ shutdown
//! ```
//!
//! Plugin `enabled`/`started` flags change only here, before the dispatcher is
//! spawned and after it has exited.

use std::sync::Arc;

use switchyard_events::Event;
use switchyard_id::WorkerId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatcher, Route};
use crate::plugin::PluginJobHandler;
use crate::queue::{JobQueue, MemoryQueue};
use crate::{BusError, Config, EventCapture, EventSender, PluginRegistry, RunningPlugin};

/// Signals a running bus to shut down.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A configured set of plugins plus the queues that connect them.
pub struct Bus {
    plugins: Vec<RunningPlugin>,
    process: Option<String>,
    queue: Option<Arc<dyn JobQueue>>,
    inbound_tx: mpsc::Sender<Event>,
    inbound_rx: mpsc::Receiver<Event>,
    capture_tx: Option<mpsc::Sender<Event>>,
    capture: EventCapture,
    shutdown: ShutdownHandle,
}

impl Bus {
    /// Builds a bus. With `queueing` set, jobs go through an in-memory queue.
    pub fn new(registry: &PluginRegistry, config: Config) -> Result<Self, BusError> {
        let queue: Option<Arc<dyn JobQueue>> = if config.queueing {
            Some(Arc::new(MemoryQueue::new()))
        } else {
            None
        };
        Self::build(registry, config, queue, false)
    }

    /// Builds a bus that dispatches through the given queue backend.
    pub fn with_queue(
        registry: &PluginRegistry,
        config: Config,
        queue: Arc<dyn JobQueue>,
    ) -> Result<Self, BusError> {
        Self::build(registry, config, Some(queue), false)
    }

    /// Builds a bus for tests: direct dispatch, capture channel attached.
    pub fn new_test(registry: &PluginRegistry, config: Config) -> Result<Self, BusError> {
        Self::build(registry, config.queueing(false), None, true)
    }

    /// Builds a bus for tests that dispatches through `queue`, capture attached.
    pub fn new_test_with_queue(
        registry: &PluginRegistry,
        config: Config,
        queue: Arc<dyn JobQueue>,
    ) -> Result<Self, BusError> {
        Self::build(registry, config, Some(queue), true)
    }

    fn build(
        registry: &PluginRegistry,
        config: Config,
        queue: Option<Arc<dyn JobQueue>>,
        capture: bool,
    ) -> Result<Self, BusError> {
        if config.plugins.is_empty() {
            return Err(BusError::NoPlugins);
        }

        for name in &config.enabled_plugins {
            if !config.plugins.contains_key(name) {
                warn!(plugin = %name, "Enabled plugin has no configuration");
            }
        }

        let mut plugins = Vec::with_capacity(config.plugins.len());
        for (name, plugin_config) in &config.plugins {
            let mut plugin = registry.resolve(name)?;
            plugin
                .configure(&plugin_config.settings_value())
                .map_err(|e| BusError::PluginConfig {
                    plugin: name.clone(),
                    reason: e.to_string(),
                })?;

            let running = RunningPlugin::new(
                name.clone(),
                Arc::from(plugin),
                plugin_config.workers,
                plugin_config.worker_retries,
                config.is_enabled(name),
            );
            debug!(
                plugin = %name,
                workers = running.workers(),
                worker_retries = running.worker_retries(),
                enabled = running.is_enabled(),
                "Configured plugin"
            );
            plugins.push(running);
        }

        let capacity = config.queue_capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (capture_tx, capture) = if capture {
            let (tx, rx) = mpsc::channel(capacity);
            (Some(tx), EventCapture::new(rx))
        } else {
            (None, EventCapture::disabled())
        };
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            plugins,
            process: config.process,
            queue,
            inbound_tx,
            inbound_rx,
            capture_tx,
            capture,
            shutdown: ShutdownHandle {
                tx: Arc::new(shutdown_tx),
            },
        })
    }

    /// Producer handle for the inbound queue.
    pub fn events(&self) -> EventSender {
        EventSender::new(self.inbound_tx.clone())
    }

    /// Capture channel consumer; disabled unless built with `new_test`.
    pub fn capture(&self) -> EventCapture {
        self.capture.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signals shutdown.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Configured plugin names, sorted.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(RunningPlugin::name).collect()
    }

    pub fn plugins(&self) -> &[RunningPlugin] {
        &self.plugins
    }

    pub fn is_queueing(&self) -> bool {
        self.queue.is_some()
    }

    /// Starts plugins, routes events until shutdown, then stops plugins.
    pub async fn run(self) -> Result<(), BusError> {
        let Bus {
            mut plugins,
            process,
            queue,
            inbound_tx,
            inbound_rx,
            capture_tx,
            shutdown,
            ..
        } = self;

        // Held until the end so the dispatcher only exits on shutdown.
        let events = EventSender::new(inbound_tx);
        let shutdown_rx = shutdown.tx.subscribe();

        if let Some(queue) = &queue {
            let process_id = process.unwrap_or_else(|| WorkerId::new().to_string());
            queue.configure(&process_id).await?;
            info!(process_id = %process_id, "Durable queueing enabled");
        }

        start_plugins(&mut plugins, &events, queue.as_deref()).await?;

        let routes: Vec<Route> = plugins
            .iter()
            .filter(|p| p.is_active() && p.is_started())
            .map(Route::from_running)
            .collect();
        let dispatcher = Dispatcher::new(routes, queue.clone(), capture_tx);

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        tasks.push((
            "dispatcher",
            tokio::spawn(dispatcher.run(inbound_rx, shutdown_rx.clone())),
        ));

        if let Some(queue) = queue {
            let shutdown = shutdown.clone();
            tasks.push((
                "queue",
                tokio::spawn(async move {
                    if let Err(e) = queue.run(shutdown_rx).await {
                        error!(error = %e, "Job queue exited with error");
                    }
                    shutdown.trigger();
                }),
            ));
        }

        info!(plugins = plugins.len(), "Bus running");

        for (task, handle) in tasks {
            if let Err(e) = handle.await {
                error!(task, error = %e, "Bus task failed");
            }
        }

        stop_plugins(&mut plugins).await;
        drop(events);
        info!("Bus stopped");
        Ok(())
    }
}

async fn start_plugins(
    plugins: &mut [RunningPlugin],
    events: &EventSender,
    queue: Option<&dyn JobQueue>,
) -> Result<(), BusError> {
    for idx in 0..plugins.len() {
        if !plugins[idx].is_active() {
            continue;
        }

        let name = plugins[idx].name().to_string();
        let workers = plugins[idx].workers();
        let plugin = Arc::clone(plugins[idx].plugin());

        if let Err(e) = plugin.start(events.clone()).await {
            error!(plugin = %name, error = %e, "Plugin failed to start");
            plugin.stop().await;
            stop_plugins(plugins).await;
            return Err(BusError::PluginStart {
                plugin: name,
                source: e,
            });
        }
        plugins[idx].set_started(true);
        info!(plugin = %name, workers, "Started plugin");

        if let Some(queue) = queue {
            let handler = Arc::new(PluginJobHandler::new(name.clone(), plugin));
            if let Err(e) = queue.register_worker(&name, handler, workers).await {
                error!(plugin = %name, error = %e, "Failed to register queue worker");
                stop_plugins(plugins).await;
                return Err(e.into());
            }
        }
    }

    Ok(())
}

async fn stop_plugins(plugins: &mut [RunningPlugin]) {
    for running in plugins.iter_mut() {
        if !running.is_enabled() {
            warn!(plugin = %running.name(), "Plugin not enabled, skipping stop");
            continue;
        }
        if !running.is_started() {
            warn!(plugin = %running.name(), "Plugin not started, skipping stop");
            continue;
        }
        running.plugin().stop().await;
        running.set_started(false);
        info!(plugin = %running.name(), "Stopped plugin");
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("plugins", &self.plugins)
            .field("queueing", &self.queue.is_some())
            .field("capture", &self.capture.is_enabled())
            .finish()
    }
}
