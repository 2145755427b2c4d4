//! switchyard host
//!
//! Runs the event bus with the built-in plugins until Ctrl-C.

use anyhow::{Context, Result};
use switchyard_bus::{Bus, PluginRegistry};
use switchyard_host::{register_builtin, HostConfig};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = HostConfig::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        plugins = config.bus.plugins.len(),
        enabled = ?config.bus.enabled_plugins,
        queueing = config.bus.queueing,
        "Starting switchyard host"
    );

    let registry = PluginRegistry::new();
    register_builtin(&registry);

    let bus = Bus::new(&registry, config.bus).context("Failed to build bus")?;
    info!(plugins = ?bus.plugin_names(), "Bus configured");

    let shutdown = bus.shutdown_handle();
    let mut bus_handle = tokio::spawn(bus.run());

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut bus_handle => {
            return match result {
                Ok(Ok(())) => {
                    info!("Bus exited");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Bus failed");
                    Err(e.into())
                }
                Err(e) => {
                    error!(error = %e, "Bus task panicked");
                    Err(e.into())
                }
            };
        }
    }

    shutdown.trigger();
    bus_handle
        .await
        .context("Bus task panicked")?
        .context("Bus failed during shutdown")?;

    info!("Switchyard host shutdown complete");
    Ok(())
}
