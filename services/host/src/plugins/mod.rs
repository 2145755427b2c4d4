//! Plugins built into the host.

mod audit;
mod heartbeat;

pub use audit::AuditPlugin;
pub use heartbeat::HeartbeatPlugin;

use switchyard_bus::{Plugin, PluginRegistry};

/// Registers every built-in plugin under its configuration name.
pub fn register_builtin(registry: &PluginRegistry) {
    registry.register("heartbeat", || -> Box<dyn Plugin> { Box::new(HeartbeatPlugin::default()) });
    registry.register("audit", || -> Box<dyn Plugin> { Box::new(AuditPlugin::default()) });
}
