//! Configuration for the host process.
//!
//! Sources, lowest priority first:
//! 1. `configs/switchyard.toml`, compiled into the binary
//! 2. the file named by `SWITCHYARD_CONFIG` (default `configs/switchyard.toml`), optional
//! 3. `SWITCHYARD_*` environment variables, `__` separating nested keys

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

/// Embedded defaults.
pub const DEFAULT_CONFIG: &str = include_str!("../configs/switchyard.toml");

const DEFAULT_CONFIG_PATH: &str = "configs/switchyard.toml";

/// Host configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Log level used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bus settings: plugins, enabled plugins, queueing.
    #[serde(default)]
    pub bus: switchyard_bus::Config,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl HostConfig {
    /// Load configuration from the embedded defaults, the config file and the
    /// environment.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("SWITCHYARD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix("SWITCHYARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Parse a TOML document on top of the embedded defaults.
    pub fn from_toml(overrides: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(overrides, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = HostConfig::from_toml("").unwrap();
        assert_eq!(config.log_level, "info");
        assert!(!config.bus.queueing);

        let heartbeat = &config.bus.plugins["heartbeat"];
        assert_eq!(heartbeat.workers, 1);
        assert_eq!(heartbeat.settings["tick"], "minute");
        assert_eq!(config.bus.plugins["audit"].workers, 4);
    }

    #[test]
    fn test_overrides_merge_with_defaults() {
        let config = HostConfig::from_toml(
            r#"
            log_level = "debug"

            [bus]
            queueing = true
            enabled_plugins = ["audit"]

            [bus.plugins.audit]
            workers = 8
            worker_retries = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert!(config.bus.queueing);
        assert!(config.bus.is_enabled("audit"));
        assert!(!config.bus.is_enabled("heartbeat"));

        let audit = &config.bus.plugins["audit"];
        assert_eq!(audit.workers, 8);
        assert_eq!(audit.worker_retries, 2);
        assert_eq!(audit.settings["patterns"], serde_json::json!([".*"]));
    }
}
