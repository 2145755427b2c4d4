//! switchyard host
//!
//! Loads configuration, registers the built-in plugins and runs the bus.
//!
//! ## Modules
//!
//! - `config`: layered configuration (embedded defaults, file, environment)
//! - `plugins`: built-in `heartbeat` and `audit` plugins

pub mod config;
pub mod plugins;

pub use config::HostConfig;
pub use plugins::register_builtin;
