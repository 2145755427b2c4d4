//! Name to factory mapping for plugins.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::{BusError, Plugin};

/// Builds a fresh, unconfigured plugin instance.
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Registry of plugin factories, keyed by name.
///
/// Populated at startup and passed to [`crate::Bus::new`]. Reads may happen
/// concurrently with each other.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    factories: Arc<RwLock<HashMap<String, PluginFactory>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory. A later registration under the same name replaces the
    /// earlier one.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut factories = self.factories.write().unwrap_or_else(|e| e.into_inner());
        if factories.insert(name.clone(), Arc::new(factory)).is_some() {
            debug!(plugin = %name, "Replaced plugin factory");
        } else {
            debug!(plugin = %name, "Registered plugin factory");
        }
    }

    /// Instantiates the plugin registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn Plugin>, BusError> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::UnknownPlugin(name.to_string()))?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventSender, PluginError};
    use async_trait::async_trait;
    use switchyard_events::Event;

    struct Named(&'static str);

    #[async_trait]
    impl Plugin for Named {
        async fn start(&self, _events: EventSender) -> Result<(), PluginError> {
            Ok(())
        }

        async fn stop(&self) {}

        fn subscribe(&self) -> Vec<String> {
            vec![self.0.to_string()]
        }

        async fn process(&self, _event: Event) -> Result<(), PluginError> {
            Ok(())
        }
    }

    #[test]
    fn test_resolve_registered() {
        let registry = PluginRegistry::new();
        registry.register("database", || Box::new(Named("first")));

        let plugin = registry.resolve("database").unwrap();
        assert_eq!(plugin.subscribe(), vec!["first"]);
        assert!(registry.contains("database"));
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = PluginRegistry::new();
        let err = registry.resolve("slack").err().unwrap();
        assert!(matches!(err, BusError::UnknownPlugin(ref name) if name == "slack"));
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = PluginRegistry::new();
        registry.register("database", || Box::new(Named("first")));
        registry.register("database", || Box::new(Named("second")));

        assert_eq!(registry.resolve("database").unwrap().subscribe(), vec!["second"]);
        assert_eq!(registry.names(), vec!["database"]);
    }

    #[test]
    fn test_names_sorted() {
        let registry = PluginRegistry::new();
        registry.register("b", || Box::new(Named("b")));
        registry.register("a", || Box::new(Named("a")));
        assert_eq!(registry.names(), vec!["a", "b"]);
    }
}
