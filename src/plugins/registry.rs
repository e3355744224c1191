//! Capability registry: plugin `type` string to factory.
//!
//! Populated once at process start from the configured list of plugin
//! types and handed to the catalog and the orchestrator explicitly.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::dummy::DummyFactory;
use super::rest::RestFactory;
use super::traits::{Capability, PluginFactory, ValidationError};
use crate::model::Plugin;

/// Failure to turn a stored plugin into a capability object.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown plugin type '{0}'")]
    UnknownType(String),
    #[error("invalid config for plugin type '{plugin_type}': {source}")]
    InvalidConfig {
        plugin_type: String,
        #[source]
        source: ValidationError,
    },
}

/// Registry of plugin factories keyed by type name.
///
/// Thread-safe for concurrent lookups from request handlers.
pub struct CapabilityRegistry {
    factories: RwLock<HashMap<&'static str, Arc<dyn PluginFactory>>>,
}

impl CapabilityRegistry {
    /// An empty registry. Mostly useful in tests.
    pub fn empty() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with every built-in plugin type.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        for factory in builtin_factories() {
            registry.register(factory);
        }
        registry
    }

    /// Registry with only the named built-in plugin types.
    pub fn from_enabled(enabled: &[String]) -> Result<Self, RegistryError> {
        let mut available: HashMap<&'static str, Arc<dyn PluginFactory>> = builtin_factories()
            .into_iter()
            .map(|factory| (factory.type_name(), factory))
            .collect();

        let registry = Self::empty();
        for name in enabled {
            if registry.get(name).is_some() {
                continue;
            }
            let factory = available
                .remove(name.as_str())
                .ok_or_else(|| RegistryError::UnknownType(name.clone()))?;
            registry.register(factory);
        }
        Ok(registry)
    }

    /// Register a factory, replacing any previous one with the same name.
    pub fn register(&self, factory: Arc<dyn PluginFactory>) {
        let name = factory.type_name();
        tracing::info!(plugin_type = %name, "Registered plugin type");
        self.factories.write().insert(name, factory);
    }

    /// Look up the factory for a plugin type.
    pub fn get(&self, plugin_type: &str) -> Option<Arc<dyn PluginFactory>> {
        self.factories.read().get(plugin_type).cloned()
    }

    /// Check a would-be plugin's type and config before it is persisted.
    pub fn validate(
        &self,
        plugin_type: &str,
        config: &serde_json::Value,
    ) -> Result<(), RegistryError> {
        let factory = self
            .get(plugin_type)
            .ok_or_else(|| RegistryError::UnknownType(plugin_type.to_string()))?;
        factory
            .validate_config(config)
            .map_err(|source| RegistryError::InvalidConfig {
                plugin_type: plugin_type.to_string(),
                source,
            })
    }

    /// Build the capability object for a stored plugin.
    pub fn instantiate(&self, plugin: &Plugin) -> Result<Box<dyn Capability>, RegistryError> {
        let factory = self
            .get(&plugin.plugin_type)
            .ok_or_else(|| RegistryError::UnknownType(plugin.plugin_type.clone()))?;
        factory
            .instantiate(&plugin.config)
            .map_err(|source| RegistryError::InvalidConfig {
                plugin_type: plugin.plugin_type.clone(),
                source,
            })
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.read().keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

fn builtin_factories() -> Vec<Arc<dyn PluginFactory>> {
    vec![Arc::new(DummyFactory), Arc::new(RestFactory)]
}
