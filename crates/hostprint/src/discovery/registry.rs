//! Plugin registry.
//!
//! Registration is explicit: the binary wires the plugins it ships at
//! startup, tests build their own registry. The process-wide instance
//! behind [`PluginRegistry::global`] is mutated during startup only and
//! treated as read-only afterwards.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::plugin::DiscoveryPlugin;
use crate::error::{Error, Result};

/// Registry of discovery plugins keyed by name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<BTreeMap<String, Arc<dyn DiscoveryPlugin>>>,
}

impl PluginRegistry {
    /// Create an empty registry (for tests and embedders)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static PluginRegistry {
        static GLOBAL: OnceLock<PluginRegistry> = OnceLock::new();
        GLOBAL.get_or_init(PluginRegistry::new)
    }

    /// Register a plugin. Registering a second plugin under an
    /// already-taken name is an error.
    pub fn register(&self, plugin: Arc<dyn DiscoveryPlugin>) -> Result<()> {
        let name = plugin.name().to_string();
        let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
        if plugins.contains_key(&name) {
            return Err(Error::PluginConflict(name));
        }
        plugins.insert(name, plugin);
        Ok(())
    }

    /// Look up a plugin by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn DiscoveryPlugin>> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Names of all registered plugins, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// All registered plugin instances, in name order
    #[must_use]
    pub fn instances(&self) -> Vec<Arc<dyn DiscoveryPlugin>> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Only the plugins whose credentials are present
    #[must_use]
    pub fn configured_plugins(&self) -> Vec<Arc<dyn DiscoveryPlugin>> {
        self.instances()
            .into_iter()
            .filter(|p| p.is_configured())
            .collect()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
