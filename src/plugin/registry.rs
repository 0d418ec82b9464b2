//! In-memory plugin registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::contract::{Plugin, PluginMetadata};
use crate::error::{PipewrightError, Result};

/// Map from plugin id to implementation.
///
/// Lookups take a shared read lock so the engine can resolve plugins while
/// a loader registers more.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, failing if its id is already taken.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let id = plugin.id().to_string();
        let mut plugins = self.plugins.write();
        if plugins.contains_key(&id) {
            return Err(PipewrightError::PluginAlreadyRegistered { id });
        }
        debug!("Registered plugin {} v{}", id, plugin.version());
        plugins.insert(id, plugin);
        Ok(())
    }

    /// Register a plugin, replacing any existing one with the same id.
    pub fn register_or_replace(&self, plugin: Arc<dyn Plugin>) {
        let id = plugin.id().to_string();
        if self.plugins.write().insert(id.clone(), plugin).is_some() {
            debug!("Replaced plugin {}", id);
        }
    }

    /// Remove a plugin. Returns whether it was present.
    pub fn unregister(&self, id: &str) -> bool {
        self.plugins.write().remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Plugin>> {
        self.get_or_none(id)
            .ok_or_else(|| PipewrightError::PluginNotFound { id: id.to_string() })
    }

    pub fn get_or_none(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.read().contains_key(id)
    }

    /// Metadata of every registered plugin, sorted by id.
    pub fn list(&self) -> Vec<PluginMetadata> {
        let mut all: Vec<_> = self
            .plugins
            .read()
            .values()
            .map(|p| p.metadata().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.plugins.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::FnPlugin;
    use crate::plugin::StepOutputs;
    use std::thread;

    fn plugin(id: &str, version: &str) -> Arc<dyn Plugin> {
        Arc::new(FnPlugin::new(
            PluginMetadata::new(id, version),
            |_, _, _| Ok(StepOutputs::new()),
        ))
    }

    #[test]
    fn register_and_get() {
        let registry = PluginRegistry::new();
        registry.register(plugin("test.a", "1.0.0")).unwrap();

        assert!(registry.contains("test.a"));
        assert_eq!(registry.get("test.a").unwrap().version(), "1.0.0");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_duplicate_fails() {
        let registry = PluginRegistry::new();
        registry.register(plugin("test.a", "1.0.0")).unwrap();

        let err = registry.register(plugin("test.a", "2.0.0")).unwrap_err();
        assert!(matches!(err, PipewrightError::PluginAlreadyRegistered { .. }));
        assert_eq!(registry.get("test.a").unwrap().version(), "1.0.0");
    }

    #[test]
    fn register_or_replace_overwrites() {
        let registry = PluginRegistry::new();
        registry.register_or_replace(plugin("test.a", "1.0.0"));
        registry.register_or_replace(plugin("test.a", "2.0.0"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("test.a").unwrap().version(), "2.0.0");
    }

    #[test]
    fn get_missing_is_not_found() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(PipewrightError::PluginNotFound { .. })
        ));
        assert!(registry.get_or_none("nope").is_none());
    }

    #[test]
    fn unregister_removes() {
        let registry = PluginRegistry::new();
        registry.register(plugin("test.a", "1.0.0")).unwrap();

        assert!(registry.unregister("test.a"));
        assert!(!registry.unregister("test.a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn list_is_sorted_by_id() {
        let registry = PluginRegistry::new();
        registry.register(plugin("z.last", "1.0.0")).unwrap();
        registry.register(plugin("a.first", "1.0.0")).unwrap();

        let ids: Vec<_> = registry.list().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a.first", "z.last"]);
        assert_eq!(registry.ids(), vec!["a.first", "z.last"]);
    }

    #[test]
    fn concurrent_reads_during_writes() {
        let registry = Arc::new(PluginRegistry::new());
        registry.register(plugin("test.base", "1.0.0")).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry.register_or_replace(plugin(&format!("test.p{}", i), "1.0.0"));
                    assert!(registry.get("test.base").is_ok());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 5);
    }
}
