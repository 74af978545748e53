//! Logging plugins and their registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::Result;

/// Something the scheduler can run periodically
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique identifier, used as registry key
    fn id(&self) -> &str;

    /// Human readable description
    fn description(&self) -> &str;

    /// Version string, e.g. "00.01.00"
    fn version(&self) -> &str;

    /// One-time setup (acquire resources, create directories)
    async fn init(&self) -> Result<()>;

    /// True while an iteration is in progress
    fn is_working(&self) -> bool;

    /// Run one logging iteration
    async fn do_iteration(&self);

    /// Time between two iterations
    fn frequency(&self) -> Duration;
}

/// Plugins keyed by id
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, returning the one previously registered under
    /// the same id
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Option<Arc<dyn Plugin>> {
        info!("Registering plugin '{}' v{}: {}", plugin.id(), plugin.version(), plugin.description());
        self.plugins.insert(plugin.id().to_string(), plugin)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(id).cloned()
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Initialise every plugin; returns the ids that failed
    pub async fn init_all(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for (id, plugin) in &self.plugins {
            if let Err(e) = plugin.init().await {
                error!("Plugin '{}' failed to initialise: {}", id, e);
                failed.push(id.clone());
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoggerError;

    struct Dummy {
        id: &'static str,
        fail_init: bool,
    }

    #[async_trait]
    impl Plugin for Dummy {
        fn id(&self) -> &str {
            self.id
        }
        fn description(&self) -> &str {
            "dummy"
        }
        fn version(&self) -> &str {
            "00.00.01"
        }
        async fn init(&self) -> Result<()> {
            if self.fail_init {
                Err(LoggerError::ConfigurationMissing("dummy".to_string()))
            } else {
                Ok(())
            }
        }
        fn is_working(&self) -> bool {
            false
        }
        async fn do_iteration(&self) {}
        fn frequency(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PluginRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.register(Arc::new(Dummy { id: "b", fail_init: false })).is_none());
        assert!(registry.register(Arc::new(Dummy { id: "a", fail_init: false })).is_none());

        assert_eq!(registry.ids(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().id(), "a");
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_register_same_id_replaces() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Dummy { id: "a", fail_init: false }));
        let previous = registry.register(Arc::new(Dummy { id: "a", fail_init: true }));
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_init_all_reports_failures() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Dummy { id: "ok", fail_init: false }));
        registry.register(Arc::new(Dummy { id: "broken", fail_init: true }));

        assert_eq!(registry.init_all().await, vec!["broken".to_string()]);
    }
}
