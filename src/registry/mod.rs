//! Provider catalogue.
//!
//! Endpoints are stored as `Arc<ServerEndpoint>` snapshots. Health updates
//! replace the whole `Arc`, so a reader holding a snapshot never sees a
//! half-written record. Entries are never removed.

use crate::config::NamedServerConfig;
use crate::error::RegistryError;
use crate::models::{ServerConfig, ServerEndpoint, ServerStatus};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct Entries {
    /// Registration order.
    endpoints: Vec<Arc<ServerEndpoint>>,
    index: HashMap<String, usize>,
}

/// Catalogue of providers, in registration order.
#[derive(Default)]
pub struct ServerRegistry {
    entries: RwLock<Entries>,
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from the `[[servers]]` config table.
    pub fn from_configs(servers: &[NamedServerConfig]) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for server in servers {
            registry.register(&server.name, server.server.clone())?;
        }
        Ok(registry)
    }

    /// Register a provider.
    ///
    /// Registering the same name twice with an identical config is a no-op;
    /// a different config fails with [`RegistryError::Duplicate`].
    pub fn register(&self, name: &str, config: ServerConfig) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();

        if let Some(&i) = entries.index.get(name) {
            return if entries.endpoints[i].config == config {
                debug!("Server {} already registered with identical config", name);
                Ok(())
            } else {
                Err(RegistryError::Duplicate(name.to_string()))
            };
        }

        info!(
            "Registered server {} at {} ({} capabilities)",
            name,
            config.base_url(),
            config.capabilities.len()
        );

        let position = entries.endpoints.len();
        entries
            .endpoints
            .push(Arc::new(ServerEndpoint::new(name, config)));
        entries.index.insert(name.to_string(), position);
        Ok(())
    }

    /// Look up a provider snapshot by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<ServerEndpoint>, RegistryError> {
        let entries = self.entries.read();
        entries
            .index
            .get(name)
            .map(|&i| Arc::clone(&entries.endpoints[i]))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Current status of a provider, if registered.
    pub fn status_of(&self, name: &str) -> Option<ServerStatus> {
        self.lookup(name).ok().map(|e| e.status)
    }

    /// All providers serving at least one of `capabilities`, in registration order.
    pub fn list_by_capability(&self, capabilities: &BTreeSet<String>) -> Vec<Arc<ServerEndpoint>> {
        self.entries
            .read()
            .endpoints
            .iter()
            .filter(|e| e.serves_any(capabilities))
            .cloned()
            .collect()
    }

    /// Snapshot of every provider, in registration order.
    pub fn all(&self) -> Vec<Arc<ServerEndpoint>> {
        self.entries.read().endpoints.clone()
    }

    /// Names of every provider, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .endpoints
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap in a new snapshot for an existing provider.
    ///
    /// Only the health monitor calls this.
    pub(crate) fn replace(&self, endpoint: ServerEndpoint) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        let i = *entries
            .index
            .get(&endpoint.name)
            .ok_or_else(|| RegistryError::NotFound(endpoint.name.clone()))?;
        entries.endpoints[i] = Arc::new(endpoint);
        Ok(())
    }

    /// Force a status without probing. Test helper.
    #[cfg(test)]
    pub(crate) fn set_status(&self, name: &str, status: ServerStatus) {
        let current = self.lookup(name).expect("server registered");
        self.replace(current.with_health(status, 1))
            .expect("server registered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ServerRegistry::new();
        let config = ServerConfig::new("localhost", 9001, ["x", "y"]);
        registry.register("alpha", config.clone()).unwrap();

        let endpoint = registry.lookup("alpha").unwrap();
        assert_eq!(endpoint.name, "alpha");
        assert_eq!(endpoint.config.capabilities, caps(&["x", "y"]));
        assert_eq!(endpoint.status, ServerStatus::Unhealthy);
    }

    #[test]
    fn test_register_is_idempotent_for_identical_config() {
        let registry = ServerRegistry::new();
        let config = ServerConfig::new("localhost", 9001, ["x"]);
        registry.register("alpha", config.clone()).unwrap();
        registry.register("alpha", config).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_conflicting_config_fails() {
        let registry = ServerRegistry::new();
        registry
            .register("alpha", ServerConfig::new("localhost", 9001, ["x"]))
            .unwrap();
        let err = registry
            .register("alpha", ServerConfig::new("localhost", 9002, ["x"]))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("alpha".to_string()));
        assert_eq!(registry.lookup("alpha").unwrap().config.port, 9001);
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = ServerRegistry::new();
        assert_eq!(
            registry.lookup("ghost").unwrap_err(),
            RegistryError::NotFound("ghost".to_string())
        );
        assert!(registry.status_of("ghost").is_none());
    }

    #[test]
    fn test_list_by_capability_keeps_registration_order() {
        let registry = ServerRegistry::new();
        registry
            .register("gamma", ServerConfig::new("localhost", 3, ["x"]))
            .unwrap();
        registry
            .register("alpha", ServerConfig::new("localhost", 1, ["y"]))
            .unwrap();
        registry
            .register("beta", ServerConfig::new("localhost", 2, ["x", "z"]))
            .unwrap();

        let names: Vec<_> = registry
            .list_by_capability(&caps(&["x"]))
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(names, vec!["gamma", "beta"]);

        let names: Vec<_> = registry
            .list_by_capability(&caps(&["y", "z"]))
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        assert!(registry.list_by_capability(&caps(&[])).is_empty());
    }

    #[test]
    fn test_replace_swaps_whole_snapshot() {
        let registry = ServerRegistry::new();
        registry
            .register("alpha", ServerConfig::new("localhost", 1, ["x"]))
            .unwrap();

        let before = registry.lookup("alpha").unwrap();
        registry
            .replace(before.with_health(ServerStatus::Healthy, 42))
            .unwrap();
        let after = registry.lookup("alpha").unwrap();

        // The old snapshot is untouched.
        assert_eq!(before.status, ServerStatus::Unhealthy);
        assert_eq!(after.status, ServerStatus::Healthy);
        assert_eq!(after.response_time_ms, Some(42));
    }

    #[test]
    fn test_from_configs() {
        let registry = ServerRegistry::from_configs(&crate::config::Config::default().servers)
            .unwrap();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.names()[0], "code-analysis");
    }
}
