//! Single-hop failover.

use crate::models::ServerStatus;
use crate::registry::ServerRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a call for a provider should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The provider itself is Healthy or Degraded.
    Primary(String),
    /// The provider is unroutable; its configured alternate is Healthy.
    Fallback { primary: String, fallback: String },
    /// Neither the provider nor its alternate can take the call.
    NoRoute,
}

impl Route {
    /// Provider that should receive the call.
    pub fn target(&self) -> Option<&str> {
        match self {
            Route::Primary(name) => Some(name.as_str()),
            Route::Fallback { fallback, .. } => Some(fallback.as_str()),
            Route::NoRoute => None,
        }
    }
}

/// Resolves unroutable providers to a static 1:1 alternate.
///
/// Resolution is at most one hop: the alternate's own fallback is never
/// consulted.
pub struct FailoverRouter {
    registry: Arc<ServerRegistry>,
    fallbacks: BTreeMap<String, String>,
}

impl FailoverRouter {
    pub fn new(registry: Arc<ServerRegistry>, fallbacks: BTreeMap<String, String>) -> Self {
        Self {
            registry,
            fallbacks,
        }
    }

    pub fn resolve(&self, name: &str) -> Route {
        // Unregistered providers are treated as unroutable.
        if self
            .registry
            .status_of(name)
            .is_some_and(|s| s.is_routable())
        {
            return Route::Primary(name.to_string());
        }

        let Some(fallback) = self.fallbacks.get(name) else {
            debug!("Server {} unavailable and has no fallback", name);
            return Route::NoRoute;
        };

        if self.registry.status_of(fallback) == Some(ServerStatus::Healthy) {
            info!("Failing over {} -> {}", name, fallback);
            Route::Fallback {
                primary: name.to_string(),
                fallback: fallback.clone(),
            }
        } else {
            debug!(
                "Server {} unavailable and fallback {} is not healthy",
                name, fallback
            );
            Route::NoRoute
        }
    }
}
