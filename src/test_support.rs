//! Scripted [`ProviderClient`] for unit tests.

use crate::dispatch::{HealthProbe, ProviderClient};
use crate::error::ProviderCallError;
use crate::models::{ServerConfig, ServerEndpoint};
use crate::registry::ServerRegistry;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// How a fake provider answers.
#[derive(Clone)]
pub struct FakeProvider {
    pub health: Result<HealthProbe, ProviderCallError>,
    pub health_delay: Duration,
    pub tool: Result<Value, ProviderCallError>,
    pub tool_delay: Duration,
}

impl FakeProvider {
    pub fn healthy() -> Self {
        Self {
            health: Ok(HealthProbe {
                http_status: 200,
                body: Some(json!({"status": "healthy"})),
            }),
            health_delay: Duration::ZERO,
            tool: Ok(json!({"ok": true})),
            tool_delay: Duration::ZERO,
        }
    }

    pub fn with_health(mut self, health: Result<HealthProbe, ProviderCallError>) -> Self {
        self.health = health;
        self
    }

    pub fn with_tool(mut self, tool: Result<Value, ProviderCallError>) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_tool_delay(mut self, delay: Duration) -> Self {
        self.tool_delay = delay;
        self
    }

    pub fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = delay;
        self
    }
}

/// One recorded tool call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub server: String,
    pub context: Map<String, Value>,
}

#[derive(Default)]
pub struct ScriptedClient {
    providers: Mutex<HashMap<String, FakeProvider>>,
    calls: Mutex<Vec<RecordedCall>>,
    probes: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, provider: FakeProvider) {
        self.providers.lock().insert(name.to_string(), provider);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn called_servers(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.server.clone()).collect()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.lock().len()
    }

    fn provider(&self, name: &str) -> Option<FakeProvider> {
        self.providers.lock().get(name).cloned()
    }
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    async fn probe_health(
        &self,
        endpoint: &ServerEndpoint,
        timeout: Duration,
    ) -> Result<HealthProbe, ProviderCallError> {
        self.probes.lock().push(endpoint.name.clone());
        let Some(provider) = self.provider(&endpoint.name) else {
            return Err(ProviderCallError::Connection(endpoint.name.clone()));
        };
        if provider.health_delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(ProviderCallError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(provider.health_delay).await;
        provider.health
    }

    async fn call_tool(
        &self,
        endpoint: &ServerEndpoint,
        context: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, ProviderCallError> {
        self.calls.lock().push(RecordedCall {
            server: endpoint.name.clone(),
            context: context.clone(),
        });
        let Some(provider) = self.provider(&endpoint.name) else {
            return Err(ProviderCallError::Connection(endpoint.name.clone()));
        };
        if provider.tool_delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(ProviderCallError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(provider.tool_delay).await;
        provider.tool
    }
}

/// Registry with the given `(name, capabilities)` providers, ports assigned in order.
pub fn registry_with(servers: &[(&str, &[&str])]) -> Arc<ServerRegistry> {
    let registry = ServerRegistry::new();
    for (i, (name, caps)) in servers.iter().enumerate() {
        registry
            .register(
                name,
                ServerConfig::new("localhost", 9000 + i as u16, caps.iter().copied()),
            )
            .unwrap();
    }
    Arc::new(registry)
}
