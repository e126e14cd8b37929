//! Provider transport.
//!
//! Implements the provider HTTP contract:
//! - `GET {base_url}/health` answers `{"status": "healthy" | ...}`
//! - `POST {base_url}{tool_endpoint}` takes the task context as a JSON body
//!   and answers 2xx with a JSON result
//!
//! Every failure is returned as a [`ProviderCallError`]; nothing panics or
//! escapes this boundary.

use crate::error::{OrchestratorError, ProviderCallError};
use crate::models::ServerEndpoint;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Raw answer of a `/health` probe.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthProbe {
    /// HTTP status code.
    pub http_status: u16,
    /// Parsed body, if it was JSON.
    pub body: Option<Value>,
}

/// Transport used by the health monitor and the dispatcher.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Probe the provider's health endpoint.
    ///
    /// Non-2xx answers are returned as `Ok`; only transport-level failures
    /// (timeout, refused connection) are errors.
    async fn probe_health(
        &self,
        endpoint: &ServerEndpoint,
        timeout: Duration,
    ) -> Result<HealthProbe, ProviderCallError>;

    /// Call the provider's tool endpoint with the task context.
    async fn call_tool(
        &self,
        endpoint: &ServerEndpoint,
        context: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, ProviderCallError>;
}

/// [`ProviderClient`] speaking HTTP through reqwest.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    http_client: reqwest::Client,
}

impl HttpProviderClient {
    /// Create a client. Timeouts are applied per request.
    pub fn new() -> Result<Self, OrchestratorError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("biorch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http_client })
    }

    fn map_send_error(e: reqwest::Error, url: &str, timeout: Duration) -> ProviderCallError {
        if e.is_timeout() {
            ProviderCallError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }
        } else if e.is_connect() {
            ProviderCallError::Connection(format!("{}: {}", url, e))
        } else {
            ProviderCallError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn probe_health(
        &self,
        endpoint: &ServerEndpoint,
        timeout: Duration,
    ) -> Result<HealthProbe, ProviderCallError> {
        let url = endpoint.health_url();

        let response = self
            .http_client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, &url, timeout))?;

        let http_status = response.status().as_u16();
        let body = response.json::<Value>().await.ok();

        debug!("Health probe {} -> HTTP {}", url, http_status);
        Ok(HealthProbe { http_status, body })
    }

    async fn call_tool(
        &self,
        endpoint: &ServerEndpoint,
        context: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, ProviderCallError> {
        let url = endpoint.tool_url();

        let response = self
            .http_client
            .post(&url)
            .timeout(timeout)
            .json(context)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, &url, timeout))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderCallError::Status { status, body });
        }

        let text = response
            .text()
            .await
            .map_err(|e| Self::map_send_error(e, &url, timeout))?;

        serde_json::from_str(&text).map_err(|e| ProviderCallError::MalformedBody(e.to_string()))
    }
}
