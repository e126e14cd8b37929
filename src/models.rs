//! Data models for the orchestrator.
//!
//! This module contains the core data structures shared by the registry,
//! the dispatcher and the facade: providers and their health, business
//! tasks, routing rules and orchestration results.

use crate::error::TaskValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Health status of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Probe answered 2xx with `{"status": "healthy"}`
    Healthy,
    /// Probe answered 2xx with any other body
    Degraded,
    /// Not yet probed, or reported unhealthy
    Unhealthy,
    /// Probe timed out, failed to connect, or answered non-2xx
    Offline,
}

impl ServerStatus {
    /// Whether a task may be dispatched to a provider in this state.
    pub fn is_routable(&self) -> bool {
        matches!(self, ServerStatus::Healthy | ServerStatus::Degraded)
    }

    /// Returns an emoji representation of the status.
    pub fn emoji(&self) -> &'static str {
        match self {
            ServerStatus::Healthy => "🟢",
            ServerStatus::Degraded => "🟡",
            ServerStatus::Unhealthy => "🟠",
            ServerStatus::Offline => "🔴",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Healthy => write!(f, "Healthy"),
            ServerStatus::Degraded => write!(f, "Degraded"),
            ServerStatus::Unhealthy => write!(f, "Unhealthy"),
            ServerStatus::Offline => write!(f, "Offline"),
        }
    }
}

/// Static description of a provider, as registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname of the provider.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port of the provider.
    pub port: u16,
    /// Full base URL; overrides `host`/`port` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Path of the tool endpoint, appended to the base URL.
    #[serde(default = "default_tool_endpoint")]
    pub tool_endpoint: String,
    /// Capability tags served by this provider.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_tool_endpoint() -> String {
    "/execute".to_string()
}

impl ServerConfig {
    /// Creates a config for `host:port` with the given capabilities.
    pub fn new<I, S>(host: &str, port: u16, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            host: host.to_string(),
            port,
            base_url: None,
            tool_endpoint: default_tool_endpoint(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }

    /// Overrides the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Overrides the tool endpoint path.
    pub fn with_tool_endpoint(mut self, path: impl Into<String>) -> Self {
        self.tool_endpoint = path.into();
        self
    }

    /// The effective base URL, without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

/// A registered provider together with its latest health snapshot.
///
/// Instances are never mutated in place. The health monitor builds a new
/// value and swaps it into the registry, so readers always see a whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Unique provider name.
    pub name: String,
    /// Registration-time configuration.
    pub config: ServerConfig,
    /// Status from the latest probe.
    pub status: ServerStatus,
    /// When the latest probe finished.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Latency of the latest probe.
    pub response_time_ms: Option<u64>,
}

impl ServerEndpoint {
    /// Creates a freshly registered, not yet probed endpoint.
    pub fn new(name: impl Into<String>, config: ServerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            status: ServerStatus::Unhealthy,
            last_health_check: None,
            response_time_ms: None,
        }
    }

    /// Whether this provider serves any of the given capabilities.
    pub fn serves_any(&self, capabilities: &BTreeSet<String>) -> bool {
        !self.config.capabilities.is_disjoint(capabilities)
    }

    /// URL of the health endpoint.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url())
    }

    /// URL of the tool endpoint.
    pub fn tool_url(&self) -> String {
        let path = &self.config.tool_endpoint;
        if path.starts_with('/') {
            format!("{}{}", self.config.base_url(), path)
        } else {
            format!("{}/{}", self.config.base_url(), path)
        }
    }

    /// Returns a copy carrying a new health snapshot.
    pub fn with_health(&self, status: ServerStatus, response_time_ms: u64) -> Self {
        Self {
            status,
            last_health_check: Some(Utc::now()),
            response_time_ms: Some(response_time_ms),
            ..self.clone()
        }
    }

    /// Read-only health view of this endpoint.
    pub fn health_record(&self) -> HealthRecord {
        HealthRecord {
            name: self.name.clone(),
            status: self.status,
            last_health_check: self.last_health_check,
            response_time_ms: self.response_time_ms,
        }
    }
}

/// Point-in-time health view derived from a [`ServerEndpoint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub name: String,
    pub status: ServerStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub response_time_ms: Option<u64>,
}

/// Priority of a business task.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    /// A failed step aborts a sequential pipeline
    Critical,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "Low"),
            TaskPriority::Medium => write!(f, "Medium"),
            TaskPriority::High => write!(f, "High"),
            TaskPriority::Critical => write!(f, "Critical"),
        }
    }
}

/// A unit of work submitted to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessTask {
    pub task_id: String,
    pub task_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Request payload; grows with `{provider}_result` keys in sequential mode.
    #[serde(default)]
    pub context_data: Map<String, Value>,
    #[serde(default = "default_max_execution_time")]
    pub max_execution_time_seconds: u64,
    #[serde(default = "default_true")]
    pub requires_synthesis: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_max_execution_time() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl BusinessTask {
    /// Starts building a task of the given type with a generated id.
    pub fn builder(task_type: impl Into<String>) -> BusinessTaskBuilder {
        BusinessTaskBuilder {
            task: BusinessTask {
                task_id: uuid::Uuid::new_v4().to_string(),
                task_type: task_type.into(),
                description: String::new(),
                required_capabilities: BTreeSet::new(),
                priority: TaskPriority::default(),
                context_data: Map::new(),
                max_execution_time_seconds: default_max_execution_time(),
                requires_synthesis: true,
                created_at: Utc::now(),
            },
        }
    }

    /// Checks the fields every dispatch relies on.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.task_id.trim().is_empty() {
            return Err(TaskValidationError::MissingTaskId);
        }
        if self.task_type.trim().is_empty() {
            return Err(TaskValidationError::MissingTaskType);
        }
        if self.max_execution_time_seconds == 0 {
            return Err(TaskValidationError::InvalidDeadline);
        }
        Ok(())
    }
}

/// Builder for [`BusinessTask`]; `build` validates.
#[derive(Debug, Clone)]
pub struct BusinessTaskBuilder {
    task: BusinessTask,
}

impl BusinessTaskBuilder {
    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task.task_id = task_id.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.task.description = description.into();
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.task.required_capabilities.insert(capability.into());
        self
    }

    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task
            .required_capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.task.context_data.insert(key.into(), value);
        self
    }

    pub fn max_execution_time_seconds(mut self, seconds: u64) -> Self {
        self.task.max_execution_time_seconds = seconds;
        self
    }

    pub fn requires_synthesis(mut self, requires: bool) -> Self {
        self.task.requires_synthesis = requires;
        self
    }

    /// Validates and returns the task.
    pub fn build(self) -> Result<BusinessTask, TaskValidationError> {
        self.task.validate()?;
        Ok(self.task)
    }
}

/// Maps task types to providers, execution mode and synthesis template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationRule {
    pub rule_id: String,
    #[serde(default)]
    pub task_types: BTreeSet<String>,
    pub server_sequence: Vec<String>,
    #[serde(default = "default_synthesis_type")]
    pub synthesis_type: String,
    #[serde(default = "default_true")]
    pub parallel_execution: bool,
    #[serde(default)]
    pub priority: TaskPriority,
}

fn default_synthesis_type() -> String {
    "general".to_string()
}

impl OrchestrationRule {
    /// Fallback rule used when no configured rule matches.
    pub fn fallback(default_provider: &str) -> Self {
        Self {
            rule_id: "default".to_string(),
            task_types: BTreeSet::new(),
            server_sequence: vec![default_provider.to_string()],
            synthesis_type: default_synthesis_type(),
            parallel_execution: true,
            priority: TaskPriority::Low,
        }
    }

    /// Human-readable execution mode.
    pub fn execution_mode(&self) -> &'static str {
        if self.parallel_execution {
            "parallel"
        } else {
            "sequential"
        }
    }
}

/// Outcome of one provider call, as stored in the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response_time_ms: u64,
    /// Primary provider this call stood in for, when failover applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substituted_for: Option<String>,
}

impl ProviderOutcome {
    pub fn succeeded(data: Value, response_time_ms: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            response_time_ms,
            substituted_for: None,
        }
    }

    pub fn failed(error: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            response_time_ms,
            substituted_for: None,
        }
    }

    /// JSON value handed to the next step of a sequential pipeline.
    pub fn pipeline_value(&self) -> Value {
        match (&self.data, &self.error) {
            (Some(data), _) if self.success => data.clone(),
            (_, error) => serde_json::json!({
                "success": false,
                "error": error.clone().unwrap_or_default(),
            }),
        }
    }
}

/// Structured report produced by the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    /// Strategy actually applied (after fallback to "general").
    pub synthesis_type: String,
    pub title: String,
    pub total_providers: usize,
    pub successful_providers: usize,
    pub failed_providers: Vec<String>,
    pub success_rate: f64,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    /// Successful providers' bodies, keyed by provider name.
    pub combined_data: BTreeMap<String, Value>,
}

/// Final result of one `execute_business_task` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub task_id: String,
    pub success: bool,
    pub per_server_results: BTreeMap<String, ProviderOutcome>,
    pub execution_time_ms: u64,
    pub servers_used: Vec<String>,
    pub synthesis_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<Synthesis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub metadata: Map<String, Value>,
    pub completed_at: DateTime<Utc>,
}

impl OrchestrationResult {
    /// Number of providers whose call succeeded.
    pub fn successful_calls(&self) -> usize {
        self.per_server_results
            .values()
            .filter(|o| o.success)
            .count()
    }
}

/// Lifecycle of a task inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Created,
    Dispatching,
    Synthesizing,
    Completed,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Created => "created",
            TaskState::Dispatching => "dispatching",
            TaskState::Synthesizing => "synthesizing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot returned by `get_orchestration_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationStatus {
    pub total_servers: usize,
    pub healthy_servers: usize,
    pub active_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub rule_count: usize,
    pub per_server_status: BTreeMap<String, ServerStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Critical);
    }

    #[test]
    fn test_routable_statuses() {
        assert!(ServerStatus::Healthy.is_routable());
        assert!(ServerStatus::Degraded.is_routable());
        assert!(!ServerStatus::Unhealthy.is_routable());
        assert!(!ServerStatus::Offline.is_routable());
    }

    #[test]
    fn test_endpoint_urls() {
        let endpoint = ServerEndpoint::new("alpha", ServerConfig::new("10.0.0.5", 8001, ["x"]));
        assert_eq!(endpoint.health_url(), "http://10.0.0.5:8001/health");
        assert_eq!(endpoint.tool_url(), "http://10.0.0.5:8001/execute");

        let endpoint = ServerEndpoint::new(
            "beta",
            ServerConfig::new("ignored", 1, ["x"])
                .with_base_url("https://beta.internal/api/")
                .with_tool_endpoint("tools/report"),
        );
        assert_eq!(endpoint.health_url(), "https://beta.internal/api/health");
        assert_eq!(endpoint.tool_url(), "https://beta.internal/api/tools/report");
    }

    #[test]
    fn test_new_endpoint_is_not_routable() {
        let endpoint = ServerEndpoint::new("alpha", ServerConfig::new("localhost", 1, ["x"]));
        assert_eq!(endpoint.status, ServerStatus::Unhealthy);
        assert!(endpoint.last_health_check.is_none());
    }

    #[test]
    fn test_with_health_keeps_identity() {
        let endpoint = ServerEndpoint::new("alpha", ServerConfig::new("localhost", 1, ["x"]));
        let updated = endpoint.with_health(ServerStatus::Healthy, 12);
        assert_eq!(updated.name, "alpha");
        assert_eq!(updated.config, endpoint.config);
        assert_eq!(updated.status, ServerStatus::Healthy);
        assert_eq!(updated.response_time_ms, Some(12));
        assert!(updated.last_health_check.is_some());
    }

    #[test]
    fn test_task_builder_validation() {
        let task = BusinessTask::builder("demo")
            .task_id("t-1")
            .capability("x")
            .priority(TaskPriority::High)
            .build()
            .unwrap();
        assert_eq!(task.task_id, "t-1");
        assert!(task.required_capabilities.contains("x"));

        let err = BusinessTask::builder("").build().unwrap_err();
        assert_eq!(err, TaskValidationError::MissingTaskType);

        let err = BusinessTask::builder("demo").task_id("  ").build().unwrap_err();
        assert_eq!(err, TaskValidationError::MissingTaskId);

        let err = BusinessTask::builder("demo")
            .max_execution_time_seconds(0)
            .build()
            .unwrap_err();
        assert_eq!(err, TaskValidationError::InvalidDeadline);
    }

    #[test]
    fn test_task_from_json_defaults() {
        let task: BusinessTask = serde_json::from_str(
            r#"{"task_id": "t-9", "task_type": "security_audit", "required_capabilities": ["security"]}"#,
        )
        .unwrap();
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.max_execution_time_seconds, 300);
        assert!(task.requires_synthesis);
        assert!(task.context_data.is_empty());
    }

    #[test]
    fn test_pipeline_value() {
        let ok = ProviderOutcome::succeeded(serde_json::json!({"score": 7}), 5);
        assert_eq!(ok.pipeline_value(), serde_json::json!({"score": 7}));

        let failed = ProviderOutcome::failed("boom", 5);
        assert_eq!(
            failed.pipeline_value(),
            serde_json::json!({"success": false, "error": "boom"})
        );
    }

    #[test]
    fn test_fallback_rule() {
        let rule = OrchestrationRule::fallback("general-provider");
        assert_eq!(rule.server_sequence, vec!["general-provider"]);
        assert_eq!(rule.synthesis_type, "general");
        assert!(rule.parallel_execution);
        assert_eq!(rule.priority, TaskPriority::Low);
    }
}
