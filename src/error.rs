//! Error types.
//!
//! Only registration, configuration and malformed-task errors surface as
//! `Err`. Provider failures are captured as [`ProviderCallError`] values and
//! end up as data on the orchestration result.

use thiserror::Error;

/// Errors raised by the server registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Name already registered with a different configuration
    #[error("server '{0}' is already registered with a different configuration")]
    Duplicate(String),

    /// Unknown server name
    #[error("server not found: {0}")]
    NotFound(String),
}

/// A task that cannot be dispatched at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    #[error("task is missing a task_id")]
    MissingTaskId,

    #[error("task is missing a task_type")]
    MissingTaskType,

    #[error("max_execution_time_seconds must be at least 1")]
    InvalidDeadline,

    #[error("task '{0}' is already being executed")]
    AlreadyActive(String),
}

/// Failure of a single provider call or health probe.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderCallError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("cannot connect: {0}")]
    Connection(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("task deadline exceeded before the call completed")]
    DeadlineExceeded,
}

/// Task-level dispatch failures, reported through `error_message`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no healthy servers available for rule '{rule_id}'")]
    NoHealthyServers { rule_id: String },

    #[error("critical task aborted: provider '{server}' failed: {reason}")]
    CriticalProviderFailed { server: String, reason: String },

    #[error("deadline exceeded: {completed} of {total} provider calls completed")]
    DeadlineExceeded { completed: usize, total: usize },

    #[error("all {attempted} provider calls failed")]
    AllProvidersFailed { attempted: usize },
}

/// Invalid configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("server at index {0} has an empty name")]
    EmptyServerName(usize),

    #[error("server '{0}' is defined more than once")]
    DuplicateServer(String),

    #[error("rule at index {0} has an empty rule_id")]
    EmptyRuleId(usize),

    #[error("rule '{0}' has an empty server_sequence")]
    EmptySequence(String),

    #[error("server '{0}' fails over to itself")]
    SelfFailover(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Errors building an orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
