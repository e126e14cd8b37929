//! Configuration file handling.
//!
//! This module handles loading, validating and merging configuration from
//! `.biorch.toml` files. The configuration supplies the provider catalogue,
//! the routing rule table and the failover map at startup.

use crate::error::ConfigError;
use crate::models::{OrchestrationRule, ServerConfig, TaskPriority};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".biorch.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Health monitoring settings.
    #[serde(default)]
    pub health: HealthConfig,

    /// Dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Provider catalogue, in registration order.
    #[serde(default)]
    pub servers: Vec<NamedServerConfig>,

    /// Routing rules; the first rule matching a task type wins.
    #[serde(default)]
    pub rules: Vec<OrchestrationRule>,

    /// Single-hop fallback per provider (`primary = "fallback"`).
    #[serde(default)]
    pub failover: BTreeMap<String, String>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Number of finished results kept in memory.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Provider used by the built-in rule when no rule matches.
    #[serde(default = "default_provider")]
    pub default_provider: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            default_provider: default_provider(),
        }
    }
}

fn default_history_capacity() -> usize {
    100
}

fn default_provider() -> String {
    "business-intelligence".to_string()
}

/// Health probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Timeout of a single `/health` probe.
    #[serde(default = "default_health_timeout")]
    pub timeout_seconds: u64,

    /// How long a full sweep stays fresh.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Interval of the background monitor.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_health_timeout(),
            cache_ttl_seconds: default_cache_ttl(),
            check_interval_seconds: default_check_interval(),
        }
    }
}

fn default_health_timeout() -> u64 {
    5
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_check_interval() -> u64 {
    30
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

/// Provider call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Timeout of a single tool call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Deadline given to tasks built by the CLI.
    #[serde(default = "default_max_execution")]
    pub default_max_execution_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout_seconds: default_call_timeout(),
            default_max_execution_seconds: default_max_execution(),
        }
    }
}

fn default_call_timeout() -> u64 {
    30
}

fn default_max_execution() -> u64 {
    300
}

impl DispatchConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }
}

/// A provider entry in the `[[servers]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedServerConfig {
    pub name: String,
    #[serde(flatten)]
    pub server: ServerConfig,
}

impl NamedServerConfig {
    fn new(name: &str, port: u16, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            server: ServerConfig::new("localhost", port, capabilities.iter().copied()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            health: HealthConfig::default(),
            dispatch: DispatchConfig::default(),
            servers: default_servers(),
            rules: default_rules(),
            failover: default_failover(),
        }
    }
}

fn default_servers() -> Vec<NamedServerConfig> {
    vec![
        NamedServerConfig::new("code-analysis", 8001, &["code_analysis", "quality"]),
        NamedServerConfig::new("security-scanner", 8002, &["security", "vulnerability_scan"]),
        NamedServerConfig::new("git-insights", 8003, &["git", "repository", "quality"]),
        NamedServerConfig::new("project-tracker", 8004, &["project_management", "repository"]),
        NamedServerConfig::new("business-intelligence", 8005, &["analytics", "business"]),
        NamedServerConfig::new("financial-analytics", 8006, &["finance", "business"]),
        NamedServerConfig::new("analytics-backup", 8007, &["analytics", "business", "finance"]),
    ]
}

fn rule(
    rule_id: &str,
    task_types: &[&str],
    sequence: &[&str],
    synthesis_type: &str,
    parallel_execution: bool,
    priority: TaskPriority,
) -> OrchestrationRule {
    OrchestrationRule {
        rule_id: rule_id.to_string(),
        task_types: task_types.iter().map(|t| t.to_string()).collect(),
        server_sequence: sequence.iter().map(|s| s.to_string()).collect(),
        synthesis_type: synthesis_type.to_string(),
        parallel_execution,
        priority,
    }
}

fn default_rules() -> Vec<OrchestrationRule> {
    vec![
        rule(
            "security_quality",
            &["security_audit", "code_review"],
            &["code-analysis", "security-scanner", "git-insights"],
            "security_quality_report",
            true,
            TaskPriority::High,
        ),
        rule(
            "project_health",
            &["project_health", "repository_health"],
            &["git-insights", "project-tracker", "code-analysis"],
            "project_health_dashboard",
            true,
            TaskPriority::Medium,
        ),
        rule(
            "executive_bi",
            &["executive_summary", "business_intelligence"],
            &["business-intelligence", "financial-analytics", "project-tracker"],
            "executive_business_intelligence",
            true,
            TaskPriority::High,
        ),
        rule(
            "analysis_pipeline",
            &["pipeline_analysis"],
            &["code-analysis", "security-scanner", "business-intelligence"],
            "general",
            false,
            TaskPriority::Medium,
        ),
    ]
}

fn default_failover() -> BTreeMap<String, String> {
    [
        ("business-intelligence", "analytics-backup"),
        ("financial-analytics", "analytics-backup"),
    ]
    .into_iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Check structural constraints the orchestrator depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.history_capacity == 0 {
            return Err(ConfigError::ZeroValue("general.history_capacity"));
        }
        if self.health.timeout_seconds == 0 {
            return Err(ConfigError::ZeroValue("health.timeout_seconds"));
        }
        if self.dispatch.call_timeout_seconds == 0 {
            return Err(ConfigError::ZeroValue("dispatch.call_timeout_seconds"));
        }
        if self.dispatch.default_max_execution_seconds == 0 {
            return Err(ConfigError::ZeroValue("dispatch.default_max_execution_seconds"));
        }

        let mut names = HashSet::new();
        for (i, server) in self.servers.iter().enumerate() {
            if server.name.trim().is_empty() {
                return Err(ConfigError::EmptyServerName(i));
            }
            if !names.insert(server.name.as_str()) {
                return Err(ConfigError::DuplicateServer(server.name.clone()));
            }
        }

        for (i, rule) in self.rules.iter().enumerate() {
            if rule.rule_id.trim().is_empty() {
                return Err(ConfigError::EmptyRuleId(i));
            }
            if rule.server_sequence.is_empty() {
                return Err(ConfigError::EmptySequence(rule.rule_id.clone()));
            }
            for server in &rule.server_sequence {
                if !names.contains(server.as_str()) {
                    warn!("Rule '{}' references unknown server '{}'", rule.rule_id, server);
                }
            }
        }

        for (primary, fallback) in &self.failover {
            if primary == fallback {
                return Err(ConfigError::SelfFailover(primary.clone()));
            }
        }

        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings and only
    /// override values that were explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(timeout) = args.call_timeout {
            self.dispatch.call_timeout_seconds = timeout;
        }
        if let Some(timeout) = args.health_timeout {
            self.health.timeout_seconds = timeout;
        }
        if let Some(ref provider) = args.default_provider {
            self.general.default_provider = provider.clone();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
