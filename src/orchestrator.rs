//! Orchestrator facade.
//!
//! Owns the registry, health monitor, rule table, dispatcher and
//! synthesizer, and drives each task through
//! `created -> dispatching -> [synthesizing] -> completed | failed`.
//! Runtime failures never escape as errors: they are reported on the
//! returned [`OrchestrationResult`]. Only a malformed task is rejected.

use crate::config::Config;
use crate::dispatch::{DispatchOutcome, HttpProviderClient, ProviderClient, TaskDispatcher};
use crate::error::{OrchestratorError, TaskValidationError};
use crate::health::{HealthMonitor, HealthSummary};
use crate::models::{
    BusinessTask, OrchestrationResult, OrchestrationRule, OrchestrationStatus, ServerStatus,
    TaskState,
};
use crate::registry::ServerRegistry;
use crate::routing::{FailoverRouter, RuleMatcher};
use crate::synthesis::ResultSynthesizer;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// In-flight tasks, bounded history and counters.
struct TaskBook {
    active: HashMap<String, TaskState>,
    history: VecDeque<OrchestrationResult>,
    capacity: usize,
    completed: u64,
    failed: u64,
}

impl TaskBook {
    fn record(&mut self, result: OrchestrationResult) {
        if result.success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.history.push_back(result);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }
}

/// Removes a task from the active map when dropped, including when the
/// executing future is cancelled.
struct ActiveTask<'a> {
    book: &'a Mutex<TaskBook>,
    task_id: String,
}

impl ActiveTask<'_> {
    fn set_state(&self, state: TaskState) {
        debug!("Task {} -> {}", self.task_id, state);
        if let Some(entry) = self.book.lock().active.get_mut(&self.task_id) {
            *entry = state;
        }
    }
}

impl Drop for ActiveTask<'_> {
    fn drop(&mut self) {
        self.book.lock().active.remove(&self.task_id);
    }
}

/// The orchestration engine.
pub struct Orchestrator {
    registry: Arc<ServerRegistry>,
    health: Arc<HealthMonitor>,
    rules: RuleMatcher,
    dispatcher: TaskDispatcher,
    synthesizer: ResultSynthesizer,
    check_interval: Duration,
    book: Mutex<TaskBook>,
}

impl Orchestrator {
    /// Build an orchestrator that talks to providers over HTTP.
    pub fn from_config(config: &Config) -> Result<Self, OrchestratorError> {
        let client = HttpProviderClient::new()?;
        Self::with_client(config, Arc::new(client))
    }

    /// Build an orchestrator on top of any provider transport.
    pub fn with_client(
        config: &Config,
        client: Arc<dyn ProviderClient>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let registry = Arc::new(ServerRegistry::from_configs(&config.servers)?);
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&client),
            config.health.timeout(),
            config.health.cache_ttl(),
        ));
        let failover = FailoverRouter::new(Arc::clone(&registry), config.failover.clone());
        let dispatcher = TaskDispatcher::new(
            Arc::clone(&registry),
            failover,
            client,
            config.dispatch.call_timeout(),
        );

        info!(
            "Orchestrator ready: {} servers, {} rules",
            registry.len(),
            config.rules.len()
        );

        Ok(Self {
            registry,
            health,
            rules: RuleMatcher::new(config.rules.clone(), &config.general.default_provider),
            dispatcher,
            synthesizer: ResultSynthesizer::new(),
            check_interval: config.health.check_interval(),
            book: Mutex::new(TaskBook {
                active: HashMap::new(),
                history: VecDeque::new(),
                capacity: config.general.history_capacity,
                completed: 0,
                failed: 0,
            }),
        })
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Probe every provider so routing starts from real statuses.
    ///
    /// A sweep younger than the health cache TTL is reused.
    pub async fn initialize(&self) -> HealthSummary {
        self.health.check_all_cached().await;
        self.health.summary()
    }

    /// Keep provider health current in the background.
    pub fn start_health_monitoring(&self) -> JoinHandle<()> {
        info!(
            "Starting health monitoring every {}s",
            self.check_interval.as_secs()
        );
        self.health.spawn_periodic(self.check_interval)
    }

    /// Run one task to completion.
    ///
    /// Returns `Err` only when the task is malformed or a task with the same
    /// id is already running. Everything else, including "no healthy
    /// servers", comes back as a result with `success = false`.
    pub async fn execute_business_task(
        &self,
        mut task: BusinessTask,
    ) -> Result<OrchestrationResult, TaskValidationError> {
        task.validate()?;
        let started = Instant::now();
        let active = self.admit(&task.task_id)?;

        info!(
            "Executing task {} ({}, priority {})",
            task.task_id, task.task_type, task.priority
        );

        let rule = self.rules.match_task(&task);

        active.set_state(TaskState::Dispatching);
        let outcome = self.dispatcher.run(&mut task, rule).await;

        let synthesis = if task.requires_synthesis && !outcome.servers_used.is_empty() {
            active.set_state(TaskState::Synthesizing);
            Some(
                self.synthesizer
                    .synthesize(&outcome.per_server_results, &rule.synthesis_type),
            )
        } else {
            None
        };

        let final_state = if outcome.success {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        active.set_state(final_state);

        let metadata = result_metadata(&task, rule, &outcome, final_state);
        let result = OrchestrationResult {
            task_id: task.task_id.clone(),
            success: outcome.success,
            execution_time_ms: started.elapsed().as_millis() as u64,
            servers_used: outcome.servers_used,
            synthesis_applied: synthesis.is_some(),
            synthesis,
            error_message: outcome.error.map(|e| e.to_string()),
            per_server_results: outcome.per_server_results,
            metadata,
            completed_at: Utc::now(),
        };

        if result.success {
            info!(
                "Task {} completed in {}ms using {}",
                result.task_id,
                result.execution_time_ms,
                result.servers_used.join(", ")
            );
        } else {
            warn!(
                "Task {} failed: {}",
                result.task_id,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }

        self.book.lock().record(result.clone());
        Ok(result)
    }

    fn admit(&self, task_id: &str) -> Result<ActiveTask<'_>, TaskValidationError> {
        let mut book = self.book.lock();
        if book.active.contains_key(task_id) {
            return Err(TaskValidationError::AlreadyActive(task_id.to_string()));
        }
        book.active.insert(task_id.to_string(), TaskState::Created);
        Ok(ActiveTask {
            book: &self.book,
            task_id: task_id.to_string(),
        })
    }

    /// Counts and per-provider statuses. Reads only; never probes.
    pub fn get_orchestration_status(&self) -> OrchestrationStatus {
        let endpoints = self.registry.all();
        let book = self.book.lock();

        OrchestrationStatus {
            total_servers: endpoints.len(),
            healthy_servers: endpoints
                .iter()
                .filter(|e| e.status == ServerStatus::Healthy)
                .count(),
            active_tasks: book.active.len(),
            completed_tasks: book.completed,
            failed_tasks: book.failed,
            rule_count: self.rules.rule_count(),
            per_server_status: endpoints
                .iter()
                .map(|e| (e.name.clone(), e.status))
                .collect(),
        }
    }

    /// State of a running task, or the final state of one still in history.
    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        let book = self.book.lock();
        if let Some(state) = book.active.get(task_id) {
            return Some(*state);
        }
        book.history
            .iter()
            .rev()
            .find(|r| r.task_id == task_id)
            .map(|r| {
                if r.success {
                    TaskState::Completed
                } else {
                    TaskState::Failed
                }
            })
    }

    /// Up to `n` most recent results, newest first.
    pub fn recent_results(&self, n: usize) -> Vec<OrchestrationResult> {
        self.book
            .lock()
            .history
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect()
    }

    pub fn result_for(&self, task_id: &str) -> Option<OrchestrationResult> {
        self.book
            .lock()
            .history
            .iter()
            .rev()
            .find(|r| r.task_id == task_id)
            .cloned()
    }
}

fn result_metadata(
    task: &BusinessTask,
    rule: &OrchestrationRule,
    outcome: &DispatchOutcome,
    final_state: TaskState,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("rule_id".to_string(), json!(rule.rule_id));
    metadata.insert("synthesis_type".to_string(), json!(rule.synthesis_type));
    metadata.insert("execution_mode".to_string(), json!(rule.execution_mode()));
    metadata.insert("task_type".to_string(), json!(task.task_type));
    metadata.insert("priority".to_string(), json!(task.priority.to_string()));
    metadata.insert("final_state".to_string(), json!(final_state.to_string()));
    if !outcome.failovers.is_empty() {
        metadata.insert("failovers".to_string(), json!(outcome.failovers));
    }
    if !outcome.skipped.is_empty() {
        metadata.insert("skipped".to_string(), json!(outcome.skipped));
    }
    metadata
}
