//! Task dispatch.
//!
//! Selects the providers a rule names (after failover, capability and
//! health filtering) and calls them either concurrently or as an ordered
//! pipeline, all under the task's overall deadline. Individual call
//! failures are recorded in that provider's slot and never abort siblings;
//! only a Critical task in sequential mode stops at the first failure.

pub mod client;

pub use client::{HealthProbe, HttpProviderClient, ProviderClient};

use crate::error::{DispatchError, ProviderCallError};
use crate::models::{BusinessTask, OrchestrationRule, ProviderOutcome, ServerEndpoint, TaskPriority};
use crate::registry::ServerRegistry;
use crate::routing::{FailoverRouter, Route};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Longest deadline a task can ask for; larger budgets are capped to it.
const MAX_TASK_BUDGET: Duration = Duration::from_secs(86400 * 365 * 30);

/// A provider chosen for a task.
#[derive(Debug, Clone)]
pub struct SelectedProvider {
    pub endpoint: Arc<ServerEndpoint>,
    /// Primary this provider replaces, when failover applied.
    pub substituted_for: Option<String>,
}

impl SelectedProvider {
    pub fn name(&self) -> &str {
        &self.endpoint.name
    }
}

/// Providers chosen for a task, plus what was left out.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub providers: Vec<SelectedProvider>,
    /// Primary -> fallback substitutions.
    pub failovers: BTreeMap<String, String>,
    /// Sequence entries that could not be routed or did not match.
    pub skipped: Vec<String>,
}

/// What happened while dispatching one task.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub per_server_results: BTreeMap<String, ProviderOutcome>,
    /// Providers actually called, in rule order.
    pub servers_used: Vec<String>,
    pub failovers: BTreeMap<String, String>,
    pub skipped: Vec<String>,
    /// At least one call succeeded, and no deadline or critical abort occurred.
    pub success: bool,
    pub error: Option<DispatchError>,
}

impl DispatchOutcome {
    fn empty(selection: Selection, error: DispatchError) -> Self {
        Self {
            failovers: selection.failovers,
            skipped: selection.skipped,
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Executes a task's provider calls.
pub struct TaskDispatcher {
    registry: Arc<ServerRegistry>,
    failover: FailoverRouter,
    client: Arc<dyn ProviderClient>,
    call_timeout: Duration,
}

impl TaskDispatcher {
    pub fn new(
        registry: Arc<ServerRegistry>,
        failover: FailoverRouter,
        client: Arc<dyn ProviderClient>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            failover,
            client,
            call_timeout,
        }
    }

    /// Providers the rule names that can take this task right now.
    ///
    /// Each sequence entry goes through failover first, then must be
    /// Healthy or Degraded and serve one of the task's capabilities. A
    /// provider reached twice through failover is selected once.
    pub fn select(&self, task: &BusinessTask, rule: &OrchestrationRule) -> Selection {
        let mut selection = Selection::default();

        for name in &rule.server_sequence {
            let route = self.failover.resolve(name);
            let Some(target) = route.target() else {
                debug!("Skipping {}: no route", name);
                selection.skipped.push(name.clone());
                continue;
            };

            if selection.providers.iter().any(|p| p.name() == target) {
                debug!("Skipping {}: {} already selected", name, target);
                continue;
            }

            let endpoint = match self.registry.lookup(target) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                    selection.skipped.push(name.clone());
                    continue;
                }
            };

            if !endpoint.status.is_routable() {
                debug!("Skipping {}: status changed to {}", target, endpoint.status);
                selection.skipped.push(name.clone());
                continue;
            }

            if !endpoint.serves_any(&task.required_capabilities) {
                debug!("Skipping {}: no matching capability", target);
                selection.skipped.push(name.clone());
                continue;
            }

            let substituted_for = match route {
                Route::Fallback { primary, fallback } => {
                    selection.failovers.insert(primary.clone(), fallback);
                    Some(primary)
                }
                _ => None,
            };

            selection.providers.push(SelectedProvider {
                endpoint,
                substituted_for,
            });
        }

        selection
    }

    /// Dispatch `task` according to `rule`.
    ///
    /// In sequential mode the task's `context_data` gains a
    /// `{provider}_result` entry after each step; existing keys are kept.
    pub async fn run(&self, task: &mut BusinessTask, rule: &OrchestrationRule) -> DispatchOutcome {
        let deadline = deadline_after(task.max_execution_time_seconds);
        let selection = self.select(task, rule);

        if selection.providers.is_empty() {
            warn!(
                "Task {}: no healthy servers for rule {}",
                task.task_id, rule.rule_id
            );
            return DispatchOutcome::empty(
                selection,
                DispatchError::NoHealthyServers {
                    rule_id: rule.rule_id.clone(),
                },
            );
        }

        info!(
            "Task {}: dispatching to {} provider(s) ({})",
            task.task_id,
            selection.providers.len(),
            rule.execution_mode()
        );

        if rule.parallel_execution {
            self.run_parallel(task, selection, deadline).await
        } else {
            self.run_sequential(task, selection, deadline).await
        }
    }

    async fn run_parallel(
        &self,
        task: &BusinessTask,
        selection: Selection,
        deadline: Instant,
    ) -> DispatchOutcome {
        let mut calls = JoinSet::new();
        for provider in &selection.providers {
            let client = Arc::clone(&self.client);
            let endpoint = Arc::clone(&provider.endpoint);
            let context = task.context_data.clone();
            let timeout = self.call_timeout;
            calls.spawn(async move {
                let outcome = call_provider(client.as_ref(), &endpoint, &context, timeout).await;
                (endpoint.name.clone(), outcome)
            });
        }

        let mut results = BTreeMap::new();
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, calls.join_next()).await {
                Ok(Some(Ok((name, outcome)))) => {
                    results.insert(name, outcome);
                }
                Ok(Some(Err(e))) => warn!("Task {}: provider call aborted: {}", task.task_id, e),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Task {}: deadline exceeded with {} call(s) in flight",
                        task.task_id,
                        calls.len()
                    );
                    deadline_hit = true;
                    calls.abort_all();
                    break;
                }
            }
        }
        let completed = results.len();

        // Fill the slots of calls that never reported back.
        for provider in &selection.providers {
            results.entry(provider.name().to_string()).or_insert_with(|| {
                let reason = if deadline_hit {
                    ProviderCallError::DeadlineExceeded.to_string()
                } else {
                    "provider call did not complete".to_string()
                };
                ProviderOutcome::failed(reason, 0)
            });
        }

        let error = if deadline_hit {
            Some(DispatchError::DeadlineExceeded {
                completed,
                total: selection.providers.len(),
            })
        } else {
            None
        };

        finish(selection, results, error)
    }

    async fn run_sequential(
        &self,
        task: &mut BusinessTask,
        selection: Selection,
        deadline: Instant,
    ) -> DispatchOutcome {
        let mut results = BTreeMap::new();
        let mut error = None;

        for provider in &selection.providers {
            let name = provider.name().to_string();

            if Instant::now() >= deadline {
                warn!("Task {}: deadline exceeded before calling {}", task.task_id, name);
                error = Some(DispatchError::DeadlineExceeded {
                    completed: results.len(),
                    total: selection.providers.len(),
                });
                break;
            }

            let call = call_provider(
                self.client.as_ref(),
                &provider.endpoint,
                &task.context_data,
                self.call_timeout,
            );
            let outcome = match tokio::time::timeout_at(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("Task {}: deadline exceeded while calling {}", task.task_id, name);
                    error = Some(DispatchError::DeadlineExceeded {
                        completed: results.len(),
                        total: selection.providers.len(),
                    });
                    results.insert(
                        name,
                        ProviderOutcome::failed(ProviderCallError::DeadlineExceeded.to_string(), 0),
                    );
                    break;
                }
            };

            task.context_data
                .entry(format!("{}_result", name))
                .or_insert_with(|| outcome.pipeline_value());

            let failure = (!outcome.success).then(|| outcome.error.clone().unwrap_or_default());
            results.insert(name.clone(), outcome);

            if let Some(reason) = failure {
                if task.priority == TaskPriority::Critical {
                    warn!(
                        "Task {}: critical pipeline aborted after {} failed",
                        task.task_id, name
                    );
                    error = Some(DispatchError::CriticalProviderFailed {
                        server: name,
                        reason,
                    });
                    break;
                }
                debug!("Task {}: {} failed, continuing pipeline", task.task_id, name);
            }
        }

        finish(selection, results, error)
    }
}

fn deadline_after(seconds: u64) -> Instant {
    let budget = Duration::from_secs(seconds).min(MAX_TASK_BUDGET);
    if budget < Duration::from_secs(seconds) {
        debug!("Task budget of {}s capped to {}s", seconds, budget.as_secs());
    }
    Instant::now() + budget
}

/// Assemble the outcome; `servers_used` follows rule order.
fn finish(
    selection: Selection,
    mut results: BTreeMap<String, ProviderOutcome>,
    error: Option<DispatchError>,
) -> DispatchOutcome {
    let mut servers_used = Vec::new();
    for provider in &selection.providers {
        if let Some(outcome) = results.get_mut(provider.name()) {
            outcome.substituted_for = provider.substituted_for.clone();
            servers_used.push(provider.name().to_string());
        }
    }

    let any_success = results.values().any(|o| o.success);
    let error = error.or_else(|| {
        (!any_success).then(|| DispatchError::AllProvidersFailed {
            attempted: results.len(),
        })
    });
    let success = any_success
        && !matches!(
            error,
            Some(DispatchError::DeadlineExceeded { .. })
                | Some(DispatchError::CriticalProviderFailed { .. })
        );

    DispatchOutcome {
        per_server_results: results,
        servers_used,
        failovers: selection.failovers,
        skipped: selection.skipped,
        success,
        error,
    }
}

/// One provider call; failures become a failed slot.
async fn call_provider(
    client: &dyn ProviderClient,
    endpoint: &ServerEndpoint,
    context: &Map<String, Value>,
    timeout: Duration,
) -> ProviderOutcome {
    let started = Instant::now();
    let result = client.call_tool(endpoint, context, timeout).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(data) => {
            debug!("{} answered in {}ms", endpoint.name, elapsed_ms);
            ProviderOutcome::succeeded(data, elapsed_ms)
        }
        Err(e) => {
            warn!("{} failed after {}ms: {}", endpoint.name, elapsed_ms, e);
            ProviderOutcome::failed(e.to_string(), elapsed_ms)
        }
    }
}
