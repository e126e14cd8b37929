//! Provider health monitoring.
//!
//! Probes each provider's `/health` endpoint, classifies the answer into a
//! [`ServerStatus`] and swaps a fresh snapshot into the registry. Probe
//! failures never propagate: they become an `Offline` status.

use crate::dispatch::{HealthProbe, ProviderClient};
use crate::error::{ProviderCallError, RegistryError};
use crate::models::{HealthRecord, ServerStatus};
use crate::registry::ServerRegistry;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Aggregate health of the whole provider fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTier {
    /// At least 90% of providers healthy
    Excellent,
    /// At least 70%
    Good,
    /// At least 50%
    Degraded,
    /// Below 50%, or no providers at all
    Critical,
}

impl HealthTier {
    /// Tier for a healthy percentage in `0.0..=100.0`.
    pub fn from_percentage(healthy_percentage: f64) -> Self {
        if healthy_percentage >= 90.0 {
            HealthTier::Excellent
        } else if healthy_percentage >= 70.0 {
            HealthTier::Good
        } else if healthy_percentage >= 50.0 {
            HealthTier::Degraded
        } else {
            HealthTier::Critical
        }
    }
}

impl fmt::Display for HealthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthTier::Excellent => write!(f, "excellent"),
            HealthTier::Good => write!(f, "good"),
            HealthTier::Degraded => write!(f, "degraded"),
            HealthTier::Critical => write!(f, "critical"),
        }
    }
}

/// Counts per status plus the derived tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub offline: usize,
    pub healthy_percentage: f64,
    pub tier: HealthTier,
}

impl HealthSummary {
    /// Summarize a set of health records.
    pub fn from_records(records: &[HealthRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            healthy: 0,
            degraded: 0,
            unhealthy: 0,
            offline: 0,
            healthy_percentage: 0.0,
            tier: HealthTier::Critical,
        };

        for record in records {
            match record.status {
                ServerStatus::Healthy => summary.healthy += 1,
                ServerStatus::Degraded => summary.degraded += 1,
                ServerStatus::Unhealthy => summary.unhealthy += 1,
                ServerStatus::Offline => summary.offline += 1,
            }
        }

        if summary.total > 0 {
            summary.healthy_percentage = summary.healthy as f64 / summary.total as f64 * 100.0;
            summary.tier = HealthTier::from_percentage(summary.healthy_percentage);
        }

        summary
    }
}

/// Map a probe outcome to a status.
///
/// 2xx with `status == "healthy"` is Healthy, any other 2xx is Degraded,
/// everything else (non-2xx, timeout, connection failure) is Offline.
pub fn classify_probe(probe: &Result<HealthProbe, ProviderCallError>) -> ServerStatus {
    match probe {
        Ok(probe) if (200..300).contains(&probe.http_status) => {
            let reported = probe
                .body
                .as_ref()
                .and_then(|b| b.get("status"))
                .and_then(|s| s.as_str());
            if reported == Some("healthy") {
                ServerStatus::Healthy
            } else {
                ServerStatus::Degraded
            }
        }
        _ => ServerStatus::Offline,
    }
}

/// Probes providers and keeps the registry's health snapshots current.
pub struct HealthMonitor {
    registry: Arc<ServerRegistry>,
    client: Arc<dyn ProviderClient>,
    probe_timeout: Duration,
    cache_ttl: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ServerRegistry>,
        client: Arc<dyn ProviderClient>,
        probe_timeout: Duration,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            probe_timeout,
            cache_ttl,
            last_sweep: Mutex::new(None),
        }
    }

    /// Probe one provider and record the outcome.
    ///
    /// Only an unknown name is an error; probe failures become `Offline`.
    pub async fn check_health(&self, name: &str) -> Result<HealthRecord, RegistryError> {
        let current = self.registry.lookup(name)?;

        let started = Instant::now();
        let probe = match tokio::time::timeout(
            self.probe_timeout,
            self.client.probe_health(&current, self.probe_timeout),
        )
        .await
        {
            Ok(probe) => probe,
            Err(_) => Err(ProviderCallError::Timeout {
                timeout_ms: self.probe_timeout.as_millis() as u64,
            }),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let status = classify_probe(&probe);
        if let Err(ref e) = probe {
            debug!("Health probe for {} failed: {}", name, e);
        }
        if status != current.status {
            info!("Server {} status {} -> {}", name, current.status, status);
        }

        let updated = current.with_health(status, elapsed_ms);
        let record = updated.health_record();
        self.registry.replace(updated)?;

        Ok(record)
    }

    /// Probe every provider concurrently.
    ///
    /// Each probe is isolated: a slow or failing provider neither aborts nor
    /// delays the others beyond the probe timeout.
    pub async fn check_all(&self) -> Vec<HealthRecord> {
        let names = self.registry.names();
        let checks = names.iter().map(|name| self.check_health(name));

        let records: Vec<HealthRecord> = join_all(checks)
            .await
            .into_iter()
            .filter_map(|r| match r {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Health check skipped: {}", e);
                    None
                }
            })
            .collect();

        *self.last_sweep.lock() = Some(Instant::now());

        let summary = HealthSummary::from_records(&records);
        info!(
            "Health sweep: {}/{} healthy ({})",
            summary.healthy, summary.total, summary.tier
        );

        records
    }

    /// Like [`check_all`](Self::check_all), but reuses the last sweep while it is within the TTL.
    pub async fn check_all_cached(&self) -> Vec<HealthRecord> {
        if self.is_fresh() {
            debug!("Health cache fresh, skipping probes");
            return self.records();
        }
        self.check_all().await
    }

    /// Whether the last full sweep is still within the TTL.
    pub fn is_fresh(&self) -> bool {
        let last_sweep = *self.last_sweep.lock();
        last_sweep.is_some_and(|at| at.elapsed() < self.cache_ttl)
    }

    /// Current health view of every provider, without probing.
    pub fn records(&self) -> Vec<HealthRecord> {
        self.registry
            .all()
            .iter()
            .map(|e| e.health_record())
            .collect()
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary::from_records(&self.records())
    }

    pub fn overall_health(&self) -> HealthTier {
        self.summary().tier
    }

    /// Run [`check_all`](Self::check_all) every `interval` until the handle is aborted.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.check_all().await;
            }
        })
    }
}
