use crate::repositories::{AccountStore, TransactionLog};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEGRADED_LATENCY_MS: f64 = 100.0;

/// Health status of a service or dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }
}

/// Health status of a single dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

/// Aggregated health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl AggregatedHealth {
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = Self::aggregate_status(&dependencies);
        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
        }
    }

    fn aggregate_status(dependencies: &[DependencyHealth]) -> HealthStatus {
        let has_unhealthy = dependencies.iter().any(|d| d.status.is_unhealthy());
        let has_degraded = dependencies.iter().any(|d| d.status.is_degraded());

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Probes the account store and transaction log backing the ledger.
pub struct HealthChecker {
    backend: &'static str,
    accounts: Arc<dyn AccountStore>,
    transactions: Arc<dyn TransactionLog>,
    start_time: Instant,
}

impl HealthChecker {
    /// `backend` names the storage in reports, e.g. `postgres` or `memory`.
    pub fn new(
        backend: &'static str,
        accounts: Arc<dyn AccountStore>,
        transactions: Arc<dyn TransactionLog>,
    ) -> Self {
        Self {
            backend,
            accounts,
            transactions,
            start_time: Instant::now(),
        }
    }

    pub async fn check_all(&self) -> AggregatedHealth {
        let dependencies = vec![self.check_account_store().await, self.check_transaction_log().await];

        AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.uptime_seconds(),
            dependencies,
        )
    }

    pub async fn check_account_store(&self) -> DependencyHealth {
        let name = format!("{}:accounts", self.backend);
        let start = Instant::now();
        match tokio::time::timeout(PROBE_TIMEOUT, self.accounts.ping()).await {
            Ok(Ok(())) => Self::classify(name, start),
            Ok(Err(e)) => DependencyHealth::unhealthy(name, format!("Ping failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy(name, "Ping timeout"),
        }
    }

    pub async fn check_transaction_log(&self) -> DependencyHealth {
        let name = format!("{}:transactions", self.backend);
        let start = Instant::now();
        match tokio::time::timeout(PROBE_TIMEOUT, self.transactions.ping()).await {
            Ok(Ok(())) => Self::classify(name, start),
            Ok(Err(e)) => DependencyHealth::unhealthy(name, format!("Ping failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy(name, "Ping timeout"),
        }
    }

    fn classify(name: String, start: Instant) -> DependencyHealth {
        let latency = start.elapsed().as_secs_f64() * 1000.0;
        if latency > DEGRADED_LATENCY_MS {
            DependencyHealth {
                name,
                status: HealthStatus::Degraded,
                latency_ms: Some(latency),
                message: Some("High latency detected".to_string()),
            }
        } else {
            DependencyHealth::healthy(name, latency)
        }
    }

    /// Liveness check - returns true if the service is alive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Readiness: storage answers, even if slowly.
    pub async fn is_ready(&self) -> bool {
        !self.check_all().await.status.is_unhealthy()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
