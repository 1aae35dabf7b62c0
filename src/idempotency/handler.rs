use crate::error::{AppError, ErrorKind, Result};
use crate::idempotency::key_generator::{IdempotencyAttributes, IdempotencyKeyGenerator};
use crate::idempotency::storage::{
    IdempotencyRecord, IdempotencyStatus, InMemoryIdempotencyStore, StoredOutcome,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Metrics for idempotency handling.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_requests: AtomicU64,
    pub duplicate_requests: AtomicU64,
    pub new_requests: AtomicU64,
    pub completed_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub conflicts: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicate_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_new(&self) {
        self.new_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            duplicate_requests: self.duplicate_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
            completed_requests: self.completed_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub duplicate_requests: u64,
    pub new_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub conflicts: u64,
}

impl MetricsSnapshot {
    pub fn duplicate_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.duplicate_requests as f64 / self.total_requests as f64
        }
    }
}

/// Result of an idempotency check.
#[derive(Debug)]
pub enum IdempotencyCheckResult<T> {
    /// Key claimed; the caller must process and then `complete`, `fail` or `release`.
    New,
    /// The key already finished with this outcome.
    Duplicate(StoredOutcome<T>),
}

/// Configuration for the idempotency handler.
#[derive(Debug, Clone)]
pub struct IdempotencyHandlerConfig {
    pub ttl_seconds: i64,
    pub key_prefix: String,
}

impl Default for IdempotencyHandlerConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 86_400,
            key_prefix: "idem".to_string(),
        }
    }
}

impl IdempotencyHandlerConfig {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl_seconds: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            ..Self::default()
        }
    }
}

/// Deduplicates mutating requests by client token within a retention window.
pub struct IdempotencyHandler<T> {
    store: InMemoryIdempotencyStore<T>,
    key_generator: IdempotencyKeyGenerator,
    metrics: Arc<IdempotencyMetrics>,
    config: IdempotencyHandlerConfig,
}

impl<T: Clone> IdempotencyHandler<T> {
    pub fn new(config: IdempotencyHandlerConfig) -> Self {
        Self {
            store: InMemoryIdempotencyStore::new(),
            key_generator: IdempotencyKeyGenerator::new(config.key_prefix.clone()),
            metrics: Arc::new(IdempotencyMetrics::new()),
            config,
        }
    }

    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn normalize_client_key(&self, client_key: &str) -> String {
        self.key_generator.from_client_key(client_key)
    }

    pub fn hash_request(&self, attributes: &IdempotencyAttributes) -> String {
        self.key_generator.fingerprint(attributes)
    }

    /// Claims `idempotency_key` or reports the outcome it already holds.
    ///
    /// Fails with `IdempotencyConflict` if the key is still being processed
    /// or was used for a request with a different fingerprint.
    pub async fn check(
        &self,
        idempotency_key: &str,
        operation_type: &str,
        request_hash: &str,
    ) -> Result<IdempotencyCheckResult<T>> {
        self.metrics.record_request();

        let record = IdempotencyRecord::new(
            idempotency_key.to_string(),
            operation_type.to_string(),
            request_hash.to_string(),
            self.config.ttl_seconds,
        );

        let existing = match self.store.try_acquire(record).await {
            None => {
                self.metrics.record_new();
                return Ok(IdempotencyCheckResult::New);
            }
            Some(existing) => existing,
        };

        self.metrics.record_duplicate();

        if existing.request_hash != request_hash {
            self.metrics.record_conflict();
            return Err(AppError::IdempotencyConflict(
                "Idempotency key reused with different request parameters".to_string(),
            ));
        }

        match (existing.status, existing.outcome) {
            (IdempotencyStatus::Processing, _) => {
                self.metrics.record_conflict();
                Err(AppError::IdempotencyConflict(
                    "Request is currently being processed. Please retry later.".to_string(),
                ))
            }
            (_, Some(outcome)) => Ok(IdempotencyCheckResult::Duplicate(outcome)),
            (status, None) => Err(AppError::Internal(anyhow::anyhow!(
                "{:?} idempotency record has no stored outcome",
                status
            ))),
        }
    }

    pub async fn complete(&self, idempotency_key: &str, response: T) {
        if self.store.mark_completed(idempotency_key, response).await {
            self.metrics.record_completed();
        } else {
            tracing::warn!("Idempotency key vanished before completion was recorded");
        }
    }

    pub async fn fail(&self, idempotency_key: &str, kind: ErrorKind, message: String) {
        if self.store.mark_failed(idempotency_key, kind, message).await {
            self.metrics.record_failed();
        } else {
            tracing::warn!("Idempotency key vanished before failure was recorded");
        }
    }

    /// Frees a claimed key without recording an outcome.
    pub async fn release(&self, idempotency_key: &str) {
        self.store.delete(idempotency_key).await;
    }

    pub async fn cleanup_expired(&self) -> u64 {
        self.store.cleanup_expired().await
    }
}

/// Background cleanup job for expired idempotency records.
pub struct IdempotencyCleanupJob<T> {
    handler: Arc<IdempotencyHandler<T>>,
    interval: Duration,
}

impl<T: Clone + Send + Sync + 'static> IdempotencyCleanupJob<T> {
    pub fn new(handler: Arc<IdempotencyHandler<T>>, interval: Duration) -> Self {
        Self { handler, interval }
    }

    pub async fn run_once(&self) -> u64 {
        self.handler.cleanup_expired().await
    }

    /// Starts the cleanup job in a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);

            loop {
                interval.tick().await;

                let count = self.handler.cleanup_expired().await;
                if count > 0 {
                    tracing::info!(count, "Cleaned up expired idempotency records");
                }
            }
        })
    }
}
