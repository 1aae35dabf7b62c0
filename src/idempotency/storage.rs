use crate::error::ErrorKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Status of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

/// Final outcome kept for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredOutcome<T> {
    Completed(T),
    Failed { kind: ErrorKind, message: String },
}

/// Stored idempotency record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord<T> {
    pub idempotency_key: String,
    pub operation_type: String,
    pub status: IdempotencyStatus,
    pub request_hash: String,
    pub outcome: Option<StoredOutcome<T>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl<T> IdempotencyRecord<T> {
    pub fn new(
        idempotency_key: String,
        operation_type: String,
        request_hash: String,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            idempotency_key,
            operation_type,
            status: IdempotencyStatus::Processing,
            request_hash,
            outcome: None,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            completed_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_completed(&self) -> bool {
        self.status == IdempotencyStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == IdempotencyStatus::Failed
    }

    fn finish(&mut self, status: IdempotencyStatus, outcome: StoredOutcome<T>) {
        self.status = status;
        self.outcome = Some(outcome);
        self.completed_at = Some(Utc::now());
    }
}

/// Process-local idempotency storage with per-record expiry.
pub struct InMemoryIdempotencyStore<T> {
    records: Mutex<HashMap<String, IdempotencyRecord<T>>>,
}

impl<T> Default for InMemoryIdempotencyStore<T> {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> InMemoryIdempotencyStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the key for `record`.
    /// Returns `None` if the key was free (or held only by an expired record),
    /// otherwise the live record that holds it.
    pub async fn try_acquire(&self, record: IdempotencyRecord<T>) -> Option<IdempotencyRecord<T>> {
        let mut records = self.records.lock().await;
        if let Some(existing) = records.get(&record.idempotency_key) {
            if !existing.is_expired() {
                return Some(existing.clone());
            }
        }
        records.insert(record.idempotency_key.clone(), record);
        None
    }

    pub async fn find_by_key(&self, key: &str) -> Option<IdempotencyRecord<T>> {
        self.records
            .lock()
            .await
            .get(key)
            .filter(|record| !record.is_expired())
            .cloned()
    }

    /// Returns false if no record holds the key.
    pub async fn mark_completed(&self, key: &str, response: T) -> bool {
        match self.records.lock().await.get_mut(key) {
            Some(record) => {
                record.finish(IdempotencyStatus::Completed, StoredOutcome::Completed(response));
                true
            }
            None => false,
        }
    }

    /// Returns false if no record holds the key.
    pub async fn mark_failed(&self, key: &str, kind: ErrorKind, message: String) -> bool {
        match self.records.lock().await.get_mut(key) {
            Some(record) => {
                record.finish(IdempotencyStatus::Failed, StoredOutcome::Failed { kind, message });
                true
            }
            None => false,
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.records.lock().await.remove(key).is_some()
    }

    /// Deletes expired records and returns how many were removed.
    pub async fn cleanup_expired(&self) -> u64 {
        let now = Utc::now();
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        (before - records.len()) as u64
    }

    pub async fn count_by_status(&self, status: IdempotencyStatus) -> usize {
        self.records
            .lock()
            .await
            .values()
            .filter(|record| record.status == status)
            .count()
    }
}
