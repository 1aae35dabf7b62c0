pub mod handler;
pub mod key_generator;
pub mod storage;

pub use handler::{
    IdempotencyCheckResult, IdempotencyCleanupJob, IdempotencyHandler, IdempotencyHandlerConfig,
    IdempotencyMetrics, MetricsSnapshot,
};
pub use key_generator::{IdempotencyAttributes, IdempotencyKeyGenerator};
pub use storage::{IdempotencyRecord, IdempotencyStatus, InMemoryIdempotencyStore, StoredOutcome};
