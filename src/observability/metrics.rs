use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the ledger.
///
/// Recording is a no-op until a recorder is installed, so services and tests
/// can call these freely.
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_operation(&self, operation: &str, outcome: &str, duration_ms: f64) {
        counter!("ledger_operations_total", "type" => operation.to_string(), "outcome" => outcome.to_string()).increment(1);
        histogram!("ledger_operation_duration_ms", "type" => operation.to_string()).record(duration_ms);
    }

    pub fn record_rejection(&self, operation: &str, kind: &str) {
        counter!("ledger_operations_rejected_total", "type" => operation.to_string(), "kind" => kind.to_string()).increment(1);
    }

    pub fn record_idempotent_replay(&self, operation: &str) {
        counter!("ledger_idempotent_replays_total", "type" => operation.to_string()).increment(1);
    }

    pub fn record_rollback(&self, operation: &str) {
        counter!("ledger_rollbacks_total", "type" => operation.to_string()).increment(1);
    }

    pub fn record_account_created(&self, account_type: &str) {
        counter!("ledger_accounts_created_total", "account_type" => account_type.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder once and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    METRICS.get_or_init(Metrics::new);

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

fn describe_metrics() {
    describe_counter!("ledger_operations_total", Unit::Count, "Ledger operations that reached a terminal record, by outcome");
    describe_counter!("ledger_operations_rejected_total", Unit::Count, "Ledger operations rejected before any record was written");
    describe_histogram!("ledger_operation_duration_ms", Unit::Milliseconds, "Ledger operation latency in milliseconds");
    describe_counter!("ledger_idempotent_replays_total", Unit::Count, "Requests answered from the idempotency store");
    describe_counter!("ledger_rollbacks_total", Unit::Count, "Transfers whose debit was rolled back after a failed credit");
    describe_counter!("ledger_accounts_created_total", Unit::Count, "Accounts created");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
