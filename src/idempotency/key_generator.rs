use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix of stored idempotency keys.
pub const DEFAULT_KEY_PREFIX: &str = "idem";

/// Attributes of a mutating request that must match for a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyAttributes {
    pub operation_type: String,
    pub source_account: Option<Uuid>,
    pub destination_account: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
}

impl IdempotencyAttributes {
    pub fn new(operation_type: impl Into<String>) -> Self {
        Self {
            operation_type: operation_type.into(),
            source_account: None,
            destination_account: None,
            amount: None,
            description: None,
        }
    }

    pub fn with_source_account(mut self, account_id: Uuid) -> Self {
        self.source_account = Some(account_id);
        self
    }

    pub fn with_destination_account(mut self, account_id: Uuid) -> Self {
        self.destination_account = Some(account_id);
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Normalizes client keys and fingerprints requests with SHA-256.
#[derive(Debug, Clone)]
pub struct IdempotencyKeyGenerator {
    key_prefix: String,
}

impl Default for IdempotencyKeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl IdempotencyKeyGenerator {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
        }
    }

    /// Maps a client-provided key to a fixed-length storage key.
    pub fn from_client_key(&self, client_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(client_key.trim().as_bytes());
        format!("{}_{}", self.key_prefix, hex::encode(hasher.finalize()))
    }

    /// Hash of the request attributes, compared on every reuse of a key.
    ///
    /// Amounts are normalized so `100`, `100.0` and `100.00` fingerprint alike.
    pub fn fingerprint(&self, attributes: &IdempotencyAttributes) -> String {
        let mut hasher = Sha256::new();

        hasher.update(attributes.operation_type.as_bytes());

        if let Some(source) = attributes.source_account {
            hasher.update(b"|src:");
            hasher.update(source.to_string().as_bytes());
        }

        if let Some(destination) = attributes.destination_account {
            hasher.update(b"|dst:");
            hasher.update(destination.to_string().as_bytes());
        }

        if let Some(amount) = attributes.amount {
            hasher.update(b"|amt:");
            hasher.update(amount.normalize().to_string().as_bytes());
        }

        if let Some(ref description) = attributes.description {
            hasher.update(b"|desc:");
            hasher.update(description.as_bytes());
        }

        hex::encode(hasher.finalize())
    }
}
