use crate::error::{AppError, Result};
use crate::models::AccountType;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Service settings, layered from `config/default.toml`, optional
/// `config/local.toml`, and `APP__*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Absent: accounts and transactions live in process memory.
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub ledger: LedgerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Demo-funding amount every new account opens with.
    pub opening_balance: Decimal,
    pub default_account_type: String,
    pub account_number_attempts: u32,
    pub idempotency_ttl_seconds: u64,
    pub lock_timeout_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            opening_balance: Decimal::new(500_000, 2),
            default_account_type: "SAVINGS".to_string(),
            account_number_attempts: 16,
            idempotency_ttl_seconds: 86_400,
            lock_timeout_ms: 5_000,
        }
    }
}

impl LedgerSettings {
    pub fn default_account_type(&self) -> Result<AccountType> {
        AccountType::from_str(&self.default_account_type)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_seconds)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Rejects settings the ledger cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.opening_balance < Decimal::ZERO {
            return Err(AppError::InvalidAmount(format!(
                "ledger.opening_balance must not be negative, got {}",
                self.opening_balance
            )));
        }
        if self.account_number_attempts == 0 {
            return Err(AppError::Validation(
                "ledger.account_number_attempts must be at least 1".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(AppError::Validation(
                "ledger.lock_timeout_ms must be at least 1".to_string(),
            ));
        }
        self.default_account_type()?;
        Ok(())
    }
}

fn default_pool_size() -> u32 {
    10
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Settings {
    pub fn new() -> std::result::Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
