//! Store configuration and construction.
//!
//! Configuration sources, applied in order (later sources override earlier):
//!
//! 1. Built-in defaults (every field carries a serde default)
//! 2. An optional configuration file (YAML, TOML or JSON, chosen by extension)
//! 3. Environment variables prefixed `AZQUEUE__` with `__` as the nesting
//!    separator, e.g. `AZQUEUE__LEDGER__KIND=sqlite`

use crate::error::{ConfigurationError, QueueError};
use crate::ledger::PersistentLedger;
use crate::ledgers::{InMemoryLedger, SqliteLedger};
use crate::store::QueueStore;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "AZQUEUE";

/// Upper bound for every configured duration (100 years)
pub const MAX_DURATION_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Ledger backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerConfig {
    InMemory,
    Sqlite { path: PathBuf },
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::InMemory
    }
}

/// Queue store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub ledger: LedgerConfig,
    /// Visibility timeout applied to leases when the caller does not pick one
    pub default_visibility_timeout_seconds: u64,
    /// TTL applied to puts when the caller does not pick one
    pub default_message_ttl_seconds: u64,
    pub max_message_ttl_seconds: u64,
    pub max_messages_per_lease: u32,
    pub max_message_size_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            default_visibility_timeout_seconds: 30,
            default_message_ttl_seconds: 7 * 24 * 60 * 60,
            max_message_ttl_seconds: 7 * 24 * 60 * 60,
            max_messages_per_lease: 32,
            max_message_size_bytes: 64 * 1024,
        }
    }
}

impl StoreConfig {
    /// Load configuration from defaults, an optional file, and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::Missing {
                    key: path.display().to_string(),
                });
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Visibility timeout applied to leases by default
    pub fn default_visibility_timeout(&self) -> Duration {
        bounded_seconds(self.default_visibility_timeout_seconds)
    }

    /// TTL applied to puts by default
    pub fn default_message_ttl(&self) -> Duration {
        bounded_seconds(self.default_message_ttl_seconds)
    }

    /// Longest TTL a put may request
    pub fn max_message_ttl(&self) -> Duration {
        bounded_seconds(self.max_message_ttl_seconds)
    }

    /// Check limits are usable and consistent
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (field, value) in [
            (
                "default_visibility_timeout_seconds",
                self.default_visibility_timeout_seconds,
            ),
            ("default_message_ttl_seconds", self.default_message_ttl_seconds),
            ("max_message_ttl_seconds", self.max_message_ttl_seconds),
        ] {
            if value > MAX_DURATION_SECONDS {
                return Err(ConfigurationError::Invalid {
                    message: format!("{} must not exceed {}", field, MAX_DURATION_SECONDS),
                });
            }
        }

        if self.max_messages_per_lease == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_messages_per_lease must be at least 1".to_string(),
            });
        }

        if self.max_message_ttl_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_message_ttl_seconds must be greater than zero".to_string(),
            });
        }

        if self.default_message_ttl_seconds == 0
            || self.default_message_ttl_seconds > self.max_message_ttl_seconds
        {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "default_message_ttl_seconds must be 1-{}",
                    self.max_message_ttl_seconds
                ),
            });
        }

        if self.max_message_size_bytes == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_message_size_bytes must be greater than zero".to_string(),
            });
        }

        if let LedgerConfig::Sqlite { path } = &self.ledger {
            if path.as_os_str().is_empty() {
                return Err(ConfigurationError::Missing {
                    key: "ledger.path".to_string(),
                });
            }
        }

        Ok(())
    }
}

// Clamped so unvalidated configurations still convert without panicking
fn bounded_seconds(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_DURATION_SECONDS) as i64)
}

/// Factory for creating queue stores with the configured ledger
pub struct QueueStoreFactory;

impl QueueStoreFactory {
    /// Create queue store from configuration
    pub async fn create_store(config: StoreConfig) -> Result<QueueStore, QueueError> {
        config.validate()?;

        let ledger: Arc<dyn PersistentLedger> = match &config.ledger {
            LedgerConfig::InMemory => Arc::new(InMemoryLedger::new()),
            LedgerConfig::Sqlite { path } => Arc::new(SqliteLedger::open(path).await?),
        };

        info!(ledger = %ledger.ledger_kind(), "Created queue store");
        Ok(QueueStore::new(ledger, config))
    }

    /// Create test store with in-memory ledger
    pub fn create_test_store() -> QueueStore {
        QueueStore::new(Arc::new(InMemoryLedger::new()), StoreConfig::default())
    }
}
