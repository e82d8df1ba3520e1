//! Error types for queue operations.

use chrono::Duration;
use thiserror::Error;

/// Error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    /// The ledger is unreachable or rejected the operation
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Receipt does not match the message's current lease, or the message is gone
    #[error("Lease mismatch for message {message_id}: receipt is stale or message no longer exists")]
    LeaseMismatch { message_id: String },

    /// Reserved for administrative lookups; the lease protocol reports
    /// missing messages as `LeaseMismatch` or an idempotent success
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl QueueError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage { .. } => true,
            Self::LeaseMismatch { .. } => false,
            Self::NotFound { .. } => false,
            Self::Validation(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Check if error should be retried
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Storage { .. } => Some(Duration::seconds(1)),
            _ => None,
        }
    }

    pub(crate) fn storage(message: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: message.to_string(),
        }
    }
}

impl From<rusqlite::Error> for QueueError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage(err)
    }
}

impl From<tokio::task::JoinError> for QueueError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage {
            message: format!("ledger task failed: {}", err),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::Parsing {
            message: err.to_string(),
        }
    }
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
