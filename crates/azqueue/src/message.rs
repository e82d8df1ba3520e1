//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Duration, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name following Azure Storage Queue naming rules
///
/// Names are 3-63 characters of lowercase ASCII letters, digits and single
/// hyphens, starting and ending with a letter or digit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.len() < 3 || name.len() > 63 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 3-63 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only lowercase ASCII letters, digits, and hyphens allowed".to_string(),
            });
        }

        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// Unique identifier assigned to a message when it is put
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque lease token proving the holder currently owns a message's lease
///
/// A fresh receipt is minted on every lease and every extension; any earlier
/// receipt for the same message stops matching at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopReceipt(String);

impl PopReceipt {
    /// Mint a new random receipt
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get receipt as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PopReceipt {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PopReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PopReceipt {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "pop_receipt".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time, truncated to milliseconds
    pub fn now() -> Self {
        Self(Utc::now()).trunc_millis()
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create timestamp from milliseconds since the Unix epoch
    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Drop precision below one millisecond, the resolution ledgers persist
    pub fn trunc_millis(&self) -> Self {
        Self(self.0.trunc_subsecs(3))
    }

    /// Milliseconds since the Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Timestamp offset from this one by `offset`, or `None` when the result
    /// falls outside the representable range
    pub fn checked_plus(&self, offset: Duration) -> Option<Self> {
        self.0.checked_add_signed(offset).map(Self)
    }

    /// Timestamp offset from this one by `offset`, clamped to the
    /// representable range
    pub fn plus(&self, offset: Duration) -> Self {
        self.checked_plus(offset).unwrap_or(if offset < Duration::zero() {
            Self(DateTime::<Utc>::MIN_UTC)
        } else {
            Self(DateTime::<Utc>::MAX_UTC)
        })
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message handed to a consumer by a lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub pop_receipt: PopReceipt,
    /// Number of times this message has been leased, including this one
    pub dequeue_count: u32,
    pub inserted_at: Timestamp,
    pub expires_at: Timestamp,
    /// When the lease lapses and the message becomes eligible again
    pub next_visible_at: Timestamp,
}

impl LeasedMessage {
    /// Body interpreted as UTF-8 text, if valid
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Result of a successful lease extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRenewal {
    /// Receipt replacing the one presented to the extension
    pub pop_receipt: PopReceipt,
    pub next_visible_at: Timestamp,
}

// ============================================================================
// Put and Lease Options
// ============================================================================

/// Options controlling how a message is enqueued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// Delay before the message first becomes eligible for lease
    pub visibility_timeout: Duration,
    /// Lifetime of the message measured from the put
    pub time_to_live: Duration,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::zero(),
            time_to_live: Duration::days(7),
        }
    }
}

impl PutOptions {
    /// Create new put options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set initial visibility delay
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set time-to-live
    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = ttl;
        self
    }
}

/// Options controlling a lease request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseOptions {
    /// How long leased messages stay hidden from other consumers
    pub visibility_timeout: Duration,
    /// Upper bound on the batch size
    pub max_messages: u32,
}

impl Default for LeaseOptions {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::seconds(30),
            max_messages: 1,
        }
    }
}

impl LeaseOptions {
    /// Create new lease options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set visibility timeout applied to each leased message
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set maximum number of messages to lease
    pub fn with_max_messages(mut self, max: u32) -> Self {
        self.max_messages = max;
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
