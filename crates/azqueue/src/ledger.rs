//! Persistent ledger contract.
//!
//! A ledger stores message rows and performs the atomic row transitions the
//! lease protocol depends on. The queue store computes every absolute time
//! (including `now`) and hands it across this boundary; ledgers never consult
//! a clock and never receive raw durations.

use crate::error::QueueError;
use crate::message::{LeasedMessage, MessageId, PopReceipt, QueueName, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Enumeration of available ledger backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerKind {
    InMemory,
    Sqlite,
}

impl LedgerKind {
    /// Whether rows survive process restarts
    pub fn is_durable(&self) -> bool {
        match self {
            Self::InMemory => false,
            Self::Sqlite => true,
        }
    }
}

impl std::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => write!(f, "in-memory"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Row mutation applied by [`PersistentLedger::update`]
#[derive(Debug, Clone)]
pub struct LedgerUpdate {
    /// Replacement body, or `None` to keep the current one
    pub new_body: Option<Bytes>,
    pub new_pop_receipt: PopReceipt,
    pub new_visible_at: Timestamp,
}

/// Storage backend for queue messages
///
/// Implementations must make `lease` atomic per row: once a row has been
/// selected and stamped with a new receipt by one call, no concurrent call may
/// select it until its new `visible_at` has passed.
#[async_trait]
pub trait PersistentLedger: Send + Sync {
    /// Insert a new message row and return its id
    async fn put(
        &self,
        queue: &QueueName,
        body: Bytes,
        visible_at: Timestamp,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<MessageId, QueueError>;

    /// Atomically select up to `max_messages` rows eligible at `now`, oldest
    /// first, stamp each with a fresh receipt and `new_visible_at`, and return them
    async fn lease(
        &self,
        queue: &QueueName,
        now: Timestamp,
        new_visible_at: Timestamp,
        max_messages: u32,
    ) -> Result<Vec<LeasedMessage>, QueueError>;

    /// Remove the row matching `id` and `pop_receipt`; returns affected row count
    async fn delete(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<u64, QueueError>;

    /// Apply `update` to the row matching `id` and `pop_receipt` whose lease is
    /// still active and which has not expired at `now`; returns affected row count
    async fn update(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
        update: LedgerUpdate,
        now: Timestamp,
    ) -> Result<u64, QueueError>;

    /// Whether an unexpired row with `id` exists
    async fn contains(
        &self,
        queue: &QueueName,
        id: &MessageId,
        now: Timestamp,
    ) -> Result<bool, QueueError>;

    /// Number of unexpired rows in the queue, leased or not
    async fn count(&self, queue: &QueueName, now: Timestamp) -> Result<u64, QueueError>;

    /// Physically remove every row that expired at or before `now`
    async fn delete_expired(&self, now: Timestamp) -> Result<u64, QueueError>;

    /// Get ledger backend kind
    fn ledger_kind(&self) -> LedgerKind;
}
