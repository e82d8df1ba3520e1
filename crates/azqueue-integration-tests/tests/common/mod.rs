//! Common test utilities for azqueue integration tests
//!
//! This module provides:
//! - Store fixtures for every ledger implementation, driven by a manual clock
//! - A ledger that fails every call, for error propagation tests

use async_trait::async_trait;
use azqueue::{
    InMemoryLedger, LeasedMessage, LedgerKind, LedgerUpdate, ManualClock, MessageId,
    PersistentLedger, PopReceipt, QueueError, QueueName, QueueStore, SqliteLedger, StoreConfig,
    Timestamp,
};
use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Store Fixtures
// ============================================================================

/// A queue store plus the clock that drives it
#[allow(dead_code)]
pub struct TestQueue {
    pub store: QueueStore,
    pub clock: ManualClock,
    _dir: Option<TempDir>,
}

#[allow(dead_code)]
impl TestQueue {
    pub fn kind(&self) -> LedgerKind {
        self.store.ledger_kind()
    }
}

#[allow(dead_code)]
pub fn start_time() -> Timestamp {
    Timestamp::from_millis(1_700_000_000_000).unwrap()
}

#[allow(dead_code)]
pub fn in_memory_queue() -> TestQueue {
    let clock = ManualClock::new(start_time());
    let store = QueueStore::with_clock(
        Arc::new(InMemoryLedger::new()),
        Arc::new(clock.clone()),
        StoreConfig::default(),
    );

    TestQueue {
        store,
        clock,
        _dir: None,
    }
}

#[allow(dead_code)]
pub async fn sqlite_queue() -> TestQueue {
    let dir = TempDir::new().unwrap();
    let ledger = SqliteLedger::open(dir.path().join("queue.db")).await.unwrap();
    let clock = ManualClock::new(start_time());
    let store =
        QueueStore::with_clock(Arc::new(ledger), Arc::new(clock.clone()), StoreConfig::default());

    TestQueue {
        store,
        clock,
        _dir: Some(dir),
    }
}

/// One fixture per ledger implementation
#[allow(dead_code)]
pub async fn all_ledgers() -> Vec<TestQueue> {
    vec![in_memory_queue(), sqlite_queue().await]
}

#[allow(dead_code)]
pub fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

// ============================================================================
// Failing Ledger
// ============================================================================

/// Ledger whose every call fails with a storage error
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct FailingLedger;

impl FailingLedger {
    fn unavailable() -> QueueError {
        QueueError::Storage {
            message: "ledger unavailable".to_string(),
        }
    }
}

#[async_trait]
impl PersistentLedger for FailingLedger {
    async fn put(
        &self,
        _queue: &QueueName,
        _body: Bytes,
        _visible_at: Timestamp,
        _expires_at: Timestamp,
        _now: Timestamp,
    ) -> Result<MessageId, QueueError> {
        Err(Self::unavailable())
    }

    async fn lease(
        &self,
        _queue: &QueueName,
        _now: Timestamp,
        _new_visible_at: Timestamp,
        _max_messages: u32,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        Err(Self::unavailable())
    }

    async fn delete(
        &self,
        _queue: &QueueName,
        _id: &MessageId,
        _pop_receipt: &PopReceipt,
    ) -> Result<u64, QueueError> {
        Err(Self::unavailable())
    }

    async fn update(
        &self,
        _queue: &QueueName,
        _id: &MessageId,
        _pop_receipt: &PopReceipt,
        _update: LedgerUpdate,
        _now: Timestamp,
    ) -> Result<u64, QueueError> {
        Err(Self::unavailable())
    }

    async fn contains(
        &self,
        _queue: &QueueName,
        _id: &MessageId,
        _now: Timestamp,
    ) -> Result<bool, QueueError> {
        Err(Self::unavailable())
    }

    async fn count(&self, _queue: &QueueName, _now: Timestamp) -> Result<u64, QueueError> {
        Err(Self::unavailable())
    }

    async fn delete_expired(&self, _now: Timestamp) -> Result<u64, QueueError> {
        Err(Self::unavailable())
    }

    fn ledger_kind(&self) -> LedgerKind {
        LedgerKind::InMemory
    }
}
