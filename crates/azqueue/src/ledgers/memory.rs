//! In-memory ledger implementation for testing and development.
//!
//! Every operation runs under a single write lock, which gives the per-row
//! atomicity the lease protocol requires. Rows are kept per queue in insertion
//! order so leases hand out the oldest eligible message first.

use crate::error::QueueError;
use crate::ledger::{LedgerKind, LedgerUpdate, PersistentLedger};
use crate::message::{LeasedMessage, MessageId, PopReceipt, QueueName, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Storage for all queues
#[derive(Default)]
struct LedgerStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    next_seq: u64,
}

/// Rows of a single queue keyed by insertion sequence
#[derive(Default)]
struct InMemoryQueue {
    rows: BTreeMap<u64, StoredMessage>,
    index: HashMap<MessageId, u64>,
}

impl InMemoryQueue {
    fn row_mut(&mut self, id: &MessageId) -> Option<(u64, &mut StoredMessage)> {
        let seq = *self.index.get(id)?;
        self.rows.get_mut(&seq).map(|row| (seq, row))
    }

    fn remove(&mut self, seq: u64) -> Option<StoredMessage> {
        let row = self.rows.remove(&seq)?;
        self.index.remove(&row.message_id);
        Some(row)
    }
}

#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    inserted_at: Timestamp,
    visible_at: Timestamp,
    expires_at: Timestamp,
    pop_receipt: PopReceipt,
    dequeue_count: u32,
}

impl StoredMessage {
    fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    fn is_eligible(&self, now: Timestamp) -> bool {
        now >= self.visible_at && !self.is_expired(now)
    }

    fn is_leased(&self, now: Timestamp) -> bool {
        self.visible_at > now
    }
}

// ============================================================================
// InMemoryLedger
// ============================================================================

/// In-memory ledger; clones share the same rows
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    storage: Arc<RwLock<LedgerStorage>>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerStorage> {
        self.storage.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerStorage> {
        self.storage.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PersistentLedger for InMemoryLedger {
    async fn put(
        &self,
        queue: &QueueName,
        body: Bytes,
        visible_at: Timestamp,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<MessageId, QueueError> {
        let mut storage = self.write();
        let seq = storage.next_seq;
        storage.next_seq += 1;

        let message_id = MessageId::new();
        let row = StoredMessage {
            message_id: message_id.clone(),
            body,
            inserted_at: now,
            visible_at,
            expires_at,
            pop_receipt: PopReceipt::new(),
            dequeue_count: 0,
        };

        let rows = storage.queues.entry(queue.clone()).or_default();
        rows.index.insert(message_id.clone(), seq);
        rows.rows.insert(seq, row);

        debug!(queue = %queue, message_id = %message_id, seq = seq, "Inserted message row");
        Ok(message_id)
    }

    async fn lease(
        &self,
        queue: &QueueName,
        now: Timestamp,
        new_visible_at: Timestamp,
        max_messages: u32,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        let mut storage = self.write();
        let Some(rows) = storage.queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let leased: Vec<LeasedMessage> = rows
            .rows
            .values_mut()
            .filter(|row| row.is_eligible(now))
            .take(max_messages as usize)
            .map(|row| {
                row.visible_at = new_visible_at;
                row.pop_receipt = PopReceipt::new();
                row.dequeue_count += 1;

                LeasedMessage {
                    message_id: row.message_id.clone(),
                    body: row.body.clone(),
                    pop_receipt: row.pop_receipt.clone(),
                    dequeue_count: row.dequeue_count,
                    inserted_at: row.inserted_at,
                    expires_at: row.expires_at,
                    next_visible_at: row.visible_at,
                }
            })
            .collect();

        debug!(queue = %queue, leased = leased.len(), "Leased message rows");
        Ok(leased)
    }

    async fn delete(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<u64, QueueError> {
        let mut storage = self.write();
        let Some(rows) = storage.queues.get_mut(queue) else {
            return Ok(0);
        };

        let seq = match rows.row_mut(id) {
            Some((seq, row)) if row.pop_receipt == *pop_receipt => seq,
            _ => return Ok(0),
        };

        Ok(rows.remove(seq).map_or(0, |_| 1))
    }

    async fn update(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
        update: LedgerUpdate,
        now: Timestamp,
    ) -> Result<u64, QueueError> {
        let mut storage = self.write();
        let Some(rows) = storage.queues.get_mut(queue) else {
            return Ok(0);
        };

        match rows.row_mut(id) {
            Some((_, row))
                if row.pop_receipt == *pop_receipt
                    && row.is_leased(now)
                    && !row.is_expired(now) =>
            {
                if let Some(body) = update.new_body {
                    row.body = body;
                }
                row.pop_receipt = update.new_pop_receipt;
                row.visible_at = update.new_visible_at;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn contains(
        &self,
        queue: &QueueName,
        id: &MessageId,
        now: Timestamp,
    ) -> Result<bool, QueueError> {
        let storage = self.read();
        let found = storage
            .queues
            .get(queue)
            .and_then(|rows| rows.index.get(id).and_then(|seq| rows.rows.get(seq)))
            .is_some_and(|row| !row.is_expired(now));
        Ok(found)
    }

    async fn count(&self, queue: &QueueName, now: Timestamp) -> Result<u64, QueueError> {
        let storage = self.read();
        let count = storage.queues.get(queue).map_or(0, |rows| {
            rows.rows.values().filter(|row| !row.is_expired(now)).count()
        });
        Ok(count as u64)
    }

    async fn delete_expired(&self, now: Timestamp) -> Result<u64, QueueError> {
        let mut storage = self.write();
        let mut removed = 0u64;

        for rows in storage.queues.values_mut() {
            let expired: Vec<u64> = rows
                .rows
                .iter()
                .filter(|(_, row)| row.is_expired(now))
                .map(|(seq, _)| *seq)
                .collect();

            for seq in expired {
                if rows.remove(seq).is_some() {
                    removed += 1;
                }
            }
        }

        storage.queues.retain(|_, rows| !rows.rows.is_empty());
        Ok(removed)
    }

    fn ledger_kind(&self) -> LedgerKind {
        LedgerKind::InMemory
    }
}
