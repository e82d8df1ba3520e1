//! Queue administration surface.
//!
//! Queues come into existence implicitly on their first put, so provisioning
//! calls are accepted and logged but change nothing. The only operation with
//! real data behind it is [`QueueAdmin::get_metadata`], which reports the
//! ledger's message count.

use crate::clock::{Clock, SystemClock};
use crate::error::QueueError;
use crate::ledger::PersistentLedger;
use crate::message::QueueName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;

/// Queue metadata as reported by [`QueueAdmin::get_metadata`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetadata {
    /// Approximate number of unexpired messages
    pub message_count: u64,
    pub metadata: HashMap<String, String>,
}

/// Administrative operations layered above the lease protocol
#[async_trait]
pub trait QueueAdmin: Send + Sync {
    async fn create_queue(
        &self,
        queue: &QueueName,
        metadata: HashMap<String, String>,
    ) -> Result<(), QueueError>;

    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError>;

    async fn list_queues(&self) -> Result<Vec<QueueName>, QueueError>;

    async fn get_metadata(&self, queue: &QueueName) -> Result<QueueMetadata, QueueError>;

    async fn set_metadata(
        &self,
        queue: &QueueName,
        metadata: HashMap<String, String>,
    ) -> Result<(), QueueError>;
}

/// Administration backed by a ledger, with provisioning as no-ops
#[derive(Clone)]
pub struct LedgerQueueAdmin {
    ledger: Arc<dyn PersistentLedger>,
    clock: Arc<dyn Clock>,
}

impl LedgerQueueAdmin {
    pub fn new(ledger: Arc<dyn PersistentLedger>) -> Self {
        Self::with_clock(ledger, Arc::new(SystemClock))
    }

    pub fn with_clock(ledger: Arc<dyn PersistentLedger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }
}

#[async_trait]
impl QueueAdmin for LedgerQueueAdmin {
    async fn create_queue(
        &self,
        queue: &QueueName,
        metadata: HashMap<String, String>,
    ) -> Result<(), QueueError> {
        debug!(queue = %queue, keys = metadata.len(), "create_queue is a no-op");
        Ok(())
    }

    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        debug!(queue = %queue, "delete_queue is a no-op");
        Ok(())
    }

    async fn list_queues(&self) -> Result<Vec<QueueName>, QueueError> {
        Ok(Vec::new())
    }

    async fn get_metadata(&self, queue: &QueueName) -> Result<QueueMetadata, QueueError> {
        let message_count = self.ledger.count(queue, self.clock.now()).await?;
        Ok(QueueMetadata {
            message_count,
            metadata: HashMap::new(),
        })
    }

    async fn set_metadata(
        &self,
        queue: &QueueName,
        metadata: HashMap<String, String>,
    ) -> Result<(), QueueError> {
        debug!(queue = %queue, keys = metadata.len(), "set_metadata is a no-op");
        Ok(())
    }
}
