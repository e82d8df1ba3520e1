//! # azqueue
//!
//! Polling message queue with Azure Storage Queue semantics over a persistent
//! ledger.
//!
//! This library provides:
//! - Enqueue with initial visibility delay and time-to-live
//! - Lease-based dequeue with visibility timeouts and pop receipts
//! - Lease extension and receipt-checked deletion
//! - In-memory and SQLite ledgers with atomic per-row lease transitions
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Identifiers, leased messages and request options
//! - [`clock`] - Time sources
//! - [`ledger`] - Persistent ledger contract
//! - [`ledgers`] - Ledger implementations
//! - [`store`] - The queue store and its lease protocol
//! - [`admin`] - Queue administration surface
//! - [`config`] - Configuration loading and store construction
//!
//! ## Example
//!
//! ```no_run
//! use azqueue::{LeaseOptions, PutOptions, QueueName, QueueStoreFactory};
//! use chrono::Duration;
//!
//! # async fn example() -> Result<(), azqueue::QueueError> {
//! let store = QueueStoreFactory::create_test_store();
//! let queue = QueueName::new("work-items".to_string())?;
//!
//! store.put(&queue, "hello".into(), PutOptions::new()).await?;
//!
//! let options = LeaseOptions::new().with_visibility_timeout(Duration::seconds(30));
//! for message in store.lease(&queue, options).await? {
//!     store
//!         .delete(&queue, &message.message_id, &message.pop_receipt)
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod ledgers;
pub mod message;
pub mod store;

pub use admin::{LedgerQueueAdmin, QueueAdmin, QueueMetadata};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LedgerConfig, QueueStoreFactory, StoreConfig};
pub use error::{ConfigurationError, QueueError, ValidationError};
pub use ledger::{LedgerKind, LedgerUpdate, PersistentLedger};
pub use ledgers::{InMemoryLedger, SqliteLedger};
pub use message::{
    LeaseOptions, LeaseRenewal, LeasedMessage, MessageId, PopReceipt, PutOptions, QueueName,
    Timestamp,
};
pub use store::QueueStore;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
