//! Ledger implementations.
//!
//! This module contains concrete implementations of the `PersistentLedger`
//! trait for different storage backends.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryLedger;
pub use sqlite::SqliteLedger;
