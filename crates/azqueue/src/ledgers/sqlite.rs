//! SQLite ledger implementation.
//!
//! Messages live in a single `azure_queue_messages` table. Timestamps are stored
//! as milliseconds since the Unix epoch and insertion order is the
//! autoincrement `seq` column.
//!
//! ## Atomicity
//!
//! A lease runs inside an `IMMEDIATE` transaction, which takes SQLite's write
//! lock before the eligible rows are selected. Selection and re-stamping of
//! the rows therefore happen as one unit, both between tasks sharing this
//! ledger and between processes sharing the database file. Delete and update
//! are single conditional statements keyed on the current pop receipt.
//!
//! rusqlite is blocking, so every call is moved onto tokio's blocking pool.

use crate::error::QueueError;
use crate::ledger::{LedgerKind, LedgerUpdate, PersistentLedger};
use crate::message::{LeasedMessage, MessageId, PopReceipt, QueueName, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS azure_queue_messages (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    queue_name    TEXT    NOT NULL,
    message_id    TEXT    NOT NULL UNIQUE,
    message_text  BLOB    NOT NULL,
    inserted_at   INTEGER NOT NULL,
    visible_at    INTEGER NOT NULL,
    expires_at    INTEGER NOT NULL,
    pop_receipt   TEXT    NOT NULL,
    dequeue_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS azure_queue_messages_visible
    ON azure_queue_messages (queue_name, visible_at);
CREATE INDEX IF NOT EXISTS azure_queue_messages_expires
    ON azure_queue_messages (expires_at);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger backed by a SQLite database
#[derive(Clone)]
pub struct SqliteLedger {
    connection: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteLedger {
    /// Open (creating if needed) the database at `path` and apply the schema
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();

        let connection = tokio::task::spawn_blocking(move || -> Result<Connection, QueueError> {
            let connection = Connection::open_with_flags(
                &open_path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            connection.busy_timeout(BUSY_TIMEOUT)?;
            connection.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            connection.execute_batch(SCHEMA)?;
            Ok(connection)
        })
        .await??;

        info!(path = %path.display(), "Opened SQLite queue ledger");

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            path: Some(path),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, QueueError> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch(SCHEMA)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            path: None,
        })
    }

    /// Database file path, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `op` against the connection on the blocking pool
    async fn with_connection<T, F>(&self, op: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, QueueError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection.lock().unwrap_or_else(|e| e.into_inner());
            op(&mut guard)
        })
        .await?
    }
}

fn timestamp_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Timestamp> {
    let millis: i64 = row.get(index)?;
    Timestamp::from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(index, millis))
}

#[async_trait]
impl PersistentLedger for SqliteLedger {
    async fn put(
        &self,
        queue: &QueueName,
        body: Bytes,
        visible_at: Timestamp,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<MessageId, QueueError> {
        let queue_name = queue.as_str().to_string();
        let message_id = MessageId::new();
        let id = message_id.as_str().to_string();

        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO azure_queue_messages
                     (queue_name, message_id, message_text, inserted_at, visible_at, expires_at, pop_receipt)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    queue_name,
                    id,
                    body.as_ref(),
                    now.as_millis(),
                    visible_at.as_millis(),
                    expires_at.as_millis(),
                    PopReceipt::new().as_str(),
                ],
            )?;
            Ok(())
        })
        .await?;

        debug!(queue = %queue, message_id = %message_id, "Inserted message row");
        Ok(message_id)
    }

    async fn lease(
        &self,
        queue: &QueueName,
        now: Timestamp,
        new_visible_at: Timestamp,
        max_messages: u32,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        let queue_name = queue.as_str().to_string();
        // Report the deadline as persisted, at millisecond precision
        let stored_visible_at =
            Timestamp::from_millis(new_visible_at.as_millis()).unwrap_or(new_visible_at);

        let leased = self
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut leased = Vec::new();
                {
                    let mut select = tx.prepare(
                        "SELECT seq, message_id, message_text, inserted_at, expires_at, dequeue_count
                         FROM azure_queue_messages
                         WHERE queue_name = ?1 AND visible_at <= ?2 AND expires_at > ?2
                         ORDER BY seq
                         LIMIT ?3",
                    )?;
                    let candidates = select
                        .query_map(
                            params![queue_name, now.as_millis(), i64::from(max_messages)],
                            |row| {
                                Ok((
                                    row.get::<_, i64>(0)?,
                                    row.get::<_, String>(1)?,
                                    row.get::<_, Vec<u8>>(2)?,
                                    timestamp_column(row, 3)?,
                                    timestamp_column(row, 4)?,
                                    row.get::<_, u32>(5)?,
                                ))
                            },
                        )?
                        .collect::<Result<Vec<_>, _>>()?;

                    let mut stamp = tx.prepare(
                        "UPDATE azure_queue_messages
                         SET visible_at = ?1, pop_receipt = ?2, dequeue_count = dequeue_count + 1
                         WHERE seq = ?3",
                    )?;

                    for (seq, id, body, inserted_at, expires_at, dequeue_count) in candidates {
                        let pop_receipt = PopReceipt::new();
                        stamp.execute(params![
                            stored_visible_at.as_millis(),
                            pop_receipt.as_str(),
                            seq
                        ])?;

                        leased.push(LeasedMessage {
                            message_id: id.parse()?,
                            body: Bytes::from(body),
                            pop_receipt,
                            dequeue_count: dequeue_count + 1,
                            inserted_at,
                            expires_at,
                            next_visible_at: stored_visible_at,
                        });
                    }
                }
                tx.commit()?;
                Ok(leased)
            })
            .await?;

        debug!(queue = %queue, leased = leased.len(), "Leased message rows");
        Ok(leased)
    }

    async fn delete(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<u64, QueueError> {
        let queue_name = queue.as_str().to_string();
        let id = id.as_str().to_string();
        let pop_receipt = pop_receipt.as_str().to_string();

        self.with_connection(move |conn| {
            let affected = conn.execute(
                "DELETE FROM azure_queue_messages
                 WHERE queue_name = ?1 AND message_id = ?2 AND pop_receipt = ?3",
                params![queue_name, id, pop_receipt],
            )?;
            Ok(affected as u64)
        })
        .await
    }

    async fn update(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
        update: LedgerUpdate,
        now: Timestamp,
    ) -> Result<u64, QueueError> {
        let queue_name = queue.as_str().to_string();
        let id = id.as_str().to_string();
        let pop_receipt = pop_receipt.as_str().to_string();

        self.with_connection(move |conn| {
            let new_body = update.new_body.as_ref().map(|body| body.to_vec());
            let affected = conn.execute(
                "UPDATE azure_queue_messages
                 SET message_text = COALESCE(?1, message_text),
                     pop_receipt = ?2,
                     visible_at = ?3
                 WHERE queue_name = ?4 AND message_id = ?5 AND pop_receipt = ?6
                   AND visible_at > ?7 AND expires_at > ?7",
                params![
                    new_body,
                    update.new_pop_receipt.as_str(),
                    update.new_visible_at.as_millis(),
                    queue_name,
                    id,
                    pop_receipt,
                    now.as_millis(),
                ],
            )?;
            Ok(affected as u64)
        })
        .await
    }

    async fn contains(
        &self,
        queue: &QueueName,
        id: &MessageId,
        now: Timestamp,
    ) -> Result<bool, QueueError> {
        let queue_name = queue.as_str().to_string();
        let id = id.as_str().to_string();

        self.with_connection(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM azure_queue_messages
                     WHERE queue_name = ?1 AND message_id = ?2 AND expires_at > ?3",
                    params![queue_name, id, now.as_millis()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn count(&self, queue: &QueueName, now: Timestamp) -> Result<u64, QueueError> {
        let queue_name = queue.as_str().to_string();

        self.with_connection(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM azure_queue_messages
                 WHERE queue_name = ?1 AND expires_at > ?2",
                params![queue_name, now.as_millis()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn delete_expired(&self, now: Timestamp) -> Result<u64, QueueError> {
        let removed = self
            .with_connection(move |conn| {
                let affected = conn.execute(
                    "DELETE FROM azure_queue_messages WHERE expires_at <= ?1",
                    params![now.as_millis()],
                )?;
                Ok(affected as u64)
            })
            .await?;

        debug!(removed = removed, "Deleted expired message rows");
        Ok(removed)
    }

    fn ledger_kind(&self) -> LedgerKind {
        LedgerKind::Sqlite
    }
}
