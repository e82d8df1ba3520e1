//! Queue store enforcing the message lease protocol.
//!
//! [`QueueStore`] is a thin, stateless service over a [`PersistentLedger`]. It
//! validates requests, turns relative timeouts into absolute timestamps using
//! its [`Clock`], and interprets ledger row counts as protocol outcomes. All
//! coordination between competing consumers happens inside the ledger's
//! atomic row transitions.
//!
//! ## Message lifecycle
//!
//! ```text
//! put ──► Invisible ──(visible_at passes)──► Visible ──lease──► Leased
//!                                               ▲                  │
//!                                               └─(lease lapses)───┤
//!                                                                  ├─delete──► Deleted
//!              any state ──(expires_at passes)──► Expired          └─extend_lease──► Leased
//! ```
//!
//! No timers run; lapsed leases and expired messages are handled by the
//! eligibility filter applied at lease time.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{QueueError, ValidationError};
use crate::ledger::{LedgerKind, LedgerUpdate, PersistentLedger};
use crate::message::{
    LeaseOptions, LeaseRenewal, LeasedMessage, MessageId, PopReceipt, PutOptions, QueueName,
    Timestamp,
};
use bytes::Bytes;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

/// Lease-protocol front end over a persistent ledger
///
/// # Examples
///
/// ```
/// use azqueue::{InMemoryLedger, LeaseOptions, ManualClock, PutOptions, QueueName, QueueStore, StoreConfig};
/// use chrono::Duration;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let clock = ManualClock::default();
/// let store = QueueStore::with_clock(
///     Arc::new(InMemoryLedger::new()),
///     Arc::new(clock.clone()),
///     StoreConfig::default(),
/// );
/// let queue = QueueName::new("jobs".to_string()).unwrap();
///
/// store.put(&queue, "hello".into(), PutOptions::new()).await.unwrap();
///
/// let options = LeaseOptions::new().with_visibility_timeout(Duration::seconds(30));
/// assert_eq!(store.lease(&queue, options.clone()).await.unwrap().len(), 1);
/// assert!(store.lease(&queue, options.clone()).await.unwrap().is_empty());
///
/// clock.advance(Duration::seconds(31));
/// assert_eq!(store.lease(&queue, options).await.unwrap().len(), 1);
/// # });
/// ```
#[derive(Clone)]
pub struct QueueStore {
    ledger: Arc<dyn PersistentLedger>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl QueueStore {
    /// Create store over `ledger` using the system clock
    pub fn new(ledger: Arc<dyn PersistentLedger>, config: StoreConfig) -> Self {
        Self::with_clock(ledger, Arc::new(SystemClock), config)
    }

    /// Create store with an explicit time source
    pub fn with_clock(
        ledger: Arc<dyn PersistentLedger>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        Self {
            ledger,
            clock,
            config,
        }
    }

    /// Get store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get backing ledger kind
    pub fn ledger_kind(&self) -> LedgerKind {
        self.ledger.ledger_kind()
    }

    /// Put options populated from the configured defaults
    pub fn default_put_options(&self) -> PutOptions {
        PutOptions {
            visibility_timeout: Duration::zero(),
            time_to_live: self.config.default_message_ttl(),
        }
    }

    /// Lease options populated from the configured defaults
    pub fn default_lease_options(&self) -> LeaseOptions {
        LeaseOptions {
            visibility_timeout: self.config.default_visibility_timeout(),
            max_messages: 1,
        }
    }

    /// Enqueue a message
    ///
    /// The message becomes eligible for lease once `visibility_timeout` has
    /// elapsed and is never leased again after `time_to_live`.
    ///
    /// # Errors
    ///
    /// - `Validation` for a negative visibility timeout, a non-positive or
    ///   over-limit TTL, or an oversized body
    /// - `Storage` when the ledger write fails
    #[instrument(skip_all, fields(queue = %queue, size = body.len()))]
    pub async fn put(
        &self,
        queue: &QueueName,
        body: Bytes,
        options: PutOptions,
    ) -> Result<MessageId, QueueError> {
        ensure_non_negative("visibility_timeout", options.visibility_timeout)?;

        if options.time_to_live <= Duration::zero() {
            return Err(ValidationError::OutOfRange {
                field: "time_to_live".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        let max_ttl = self.config.max_message_ttl();
        if options.time_to_live > max_ttl {
            return Err(ValidationError::OutOfRange {
                field: "time_to_live".to_string(),
                message: format!("must not exceed {} seconds", max_ttl.num_seconds()),
            }
            .into());
        }

        self.ensure_body_fits(&body)?;

        let now = self.clock.now();
        let visible_at = deadline(now, "visibility_timeout", options.visibility_timeout)?;
        let expires_at = deadline(now, "time_to_live", options.time_to_live)?;

        let message_id = self
            .ledger
            .put(queue, body, visible_at, expires_at, now)
            .await?;

        debug!(
            message_id = %message_id,
            visible_at = %visible_at,
            expires_at = %expires_at,
            "Message enqueued"
        );
        Ok(message_id)
    }

    /// Lease up to `options.max_messages` eligible messages
    ///
    /// Each returned message is hidden from other consumers until
    /// `now + options.visibility_timeout` and carries a fresh pop receipt.
    /// Returns an empty batch when nothing is eligible; never waits.
    #[instrument(skip_all, fields(queue = %queue, max = options.max_messages))]
    pub async fn lease(
        &self,
        queue: &QueueName,
        options: LeaseOptions,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        ensure_non_negative("visibility_timeout", options.visibility_timeout)?;

        if options.max_messages == 0 || options.max_messages > self.config.max_messages_per_lease
        {
            return Err(ValidationError::OutOfRange {
                field: "max_messages".to_string(),
                message: format!("must be 1-{}", self.config.max_messages_per_lease),
            }
            .into());
        }

        let now = self.clock.now();
        let new_visible_at = deadline(now, "visibility_timeout", options.visibility_timeout)?;

        let leased = self
            .ledger
            .lease(queue, now, new_visible_at, options.max_messages)
            .await?;

        debug!(leased = leased.len(), visible_at = %new_visible_at, "Lease completed");
        Ok(leased)
    }

    /// Extend an active lease, optionally replacing the message body
    ///
    /// On success the presented receipt is retired and the returned
    /// [`LeaseRenewal`] carries its replacement.
    ///
    /// # Errors
    ///
    /// - `LeaseMismatch` when the receipt is stale, the lease has already
    ///   lapsed, or the message is gone; the message is left untouched
    /// - `Storage` when the ledger call fails
    #[instrument(skip_all, fields(queue = %queue, message_id = %id))]
    pub async fn extend_lease(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
        new_body: Option<Bytes>,
        visibility_timeout: Duration,
    ) -> Result<LeaseRenewal, QueueError> {
        ensure_non_negative("visibility_timeout", visibility_timeout)?;

        if let Some(body) = &new_body {
            self.ensure_body_fits(body)?;
        }

        let now = self.clock.now();
        let update = LedgerUpdate {
            new_body,
            new_pop_receipt: PopReceipt::new(),
            new_visible_at: deadline(now, "visibility_timeout", visibility_timeout)?,
        };
        let renewal = LeaseRenewal {
            pop_receipt: update.new_pop_receipt.clone(),
            next_visible_at: update.new_visible_at,
        };

        let affected = self
            .ledger
            .update(queue, id, pop_receipt, update, now)
            .await?;

        if affected == 0 {
            warn!("Lease extension rejected: receipt stale or message gone");
            return Err(QueueError::LeaseMismatch {
                message_id: id.to_string(),
            });
        }

        debug!(visible_at = %renewal.next_visible_at, "Lease extended");
        Ok(renewal)
    }

    /// Delete a message using its current pop receipt
    ///
    /// Deleting a message that no longer exists succeeds, since that state is
    /// indistinguishable from a completed earlier delete.
    ///
    /// # Errors
    ///
    /// - `LeaseMismatch` when the message is still live but the receipt is
    ///   not its current one
    /// - `Storage` when the ledger call fails
    #[instrument(skip_all, fields(queue = %queue, message_id = %id))]
    pub async fn delete(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        let affected = self.ledger.delete(queue, id, pop_receipt).await?;
        if affected > 0 {
            debug!("Message deleted");
            return Ok(());
        }

        let now = self.clock.now();
        if self.ledger.contains(queue, id, now).await? {
            warn!("Delete rejected: receipt does not match current lease");
            return Err(QueueError::LeaseMismatch {
                message_id: id.to_string(),
            });
        }

        debug!("Delete of absent message treated as already complete");
        Ok(())
    }

    /// Number of unexpired messages in the queue
    ///
    /// Includes leased and not-yet-visible messages. Concurrent operations may
    /// make the value stale by the time it is returned.
    pub async fn count(&self, queue: &QueueName) -> Result<u64, QueueError> {
        let now = self.clock.now();
        self.ledger.count(queue, now).await
    }

    /// Physically remove expired rows from every queue
    ///
    /// Expired messages are already invisible and uncounted; this only
    /// reclaims storage.
    pub async fn purge_expired(&self) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let removed = self.ledger.delete_expired(now).await?;
        debug!(removed = removed, "Purged expired messages");
        Ok(removed)
    }

    fn ensure_body_fits(&self, body: &Bytes) -> Result<(), ValidationError> {
        if body.len() > self.config.max_message_size_bytes {
            return Err(ValidationError::OutOfRange {
                field: "body".to_string(),
                message: format!(
                    "{} bytes exceeds maximum of {} bytes",
                    body.len(),
                    self.config.max_message_size_bytes
                ),
            });
        }
        Ok(())
    }
}

/// `now + offset` at millisecond precision, rejecting offsets that leave the
/// representable time range
fn deadline(now: Timestamp, field: &str, offset: Duration) -> Result<Timestamp, ValidationError> {
    now.checked_plus(offset)
        .map(|at| at.trunc_millis())
        .ok_or_else(|| ValidationError::OutOfRange {
            field: field.to_string(),
            message: format!("{} seconds is too far in the future", offset.num_seconds()),
        })
}

fn ensure_non_negative(field: &str, value: Duration) -> Result<(), ValidationError> {
    if value < Duration::zero() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: "must not be negative".to_string(),
        });
    }
    Ok(())
}
