//! Message store abstraction
//!
//! The store is the only mutable shared resource in the system: producers
//! append through `send`, consumers poll through `receive` and settle with
//! `acknowledge`, and the monitoring scanners read trailing windows. The
//! trait exists so the durable external table and the in-memory
//! implementation are interchangeable in tests and embedders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::BusResult;
use crate::protocol::{Message, MessageType, Severity};

pub mod memory;

pub use memory::MemoryStore;

/// Store health probe result
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub status: StoreStatus,
    pub detail: String,
}

/// Coarse store status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Insert notification stream for one recipient
///
/// Push optimization layered over polling; correctness never depends on
/// it. Lagged receivers miss notifications, not messages - the next poll
/// picks those up.
pub struct InsertSubscription {
    recipient: String,
    rx: broadcast::Receiver<Message>,
}

impl InsertSubscription {
    pub fn new(recipient: String, rx: broadcast::Receiver<Message>) -> Self {
        Self { recipient, rx }
    }

    /// Next message addressed to the subscribed recipient
    ///
    /// Returns None once the store side of the channel is gone.
    pub async fn next(&mut self) -> Option<Message> {
        loop {
            match self.rx.recv().await {
                Ok(message) if message.recipient == self.recipient => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Durable, queryable message store contract
///
/// Delivery semantics are at-least-once: an unacknowledged message is
/// returned by every `receive` call until acknowledged, so consumers must
/// deduplicate by message id.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Validate and persist a message, returning the stored record with
    /// its assigned id and timestamps
    async fn send(
        &self,
        sender: &str,
        recipient: &str,
        message_type: MessageType,
        payload: Value,
        context_id: Option<String>,
    ) -> BusResult<Message>;

    /// Unacknowledged messages addressed to `recipient`, newest-first
    ///
    /// With a cursor, only messages created strictly after the cursor
    /// message are returned; an unknown cursor id is a validation error.
    async fn receive(
        &self,
        recipient: &str,
        after: Option<Uuid>,
        limit: usize,
        type_filter: Option<&[MessageType]>,
    ) -> BusResult<Vec<Message>>;

    /// Idempotently transition a message to `Acknowledged`
    ///
    /// Re-acknowledging is a no-op that returns the record with its
    /// original acknowledgment stamp.
    async fn acknowledge(&self, message_id: Uuid, by: &str) -> BusResult<Message>;

    /// Subscribe to insert notifications for one recipient
    fn subscribe_on_insert(&self, recipient: &str) -> InsertSubscription;

    /// Probe store availability
    async fn health_check(&self) -> StoreHealth;

    /// Delete messages older than the given age, skipping protected
    /// payload severities; returns the number removed
    async fn cleanup(&self, older_than_days: i64, exclude_severities: &[Severity])
        -> BusResult<usize>;

    /// All messages created at or after `since`, oldest-first, any status
    ///
    /// The read the router load check and the monitoring scanners run on.
    async fn window(&self, since: DateTime<Utc>) -> BusResult<Vec<Message>>;
}
