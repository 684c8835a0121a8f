//! In-memory message store
//!
//! Reference implementation of the store contract backed by an append-only
//! vector behind an RwLock. Per-row atomicity only, matching the external
//! collaborator contract; there are no cross-row transactions. Insertion
//! order is creation order, which makes cursor comparisons stable even when
//! two messages share a timestamp.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::directory::AgentDirectory;
use crate::error::{BusError, BusResult};
use crate::protocol::{validate_payload, Message, MessageStatus, MessageType, Severity};
use crate::store::{InsertSubscription, MessageStore, StoreHealth, StoreStatus};

/// Capacity of the insert-notification channel
const INSERT_CHANNEL_CAPACITY: usize = 256;

/// In-memory message store validating against an agent directory
#[derive(Debug, Clone)]
pub struct MemoryStore {
    directory: AgentDirectory,
    messages: Arc<RwLock<Vec<Message>>>,
    insert_tx: broadcast::Sender<Message>,
}

impl MemoryStore {
    /// Create an empty store bound to the given agent directory
    pub fn new(directory: AgentDirectory) -> Self {
        let (insert_tx, _) = broadcast::channel(INSERT_CHANNEL_CAPACITY);
        Self {
            directory,
            messages: Arc::new(RwLock::new(Vec::new())),
            insert_tx,
        }
    }

    /// Total number of stored messages
    pub fn len(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct access to the underlying log, for tests that need to
    /// fabricate store states (aged rows, redelivery)
    #[doc(hidden)]
    pub fn raw_messages(&self) -> &Arc<RwLock<Vec<Message>>> {
        &self.messages
    }

    fn validate_send(
        &self,
        sender: &str,
        recipient: &str,
        payload: &Value,
    ) -> BusResult<()> {
        if !self.directory.contains(sender) {
            return Err(BusError::validation(format!(
                "sender '{sender}' is not a registered agent"
            )));
        }
        if !self.directory.contains(recipient) {
            return Err(BusError::validation(format!(
                "recipient '{recipient}' is not a registered agent"
            )));
        }
        validate_payload(payload)
    }

    /// Position and creation time of the cursor message
    fn cursor_position(&self, messages: &[Message], cursor: Uuid) -> BusResult<(usize, DateTime<Utc>)> {
        messages
            .iter()
            .position(|m| m.id == cursor)
            .map(|idx| (idx, messages[idx].created_at))
            .ok_or_else(|| {
                BusError::validation(format!("cursor message {cursor} does not exist"))
            })
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn send(
        &self,
        sender: &str,
        recipient: &str,
        message_type: MessageType,
        payload: Value,
        context_id: Option<String>,
    ) -> BusResult<Message> {
        self.validate_send(sender, recipient, &payload)?;

        let message = Message::new(sender, recipient, message_type, payload, context_id);
        {
            let mut messages = self.messages.write().unwrap();
            messages.push(message.clone());
        }

        debug!(
            id = %message.id,
            sender,
            recipient,
            r#type = %message.message_type,
            "message persisted"
        );

        // No receivers is fine; polling remains the source of truth
        let _ = self.insert_tx.send(message.clone());
        Ok(message)
    }

    async fn receive(
        &self,
        recipient: &str,
        after: Option<Uuid>,
        limit: usize,
        type_filter: Option<&[MessageType]>,
    ) -> BusResult<Vec<Message>> {
        let messages = self.messages.read().unwrap();

        let cursor = match after {
            Some(id) => Some(self.cursor_position(&messages, id)?),
            None => None,
        };

        // Reverse iteration over the append-only log yields newest-first
        let result: Vec<Message> = messages
            .iter()
            .enumerate()
            .rev()
            .filter(|(idx, m)| {
                m.recipient == recipient
                    && m.status == MessageStatus::Sent
                    && cursor.map_or(true, |(cursor_idx, cursor_at)| {
                        (m.created_at, *idx) > (cursor_at, cursor_idx)
                    })
                    && type_filter.map_or(true, |types| types.contains(&m.message_type))
            })
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect();

        Ok(result)
    }

    async fn acknowledge(&self, message_id: Uuid, by: &str) -> BusResult<Message> {
        let mut messages = self.messages.write().unwrap();

        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| {
                BusError::validation(format!("message {message_id} does not exist"))
            })?;

        if message.status == MessageStatus::Acknowledged {
            debug!(id = %message_id, "already acknowledged, no-op");
            return Ok(message.clone());
        }

        let now = Utc::now();
        message.status = MessageStatus::Acknowledged;
        message.acknowledged_by = Some(by.to_string());
        message.acknowledged_at = Some(now);
        message.updated_at = now;

        debug!(id = %message_id, by, "message acknowledged");
        Ok(message.clone())
    }

    fn subscribe_on_insert(&self, recipient: &str) -> InsertSubscription {
        InsertSubscription::new(recipient.to_string(), self.insert_tx.subscribe())
    }

    async fn health_check(&self) -> StoreHealth {
        match self.messages.read() {
            Ok(messages) => StoreHealth {
                status: StoreStatus::Healthy,
                detail: format!("{} messages stored", messages.len()),
            },
            Err(_) => StoreHealth {
                status: StoreStatus::Unhealthy,
                detail: "message log lock poisoned".to_string(),
            },
        }
    }

    async fn cleanup(
        &self,
        older_than_days: i64,
        exclude_severities: &[Severity],
    ) -> BusResult<usize> {
        let threshold = Utc::now() - Duration::days(older_than_days);
        let mut messages = self.messages.write().unwrap();

        let before = messages.len();
        messages.retain(|m| {
            if m.created_at >= threshold {
                return true;
            }
            m.payload_severity()
                .is_some_and(|s| exclude_severities.contains(&s))
        });
        let removed = before - messages.len();

        if removed > 0 {
            info!(removed, older_than_days, "retention sweep removed aged messages");
        }
        Ok(removed)
    }

    async fn window(&self, since: DateTime<Utc>) -> BusResult<Vec<Message>> {
        let messages = self.messages.read().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.created_at >= since)
            .cloned()
            .collect())
    }
}
