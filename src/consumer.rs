//! Per-agent polling consumer
//!
//! One cooperative loop per agent identity: fetch undelivered messages
//! since the cursor, dispatch through a type-keyed handler table,
//! acknowledge, advance. Handler failures are caught and forwarded to the
//! recovery engine over a channel; the loop itself never stops on them.
//! Because delivery is at-least-once, a bounded processed-id set
//! deduplicates the redelivery window before acknowledgment; the cursor
//! keeps everything older from being refetched at all.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConsumerSection;
use crate::error::BusResult;
use crate::protocol::{Message, MessageType};
use crate::store::MessageStore;

/// Handler for one message type
///
/// Handlers must be idempotent with respect to message id: two consumers
/// for the same recipient identity may both observe an unacknowledged
/// message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> BusResult<()>;
}

/// A caught handler failure, reported to the recovery engine
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub agent: String,
    pub message_id: Uuid,
    pub message_type: MessageType,
    pub error: String,
}

/// Polling consumer for one agent identity
pub struct PollingConsumer<S: MessageStore> {
    agent: String,
    store: Arc<S>,
    handlers: HashMap<MessageType, Box<dyn MessageHandler>>,
    poll_interval: Duration,
    receive_limit: usize,
    processed: HashSet<Uuid>,
    processed_bound: usize,
    last_seen: Option<Uuid>,
    failure_tx: Option<mpsc::UnboundedSender<HandlerFailure>>,
    shutdown: watch::Receiver<bool>,
}

impl<S: MessageStore> PollingConsumer<S> {
    pub fn new(
        agent: String,
        store: Arc<S>,
        config: &ConsumerSection,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            agent,
            store,
            handlers: HashMap::new(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            receive_limit: config.receive_limit,
            processed: HashSet::new(),
            processed_bound: config.processed_set_bound,
            last_seen: None,
            failure_tx: None,
            shutdown,
        }
    }

    /// Register the handler for a message type, replacing any previous one
    pub fn register_handler(
        &mut self,
        message_type: MessageType,
        handler: Box<dyn MessageHandler>,
    ) -> &mut Self {
        self.handlers.insert(message_type, handler);
        self
    }

    /// Wire the channel handler failures are reported on
    pub fn with_failure_sink(mut self, tx: mpsc::UnboundedSender<HandlerFailure>) -> Self {
        self.failure_tx = Some(tx);
        self
    }

    /// Agent identity this consumer polls as
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Run the polling loop until shutdown is signalled
    pub async fn run(&mut self) {
        info!(agent = %self.agent, interval = ?self.poll_interval, "consumer started");
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        // Store errors are transient from the loop's view;
                        // the recovery engine owns the retry policy
                        warn!(agent = %self.agent, error = %e, "poll failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(agent = %self.agent, "consumer shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Fetch and process one batch; returns how many messages were handled
    ///
    /// Public so embedders and tests can drive the consumer without timers.
    pub async fn poll_once(&mut self) -> BusResult<usize> {
        let batch = self
            .store
            .receive(&self.agent, self.last_seen, self.receive_limit, None)
            .await?;

        if batch.is_empty() {
            return Ok(0);
        }

        // receive returns newest-first; process in chronological order
        let mut handled = 0;
        for message in batch.iter().rev() {
            if self.processed.contains(&message.id) {
                // Redelivery of a message whose acknowledge didn't land
                self.store.acknowledge(message.id, &self.agent).await?;
                continue;
            }

            self.dispatch(message).await;
            self.store.acknowledge(message.id, &self.agent).await?;
            self.remember(message.id);
            self.last_seen = Some(message.id);
            handled += 1;
        }

        debug!(agent = %self.agent, handled, "poll cycle complete");
        Ok(handled)
    }

    async fn dispatch(&self, message: &Message) {
        let Some(handler) = self.handlers.get(&message.message_type) else {
            debug!(
                agent = %self.agent,
                r#type = %message.message_type,
                "no handler registered, acknowledging unhandled message"
            );
            return;
        };

        if let Err(e) = handler.handle(message).await {
            warn!(
                agent = %self.agent,
                id = %message.id,
                r#type = %message.message_type,
                error = %e,
                "handler failed"
            );
            if let Some(tx) = &self.failure_tx {
                let _ = tx.send(HandlerFailure {
                    agent: self.agent.clone(),
                    message_id: message.id,
                    message_type: message.message_type,
                    error: e.to_string(),
                });
            }
        }
    }

    fn remember(&mut self, id: Uuid) {
        if self.processed.len() >= self.processed_bound {
            // The cursor already guards everything before last_seen; only
            // the redelivery window needs deduplication
            debug!(agent = %self.agent, "processed-id set bound reached, clearing");
            self.processed.clear();
        }
        self.processed.insert(id);
    }
}
