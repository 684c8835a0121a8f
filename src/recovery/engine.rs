//! Recovery engine
//!
//! Detects failures in the message stream, walks the catalog protocol for
//! each, and escalates exhausted recoveries to the coordinator. Backoff
//! between steps is a cancellable timer, never a blocking sleep, so one
//! engine instance services many in-flight recoveries concurrently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::consumer::HandlerFailure;
use crate::error::BusResult;
use crate::protocol::{Message, MessageType};
use crate::recovery::catalog::{protocol_for, ErrorCategory, RecoveryStep};
use crate::store::{MessageStore, StoreStatus};

/// Textual failure patterns, checked in order; first match wins
static CATEGORY_PATTERNS: Lazy<Vec<(Regex, ErrorCategory)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(?i)store|database|connection").unwrap(),
            ErrorCategory::StoreConnectionFailure,
        ),
        (
            Regex::new(r"(?i)emergency|sla").unwrap(),
            ErrorCategory::EmergencyResponseFailure,
        ),
        (
            Regex::new(r"(?i)quota|limit exceeded|out of memory|disk full|rate limit").unwrap(),
            ErrorCategory::ResourceExhaustion,
        ),
        (
            Regex::new(r"(?i)timeout|unreachable|no response|unacknowledged").unwrap(),
            ErrorCategory::CommunicationFailure,
        ),
        (
            Regex::new(r"(?i)accuracy|drift|model").unwrap(),
            ErrorCategory::ModelAccuracyDegradation,
        ),
    ]
});

/// Classify failure text into an error category
pub fn categorize_failure_text(text: &str) -> ErrorCategory {
    for (pattern, category) in CATEGORY_PATTERNS.iter() {
        if pattern.is_match(text) {
            return *category;
        }
    }
    ErrorCategory::TaskExecutionFailure
}

/// A detected failure the engine can act on
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub category: ErrorCategory,
    pub source_agent: String,
    pub message_id: Option<Uuid>,
    pub context_id: Option<String>,
    pub detail: String,
}

impl ErrorEvent {
    /// Stable key recoveries are tracked under
    pub fn record_key(&self) -> String {
        if let Some(ctx) = &self.context_id {
            return format!("{}:{ctx}", self.category);
        }
        if let Some(id) = &self.message_id {
            return format!("{}:{id}", self.category);
        }
        format!("{}:{}", self.category, self.source_agent)
    }

    /// Build an event from a consumer handler failure
    pub fn from_handler_failure(failure: &HandlerFailure) -> Self {
        Self {
            category: categorize_failure_text(&failure.error),
            source_agent: failure.agent.clone(),
            message_id: Some(failure.message_id),
            context_id: None,
            detail: failure.error.clone(),
        }
    }
}

/// Lifecycle of one tracked recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStatus {
    Pending,
    Attempted,
    Resolved,
    Exhausted,
}

/// Per-error recovery state, process-local
#[derive(Debug, Clone)]
pub struct RecoveryRecord {
    pub category: ErrorCategory,
    pub severity: crate::protocol::Severity,
    pub attempts_made: u32,
    pub status: RecoveryStatus,
    pub last_attempt: Option<DateTime<Utc>>,
}

/// Outcome of one executed recovery step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Resolved,
    Unresolved,
}

/// Executes individual recovery steps
///
/// Injected so tests can script outcomes; the production executor emits
/// corrective messages through the store.
#[async_trait]
pub trait RecoveryStepExecutor: Send + Sync {
    async fn execute(&self, step: RecoveryStep, event: &ErrorEvent) -> BusResult<StepOutcome>;
}

/// Production step executor backed by the message store
pub struct StoreStepExecutor<S: MessageStore> {
    store: Arc<S>,
    reporter: String,
    coordinator: String,
}

impl<S: MessageStore> StoreStepExecutor<S> {
    pub fn new(store: Arc<S>, reporter: String, coordinator: String) -> Self {
        Self {
            store,
            reporter,
            coordinator,
        }
    }

    async fn send_action(
        &self,
        recipient: &str,
        action: &str,
        event: &ErrorEvent,
    ) -> BusResult<()> {
        self.store
            .send(
                &self.reporter,
                recipient,
                MessageType::InfoRequest,
                json!({
                    "action": action,
                    "category": event.category.as_str(),
                    "detail": event.detail,
                }),
                event.context_id.clone(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<S: MessageStore> RecoveryStepExecutor for StoreStepExecutor<S> {
    async fn execute(&self, step: RecoveryStep, event: &ErrorEvent) -> BusResult<StepOutcome> {
        match step {
            RecoveryStep::NotifyAgent => {
                self.send_action(&event.source_agent, "corrective_notice", event)
                    .await?;
                Ok(StepOutcome::Unresolved)
            }
            RecoveryStep::PingAgent => {
                self.send_action(&event.source_agent, "ping", event).await?;
                Ok(StepOutcome::Unresolved)
            }
            RecoveryStep::RequestReassignment => {
                self.send_action(&self.coordinator, "reassign_task", event)
                    .await?;
                Ok(StepOutcome::Unresolved)
            }
            RecoveryStep::VerifyStoreHealth => {
                let health = self.store.health_check().await;
                if health.status == StoreStatus::Healthy {
                    Ok(StepOutcome::Resolved)
                } else {
                    Ok(StepOutcome::Unresolved)
                }
            }
            RecoveryStep::ThrottleIntake => {
                self.send_action(&event.source_agent, "throttle_intake", event)
                    .await?;
                Ok(StepOutcome::Unresolved)
            }
            RecoveryStep::FlushBacklog => {
                self.send_action(&self.coordinator, "rebalance_backlog", event)
                    .await?;
                Ok(StepOutcome::Unresolved)
            }
            RecoveryStep::RecalibrateModel => {
                self.send_action(&event.source_agent, "recalibrate_model", event)
                    .await?;
                Ok(StepOutcome::Unresolved)
            }
            RecoveryStep::FallbackHeuristics => {
                self.send_action(&event.source_agent, "fallback_heuristics", event)
                    .await?;
                Ok(StepOutcome::Unresolved)
            }
        }
    }
}

/// Catalog-driven recovery engine
pub struct RecoveryEngine<S: MessageStore> {
    store: Arc<S>,
    executor: Arc<dyn RecoveryStepExecutor>,
    records: Mutex<HashMap<String, RecoveryRecord>>,
    /// Identity escalations are sent as
    reporter: String,
    coordinator: String,
    cancel: watch::Receiver<bool>,
}

impl<S: MessageStore> RecoveryEngine<S> {
    pub fn new(
        store: Arc<S>,
        executor: Arc<dyn RecoveryStepExecutor>,
        reporter: String,
        coordinator: String,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            executor,
            records: Mutex::new(HashMap::new()),
            reporter,
            coordinator,
            cancel,
        }
    }

    /// Classify failure messages in a window into error events
    pub fn detect(&self, window: &[Message]) -> Vec<ErrorEvent> {
        window
            .iter()
            .filter(|m| m.message_type.is_failure())
            .map(|m| {
                // An explicit payload category wins over text matching
                let category = m
                    .payload
                    .get("category")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_else(|| categorize_failure_text(&m.payload_text()));
                ErrorEvent {
                    category,
                    source_agent: m.sender.clone(),
                    message_id: Some(m.id),
                    context_id: m.context_id.clone(),
                    detail: m.payload_text(),
                }
            })
            .collect()
    }

    /// Run one recovery attempt for an event
    ///
    /// Steps execute in catalog order with geometric backoff between
    /// them; a resolving step short-circuits. Once the attempt budget is
    /// spent without resolution the event escalates to the coordinator
    /// and the record is marked exhausted.
    pub async fn execute(&self, event: &ErrorEvent) -> BusResult<RecoveryStatus> {
        let protocol = protocol_for(event.category);
        let key = event.record_key();

        let attempts = {
            let mut records = self.records.lock().unwrap();
            let record = records.entry(key.clone()).or_insert_with(|| RecoveryRecord {
                category: event.category,
                severity: protocol.severity,
                attempts_made: 0,
                status: RecoveryStatus::Pending,
                last_attempt: None,
            });

            // Settled recoveries never re-fire
            if matches!(
                record.status,
                RecoveryStatus::Resolved | RecoveryStatus::Exhausted
            ) {
                return Ok(record.status);
            }

            record.attempts_made += 1;
            record.status = RecoveryStatus::Attempted;
            record.last_attempt = Some(Utc::now());
            record.attempts_made
        };

        debug!(
            category = %event.category,
            attempt = attempts,
            max = protocol.max_attempts,
            "running recovery attempt"
        );

        let mut resolved = false;
        for (index, step) in protocol.steps.iter().enumerate() {
            if !self.backoff_wait(protocol.delay_before_step(index)).await {
                info!(category = %event.category, "recovery cancelled during backoff");
                return Ok(RecoveryStatus::Attempted);
            }

            match self.executor.execute(*step, event).await {
                Ok(StepOutcome::Resolved) => {
                    info!(category = %event.category, step = step.as_str(), "recovery resolved");
                    resolved = true;
                    break;
                }
                Ok(StepOutcome::Unresolved) => continue,
                Err(e) => {
                    warn!(
                        category = %event.category,
                        step = step.as_str(),
                        error = %e,
                        "recovery step failed"
                    );
                }
            }
        }

        let status = if resolved {
            RecoveryStatus::Resolved
        } else if attempts >= protocol.max_attempts {
            self.escalate(event, attempts).await?;
            RecoveryStatus::Exhausted
        } else {
            RecoveryStatus::Pending
        };

        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&key) {
            record.status = status;
        }
        Ok(status)
    }

    /// Consume handler failures from the consumers until cancelled
    pub async fn run(&self, mut failures: mpsc::UnboundedReceiver<HandlerFailure>) {
        let mut cancel = self.cancel.clone();
        loop {
            tokio::select! {
                maybe = failures.recv() => match maybe {
                    Some(failure) => {
                        let event = ErrorEvent::from_handler_failure(&failure);
                        if let Err(e) = self.execute(&event).await {
                            warn!(error = %e, "recovery execution failed");
                        }
                    }
                    None => return,
                },
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        info!("recovery engine shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Snapshot of all tracked records
    pub fn records(&self) -> Vec<RecoveryRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    /// Record for one event key, if tracked
    pub fn record(&self, key: &str) -> Option<RecoveryRecord> {
        self.records.lock().unwrap().get(key).cloned()
    }

    /// Wait out a backoff delay; returns false when cancelled
    async fn backoff_wait(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return true;
        }
        let mut cancel = self.cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.changed() => !*cancel.borrow(),
        }
    }

    async fn escalate(&self, event: &ErrorEvent, attempts: u32) -> BusResult<()> {
        warn!(
            category = %event.category,
            attempts,
            agent = %event.source_agent,
            "recovery exhausted, escalating to coordinator"
        );
        let protocol = protocol_for(event.category);
        self.store
            .send(
                &self.reporter,
                &self.coordinator,
                MessageType::Escalation,
                json!({
                    "reason": "recovery_exhausted",
                    "category": event.category.as_str(),
                    "severity": protocol.severity,
                    "attempts": attempts,
                    "agent": event.source_agent,
                    "detail": event.detail,
                }),
                event.context_id.clone(),
            )
            .await?;
        Ok(())
    }
}
