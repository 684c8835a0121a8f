//! Consumer and recovery engine integration tests
//!
//! Exercises the full failure path: a consumer handler fails, the
//! failure crosses the channel into the recovery engine, the engine
//! walks its protocol, and exhaustion escalates to the coordinator.
//! Also pins the no-retry emergency policy and backoff cancellation.


use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

use taskbus::config::ConsumerSection;
use taskbus::consumer::{MessageHandler, PollingConsumer};
use taskbus::error::{BusError, BusResult};
use taskbus::protocol::{Message, MessageType};
use taskbus::recovery::{
    ErrorCategory, ErrorEvent, RecoveryEngine, RecoveryStatus, RecoveryStep,
    RecoveryStepExecutor, StepOutcome, StoreStepExecutor,
};
use taskbus::store::{MemoryStore, MessageStore};

struct TimeoutHandler;

#[async_trait]
impl MessageHandler for TimeoutHandler {
    async fn handle(&self, _message: &Message) -> BusResult<()> {
        Err(BusError::delivery("downstream timeout, no response"))
    }
}

/// Executor that never resolves anything
struct InertExecutor;

#[async_trait]
impl RecoveryStepExecutor for InertExecutor {
    async fn execute(&self, _step: RecoveryStep, _event: &ErrorEvent) -> BusResult<StepOutcome> {
        Ok(StepOutcome::Unresolved)
    }
}

fn engine(
    store: Arc<MemoryStore>,
    executor: Arc<dyn RecoveryStepExecutor>,
) -> (Arc<RecoveryEngine<MemoryStore>>, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let engine = RecoveryEngine::new(
        store,
        executor,
        "coordinator".to_string(),
        "coordinator".to_string(),
        rx,
    );
    (Arc::new(engine), tx)
}

#[tokio::test(start_paused = true)]
async fn test_handler_failure_flows_into_recovery() {
    let store = test_helpers::standard_store();
    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut consumer = PollingConsumer::new(
        "data-steward".to_string(),
        store.clone(),
        &ConsumerSection::default(),
        shutdown_rx,
    )
    .with_failure_sink(failure_tx);
    consumer.register_handler(MessageType::Delegation, Box::new(TimeoutHandler));

    store
        .send(
            "coordinator",
            "data-steward",
            MessageType::Delegation,
            json!({"task": "ingest"}),
            Some("ctx-flow".to_string()),
        )
        .await
        .unwrap();

    consumer.poll_once().await.unwrap();

    // The failure crossed the channel and classifies as communication
    let failure = failure_rx.recv().await.unwrap();
    let event = ErrorEvent::from_handler_failure(&failure);
    assert_eq!(event.category, ErrorCategory::CommunicationFailure);

    // Drive the full protocol to exhaustion
    let (engine, _cancel) = engine(store.clone(), Arc::new(InertExecutor));
    for _ in 0..2 {
        assert_eq!(
            engine.execute(&event).await.unwrap(),
            RecoveryStatus::Pending
        );
    }
    assert_eq!(
        engine.execute(&event).await.unwrap(),
        RecoveryStatus::Exhausted
    );

    let escalations = store
        .receive("coordinator", None, 10, Some(&[MessageType::Escalation]))
        .await
        .unwrap();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].payload["reason"], "recovery_exhausted");

    drop(shutdown_tx);
}

#[tokio::test(start_paused = true)]
async fn test_emergency_sla_violation_escalates_without_retry() {
    let store = test_helpers::standard_store();
    let (engine, _cancel) = engine(store.clone(), Arc::new(InertExecutor));

    // Detection over the stream classifies the failure as emergency
    store
        .send(
            "incident-commander",
            "coordinator",
            MessageType::Error,
            json!({"detail": "emergency response sla missed for outage triage"}),
            Some("ctx-sla".to_string()),
        )
        .await
        .unwrap();

    let window = store
        .window(chrono::Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();
    let events = engine.detect(&window);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].category, ErrorCategory::EmergencyResponseFailure);

    // First execution escalates immediately: zero delay, zero retries
    let started = tokio::time::Instant::now();
    let status = engine.execute(&events[0]).await.unwrap();
    assert_eq!(status, RecoveryStatus::Exhausted);
    assert_eq!(started.elapsed(), Duration::ZERO);

    let escalations = store
        .receive("coordinator", None, 10, Some(&[MessageType::Escalation]))
        .await
        .unwrap();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].payload["attempts"], 1);
    assert_eq!(
        escalations[0].payload["category"],
        "emergency_response_failure"
    );
}

#[tokio::test]
async fn test_backoff_chain_is_cancellable() {
    let store = test_helpers::standard_store();
    let (engine, cancel) = engine(store, Arc::new(InertExecutor));

    let event = ErrorEvent {
        category: ErrorCategory::CommunicationFailure,
        source_agent: "data-steward".to_string(),
        message_id: None,
        context_id: Some("ctx-cancel".to_string()),
        detail: "timeout".to_string(),
    };

    let handle = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute(&event).await })
    };

    // The first backoff in the protocol is five seconds; cancel inside it
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.send(true).unwrap();

    let status = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("cancelled recovery must return promptly")
        .unwrap()
        .unwrap();
    assert_eq!(status, RecoveryStatus::Attempted);
}

#[tokio::test(start_paused = true)]
async fn test_production_executor_emits_corrective_messages() {
    let store = test_helpers::standard_store();
    let executor = Arc::new(StoreStepExecutor::new(
        store.clone(),
        "coordinator".to_string(),
        "coordinator".to_string(),
    ));
    let (engine, _cancel) = engine(store.clone(), executor);

    let event = ErrorEvent {
        category: ErrorCategory::CommunicationFailure,
        source_agent: "data-steward".to_string(),
        message_id: None,
        context_id: Some("ctx-steps".to_string()),
        detail: "recipient unreachable".to_string(),
    };

    engine.execute(&event).await.unwrap();

    // NotifyAgent and PingAgent both target the failing agent
    let nudges = store
        .receive("data-steward", None, 10, Some(&[MessageType::InfoRequest]))
        .await
        .unwrap();
    assert_eq!(nudges.len(), 2);

    // RequestReassignment targets the coordinator
    let reassignments = store
        .receive("coordinator", None, 10, Some(&[MessageType::InfoRequest]))
        .await
        .unwrap();
    assert_eq!(reassignments.len(), 1);
    assert_eq!(reassignments[0].payload["action"], "reassign_task");
}

#[tokio::test]
async fn test_consumer_shuts_down_cleanly() {
    let store = test_helpers::standard_store();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumer = PollingConsumer::new(
        "data-steward".to_string(),
        store,
        &ConsumerSection::default(),
        shutdown_rx,
    );

    let handle = tokio::spawn(async move { consumer.run().await });
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("consumer must exit on shutdown signal")
        .unwrap();
}
