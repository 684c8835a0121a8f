//! Self-healing error recovery
//!
//! A static catalog maps error categories to retry/backoff/escalation
//! protocols; the engine detects failures in the message stream, walks
//! recovery steps with cancellable backoff between them, and escalates to
//! the coordinator once a protocol is exhausted.

pub mod catalog;
pub mod engine;

pub use catalog::{protocol_for, ErrorCategory, RecoveryProtocol, RecoveryStep};
pub use engine::{
    ErrorEvent, RecoveryEngine, RecoveryRecord, RecoveryStatus, RecoveryStepExecutor,
    StepOutcome, StoreStepExecutor,
};
