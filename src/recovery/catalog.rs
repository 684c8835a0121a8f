//! Recovery protocol catalog
//!
//! Static mapping from error category to severity, attempt budget,
//! backoff schedule, and ordered recovery steps. The emergency protocol
//! deliberately has no steps and a single attempt: SLA violations skip
//! retries and escalate on first detection.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::Severity;

/// Error categories recognized by the recovery engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    CommunicationFailure,
    TaskExecutionFailure,
    StoreConnectionFailure,
    EmergencyResponseFailure,
    ModelAccuracyDegradation,
    ResourceExhaustion,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::CommunicationFailure => "communication_failure",
            ErrorCategory::TaskExecutionFailure => "task_execution_failure",
            ErrorCategory::StoreConnectionFailure => "store_connection_failure",
            ErrorCategory::EmergencyResponseFailure => "emergency_response_failure",
            ErrorCategory::ModelAccuracyDegradation => "model_accuracy_degradation",
            ErrorCategory::ResourceExhaustion => "resource_exhaustion",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One executable recovery step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Corrective notice to the agent involved in the failure
    NotifyAgent,
    /// Liveness probe message to the agent
    PingAgent,
    /// Ask the coordinator to reassign the affected task
    RequestReassignment,
    /// Probe the store; resolves the event if the store answers healthy
    VerifyStoreHealth,
    /// Tell the sender to slow its intake
    ThrottleIntake,
    /// Ask the coordinator to rebalance the agent's backlog
    FlushBacklog,
    /// Tell the agent to recalibrate its model
    RecalibrateModel,
    /// Tell the agent to switch to its fallback heuristics
    FallbackHeuristics,
}

impl RecoveryStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStep::NotifyAgent => "notify_agent",
            RecoveryStep::PingAgent => "ping_agent",
            RecoveryStep::RequestReassignment => "request_reassignment",
            RecoveryStep::VerifyStoreHealth => "verify_store_health",
            RecoveryStep::ThrottleIntake => "throttle_intake",
            RecoveryStep::FlushBacklog => "flush_backlog",
            RecoveryStep::RecalibrateModel => "recalibrate_model",
            RecoveryStep::FallbackHeuristics => "fallback_heuristics",
        }
    }
}

/// Retry/backoff/escalation protocol for one error category
#[derive(Debug, Clone)]
pub struct RecoveryProtocol {
    pub severity: Severity,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub steps: &'static [RecoveryStep],
}

impl RecoveryProtocol {
    /// Delay before the step at `index`, growing geometrically
    pub fn delay_before_step(&self, index: usize) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi(index as i32 - 1);
        self.base_delay.mul_f64(factor)
    }
}

/// Look up the protocol for an error category
pub fn protocol_for(category: ErrorCategory) -> RecoveryProtocol {
    match category {
        ErrorCategory::CommunicationFailure => RecoveryProtocol {
            severity: Severity::High,
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            steps: &[
                RecoveryStep::NotifyAgent,
                RecoveryStep::PingAgent,
                RecoveryStep::RequestReassignment,
            ],
        },
        ErrorCategory::TaskExecutionFailure => RecoveryProtocol {
            severity: Severity::Medium,
            max_attempts: 3,
            base_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            steps: &[RecoveryStep::NotifyAgent, RecoveryStep::RequestReassignment],
        },
        ErrorCategory::StoreConnectionFailure => RecoveryProtocol {
            severity: Severity::Critical,
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            steps: &[RecoveryStep::VerifyStoreHealth],
        },
        // No retry budget: SLA violations escalate on first detection
        ErrorCategory::EmergencyResponseFailure => RecoveryProtocol {
            severity: Severity::Critical,
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            steps: &[],
        },
        ErrorCategory::ModelAccuracyDegradation => RecoveryProtocol {
            severity: Severity::Medium,
            max_attempts: 2,
            base_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            steps: &[
                RecoveryStep::RecalibrateModel,
                RecoveryStep::FallbackHeuristics,
            ],
        },
        ErrorCategory::ResourceExhaustion => RecoveryProtocol {
            severity: Severity::High,
            max_attempts: 3,
            base_delay: Duration::from_secs(15),
            backoff_multiplier: 2.0,
            steps: &[RecoveryStep::ThrottleIntake, RecoveryStep::FlushBacklog],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_protocol_has_no_retry_budget() {
        let protocol = protocol_for(ErrorCategory::EmergencyResponseFailure);
        assert_eq!(protocol.max_attempts, 1);
        assert_eq!(protocol.base_delay, Duration::ZERO);
        assert!(protocol.steps.is_empty());
        assert_eq!(protocol.severity, Severity::Critical);
    }

    #[test]
    fn test_backoff_grows_geometrically() {
        let protocol = protocol_for(ErrorCategory::CommunicationFailure);
        assert_eq!(protocol.delay_before_step(0), Duration::ZERO);
        assert_eq!(protocol.delay_before_step(1), Duration::from_secs(5));
        assert_eq!(protocol.delay_before_step(2), Duration::from_secs(10));
    }

    #[test]
    fn test_every_category_has_a_protocol() {
        for category in [
            ErrorCategory::CommunicationFailure,
            ErrorCategory::TaskExecutionFailure,
            ErrorCategory::StoreConnectionFailure,
            ErrorCategory::EmergencyResponseFailure,
            ErrorCategory::ModelAccuracyDegradation,
            ErrorCategory::ResourceExhaustion,
        ] {
            let protocol = protocol_for(category);
            assert!(protocol.max_attempts >= 1, "{category} has no attempts");
        }
    }
}
