//! Composite coordination health scoring
//!
//! Four 0-100 sub-scores folded into a weighted composite. Every
//! sub-score is defined as 100 when its denominator is zero: an empty
//! window is a healthy window.

use chrono::Duration;
use serde::Serialize;

use crate::classify::{Classifier, TaskCategory};
use crate::config::MonitorSection;
use crate::protocol::{Message, MessageType};

const WEIGHT_COMMUNICATION: f64 = 0.30;
const WEIGHT_EXECUTION: f64 = 0.30;
const WEIGHT_STABILITY: f64 = 0.20;
const WEIGHT_EMERGENCY: f64 = 0.20;

/// One health evaluation over a window
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Acceptance rate over delegations
    pub communication: f64,
    /// Completions against failures
    pub execution: f64,
    /// Inverted error-message ratio
    pub stability: f64,
    /// Emergency tasks completed under the SLA bound
    pub emergency_readiness: f64,
    /// Weighted average of the four sub-scores
    pub composite: f64,
}

/// Health scorer over the trailing window
pub struct HealthScorer {
    config: MonitorSection,
    classifier: Classifier,
}

impl HealthScorer {
    pub fn new(config: MonitorSection, classifier: Classifier) -> Self {
        Self { config, classifier }
    }

    pub fn score(&self, window: &[Message]) -> HealthReport {
        let communication = self.communication_health(window);
        let execution = self.execution_health(window);
        let stability = self.stability_health(window);
        let emergency_readiness = self.emergency_readiness(window);

        let composite = WEIGHT_COMMUNICATION * communication
            + WEIGHT_EXECUTION * execution
            + WEIGHT_STABILITY * stability
            + WEIGHT_EMERGENCY * emergency_readiness;

        HealthReport {
            communication,
            execution,
            stability,
            emergency_readiness,
            composite,
        }
    }

    fn communication_health(&self, window: &[Message]) -> f64 {
        let delegations = count(window, MessageType::Delegation);
        if delegations == 0 {
            return 100.0;
        }
        let acceptances = count(window, MessageType::Acceptance);
        ratio_score(acceptances, delegations)
    }

    fn execution_health(&self, window: &[Message]) -> f64 {
        let completions = count(window, MessageType::Completion);
        let failures = window
            .iter()
            .filter(|m| m.message_type.is_failure())
            .count();
        if completions + failures == 0 {
            return 100.0;
        }
        ratio_score(completions, completions + failures)
    }

    fn stability_health(&self, window: &[Message]) -> f64 {
        if window.is_empty() {
            return 100.0;
        }
        let errors = count(window, MessageType::Error);
        100.0 - ratio_score(errors, window.len())
    }

    fn emergency_readiness(&self, window: &[Message]) -> f64 {
        let sla = Duration::minutes(self.config.emergency_sla_minutes);

        let emergencies: Vec<&Message> = window
            .iter()
            .filter(|m| {
                m.message_type == MessageType::Delegation
                    && self.classifier.classify(&m.payload_text())
                        == TaskCategory::EmergencyResponse
            })
            .collect();
        if emergencies.is_empty() {
            return 100.0;
        }

        let under_target = emergencies
            .iter()
            .filter(|delegation| {
                delegation.context_id.as_deref().is_some_and(|ctx| {
                    window.iter().any(|m| {
                        m.message_type == MessageType::Completion
                            && m.context_id.as_deref() == Some(ctx)
                            && m.created_at - delegation.created_at < sla
                    })
                })
            })
            .count();

        ratio_score(under_target, emergencies.len())
    }
}

fn count(window: &[Message], message_type: MessageType) -> usize {
    window
        .iter()
        .filter(|m| m.message_type == message_type)
        .count()
}

fn ratio_score(numerator: usize, denominator: usize) -> f64 {
    ((numerator as f64 / denominator as f64) * 100.0).clamp(0.0, 100.0)
}
