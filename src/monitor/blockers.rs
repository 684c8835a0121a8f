//! Blocker pattern detection
//!
//! Six named patterns, each with its own window and severity, evaluated
//! against the trailing message stream. Detection is best-effort: a
//! pattern that fails internally is logged and skipped so one bad scan
//! never takes the monitor down.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use crate::classify::{Classifier, TaskCategory};
use crate::config::MonitorSection;
use crate::error::BusResult;
use crate::protocol::{Message, MessageType, Severity};

static RESOURCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)quota exceeded|limit exceeded|out of memory|disk full|rate limit").unwrap()
});

/// Named blocker patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerPattern {
    CommunicationBreakdown,
    AgentOverload,
    RepeatedFailures,
    EscalationLoop,
    ResourceExhaustion,
    EmergencyDegradation,
}

impl BlockerPattern {
    pub fn severity(&self) -> Severity {
        match self {
            BlockerPattern::CommunicationBreakdown => Severity::High,
            BlockerPattern::AgentOverload => Severity::High,
            BlockerPattern::RepeatedFailures => Severity::High,
            BlockerPattern::EscalationLoop => Severity::Medium,
            BlockerPattern::ResourceExhaustion => Severity::Critical,
            BlockerPattern::EmergencyDegradation => Severity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockerPattern::CommunicationBreakdown => "communication_breakdown",
            BlockerPattern::AgentOverload => "agent_overload",
            BlockerPattern::RepeatedFailures => "repeated_failures",
            BlockerPattern::EscalationLoop => "escalation_loop",
            BlockerPattern::ResourceExhaustion => "resource_exhaustion",
            BlockerPattern::EmergencyDegradation => "emergency_degradation",
        }
    }
}

impl std::fmt::Display for BlockerPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One detected blocker with its evidence trail
#[derive(Debug, Clone, Serialize)]
pub struct BlockerAlert {
    pub pattern: BlockerPattern,
    pub severity: Severity,
    /// Agent at the center of the pattern, when one exists
    pub agent: Option<String>,
    pub detail: String,
    /// Ids of the messages that matched
    pub evidence: Vec<Uuid>,
}

/// Pattern-matching detector over the trailing window
pub struct BlockerDetector {
    config: MonitorSection,
    classifier: Classifier,
}

impl BlockerDetector {
    pub fn new(config: MonitorSection, classifier: Classifier) -> Self {
        Self { config, classifier }
    }

    /// Evaluate every pattern against the window
    ///
    /// Patterns that error internally are logged and skipped.
    pub fn scan(&self, window: &[Message], now: DateTime<Utc>) -> Vec<BlockerAlert> {
        let mut alerts = Vec::new();

        let patterns: [(&str, BusResult<Vec<BlockerAlert>>); 6] = [
            ("communication_breakdown", self.communication_breakdown(window, now)),
            ("agent_overload", self.agent_overload(window)),
            ("repeated_failures", self.repeated_failures(window)),
            ("escalation_loop", self.escalation_loop(window)),
            ("resource_exhaustion", self.resource_exhaustion(window)),
            ("emergency_degradation", self.emergency_degradation(window, now)),
        ];

        for (name, result) in patterns {
            match result {
                Ok(mut found) => alerts.append(&mut found),
                Err(e) => warn!(pattern = name, error = %e, "blocker pattern failed, skipping"),
            }
        }

        alerts
    }

    /// Delegations past the breakdown window with no acceptance from the
    /// named recipient
    fn communication_breakdown(
        &self,
        window: &[Message],
        now: DateTime<Utc>,
    ) -> BusResult<Vec<BlockerAlert>> {
        let stale_before = now - Duration::minutes(self.config.communication_breakdown_minutes);
        let mut alerts = Vec::new();

        for delegation in window
            .iter()
            .filter(|m| m.message_type == MessageType::Delegation && m.created_at < stale_before)
        {
            let accepted = window.iter().any(|m| {
                m.message_type == MessageType::Acceptance
                    && m.sender == delegation.recipient
                    && match (&m.context_id, &delegation.context_id) {
                        (Some(a), Some(b)) => a == b,
                        _ => m.created_at > delegation.created_at,
                    }
            });

            if !accepted {
                alerts.push(BlockerAlert {
                    pattern: BlockerPattern::CommunicationBreakdown,
                    severity: BlockerPattern::CommunicationBreakdown.severity(),
                    agent: Some(delegation.recipient.clone()),
                    detail: format!(
                        "delegation to {} unaccepted for over {} minutes",
                        delegation.recipient, self.config.communication_breakdown_minutes
                    ),
                    evidence: vec![delegation.id],
                });
            }
        }

        Ok(alerts)
    }

    /// Assignment rate exceeding completion rate beyond the configured
    /// ratio
    fn agent_overload(&self, window: &[Message]) -> BusResult<Vec<BlockerAlert>> {
        let mut assigned: HashMap<&str, Vec<Uuid>> = HashMap::new();
        let mut completed: HashMap<&str, usize> = HashMap::new();

        for m in window {
            match m.message_type {
                MessageType::Delegation => {
                    assigned.entry(m.recipient.as_str()).or_default().push(m.id)
                }
                MessageType::Completion => {
                    *completed.entry(m.sender.as_str()).or_default() += 1
                }
                _ => {}
            }
        }

        let mut agents: Vec<&&str> = assigned.keys().collect();
        agents.sort();

        let mut alerts = Vec::new();
        for agent in agents {
            let assignments = &assigned[*agent];
            let completions = completed.get(*agent).copied().unwrap_or(0);
            let ratio = assignments.len() as f64 / completions.max(1) as f64;

            if assignments.len() >= 2 && ratio >= self.config.overload_ratio {
                alerts.push(BlockerAlert {
                    pattern: BlockerPattern::AgentOverload,
                    severity: BlockerPattern::AgentOverload.severity(),
                    agent: Some((*agent).to_string()),
                    detail: format!(
                        "{agent} assigned {} tasks against {completions} completions",
                        assignments.len()
                    ),
                    evidence: assignments.clone(),
                });
            }
        }

        Ok(alerts)
    }

    /// Threshold-or-more failures sharing one inferred task category
    fn repeated_failures(&self, window: &[Message]) -> BusResult<Vec<BlockerAlert>> {
        let mut by_category: HashMap<TaskCategory, Vec<Uuid>> = HashMap::new();

        for m in window.iter().filter(|m| m.message_type.is_failure()) {
            let category = self.classifier.classify(&m.payload_text());
            by_category.entry(category).or_default().push(m.id);
        }

        let mut alerts = Vec::new();
        for category in TaskCategory::all() {
            let Some(ids) = by_category.get(category) else {
                continue;
            };
            if ids.len() >= self.config.repeated_failure_threshold {
                alerts.push(BlockerAlert {
                    pattern: BlockerPattern::RepeatedFailures,
                    severity: BlockerPattern::RepeatedFailures.severity(),
                    agent: None,
                    detail: format!("{} failures in category {category}", ids.len()),
                    evidence: ids.clone(),
                });
            }
        }

        Ok(alerts)
    }

    /// A context bouncing between agents with no completion
    fn escalation_loop(&self, window: &[Message]) -> BusResult<Vec<BlockerAlert>> {
        let completed: HashSet<&str> = window
            .iter()
            .filter(|m| m.message_type == MessageType::Completion)
            .filter_map(|m| m.context_id.as_deref())
            .collect();

        let mut by_context: HashMap<&str, Vec<&Message>> = HashMap::new();
        for m in window.iter().filter(|m| m.message_type == MessageType::Delegation) {
            if let Some(ctx) = m.context_id.as_deref() {
                by_context.entry(ctx).or_default().push(m);
            }
        }

        let mut contexts: Vec<&&str> = by_context.keys().collect();
        contexts.sort();

        let mut alerts = Vec::new();
        for ctx in contexts {
            let delegations = &by_context[*ctx];
            if completed.contains(*ctx) || delegations.len() < 3 {
                continue;
            }
            let recipients: HashSet<&str> =
                delegations.iter().map(|m| m.recipient.as_str()).collect();
            if recipients.len() >= 2 {
                alerts.push(BlockerAlert {
                    pattern: BlockerPattern::EscalationLoop,
                    severity: BlockerPattern::EscalationLoop.severity(),
                    agent: None,
                    detail: format!(
                        "context {ctx} bounced across {} agents without completion",
                        recipients.len()
                    ),
                    evidence: delegations.iter().map(|m| m.id).collect(),
                });
            }
        }

        Ok(alerts)
    }

    /// Explicit quota/limit-exceeded signals anywhere in the window
    fn resource_exhaustion(&self, window: &[Message]) -> BusResult<Vec<BlockerAlert>> {
        let evidence: Vec<Uuid> = window
            .iter()
            .filter(|m| RESOURCE_PATTERN.is_match(&m.payload_text()))
            .map(|m| m.id)
            .collect();

        if evidence.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![BlockerAlert {
            pattern: BlockerPattern::ResourceExhaustion,
            severity: BlockerPattern::ResourceExhaustion.severity(),
            agent: None,
            detail: format!("{} resource-limit signals in window", evidence.len()),
            evidence,
        }])
    }

    /// Emergency-tagged tasks whose completion latency approaches the SLA
    /// bound, or which remain open near it
    fn emergency_degradation(
        &self,
        window: &[Message],
        now: DateTime<Utc>,
    ) -> BusResult<Vec<BlockerAlert>> {
        // Latency within 80% of the bound counts as approaching
        let sla = Duration::minutes(self.config.emergency_sla_minutes);
        let warning = Duration::seconds((sla.num_seconds() * 4) / 5);
        let mut alerts = Vec::new();

        for delegation in window.iter().filter(|m| {
            m.message_type == MessageType::Delegation && self.is_emergency(m)
        }) {
            let completion = delegation.context_id.as_deref().and_then(|ctx| {
                window.iter().find(|m| {
                    m.message_type == MessageType::Completion
                        && m.context_id.as_deref() == Some(ctx)
                })
            });

            let (latency, evidence) = match completion {
                Some(c) => (
                    c.created_at - delegation.created_at,
                    vec![delegation.id, c.id],
                ),
                None => (now - delegation.created_at, vec![delegation.id]),
            };

            if latency >= warning {
                alerts.push(BlockerAlert {
                    pattern: BlockerPattern::EmergencyDegradation,
                    severity: BlockerPattern::EmergencyDegradation.severity(),
                    agent: Some(delegation.recipient.clone()),
                    detail: format!(
                        "emergency task latency {}m approaches the {}m bound",
                        latency.num_minutes(),
                        self.config.emergency_sla_minutes
                    ),
                    evidence,
                });
            }
        }

        Ok(alerts)
    }

    fn is_emergency(&self, message: &Message) -> bool {
        if message
            .payload
            .get("urgency")
            .and_then(|v| v.as_str())
            .is_some_and(|u| u.eq_ignore_ascii_case("critical"))
        {
            return true;
        }
        self.classifier.classify(&message.payload_text()) == TaskCategory::EmergencyResponse
    }
}
