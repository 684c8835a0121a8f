//! Specialization violation checking
//!
//! Given an already-accepted task and the assignee's profile, flags
//! assignments outside the declared capability set. Forbidden-capability
//! hits are high severity and escalate to the coordinator; plain
//! mismatches get a corrective notice only.

use serde_json::json;
use tracing::{info, warn};

use crate::directory::AgentDirectory;
use crate::error::{BusError, BusResult};
use crate::protocol::{MessageType, Severity};
use crate::store::MessageStore;

/// Kind of specialization violation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A required capability is explicitly forbidden for the assignee
    ForbiddenCapability,
    /// No required capability appears in primary or secondary
    CapabilityMismatch,
}

impl ViolationKind {
    pub fn severity(&self) -> Severity {
        match self {
            ViolationKind::ForbiddenCapability => Severity::High,
            ViolationKind::CapabilityMismatch => Severity::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::ForbiddenCapability => "FORBIDDEN_CAPABILITY",
            ViolationKind::CapabilityMismatch => "CAPABILITY_MISMATCH",
        }
    }
}

/// A detected violation, with the capabilities that triggered it
#[derive(Debug, Clone)]
pub struct ViolationReport {
    pub kind: ViolationKind,
    pub agent: String,
    pub capabilities: Vec<String>,
}

/// Checks accepted assignments against the assignee's profile
pub struct ViolationChecker<S: MessageStore> {
    directory: AgentDirectory,
    store: std::sync::Arc<S>,
    /// Identity corrective notices and escalations are sent as
    reporter: String,
}

impl<S: MessageStore> ViolationChecker<S> {
    pub fn new(directory: AgentDirectory, store: std::sync::Arc<S>, reporter: String) -> Self {
        Self {
            directory,
            store,
            reporter,
        }
    }

    /// Inspect an assignment without side effects
    pub fn inspect(
        &self,
        required_capabilities: &[String],
        assignee: &str,
    ) -> BusResult<Option<ViolationReport>> {
        let profile = self.directory.get(assignee).ok_or_else(|| {
            BusError::validation(format!("assignee '{assignee}' is not a registered agent"))
        })?;

        let forbidden: Vec<String> = required_capabilities
            .iter()
            .filter(|c| profile.is_forbidden(c))
            .cloned()
            .collect();
        if !forbidden.is_empty() {
            return Ok(Some(ViolationReport {
                kind: ViolationKind::ForbiddenCapability,
                agent: assignee.to_string(),
                capabilities: forbidden,
            }));
        }

        let any_declared = required_capabilities.iter().any(|c| profile.can_handle(c));
        if !any_declared && !required_capabilities.is_empty() {
            return Ok(Some(ViolationReport {
                kind: ViolationKind::CapabilityMismatch,
                agent: assignee.to_string(),
                capabilities: required_capabilities.to_vec(),
            }));
        }

        Ok(None)
    }

    /// Inspect an assignment and emit the corrective and escalation
    /// messages a violation calls for
    pub async fn check_and_report(
        &self,
        required_capabilities: &[String],
        assignee: &str,
        context_id: Option<String>,
    ) -> BusResult<Option<ViolationReport>> {
        let Some(report) = self.inspect(required_capabilities, assignee)? else {
            return Ok(None);
        };

        warn!(
            agent = %report.agent,
            kind = report.kind.as_str(),
            capabilities = ?report.capabilities,
            "specialization violation detected"
        );

        self.store
            .send(
                &self.reporter,
                &report.agent,
                MessageType::ViolationNotice,
                json!({
                    "violation": report.kind.as_str(),
                    "severity": report.kind.severity(),
                    "capabilities": report.capabilities,
                    "detail": format!(
                        "task requires [{}], outside the declared profile of {}",
                        report.capabilities.join(", "),
                        report.agent
                    ),
                }),
                context_id.clone(),
            )
            .await?;

        if report.kind.severity() >= Severity::High {
            let coordinator = self.directory.coordinator().to_string();
            self.store
                .send(
                    &self.reporter,
                    &coordinator,
                    MessageType::Escalation,
                    json!({
                        "reason": "specialization_violation",
                        "severity": report.kind.severity(),
                        "agent": report.agent,
                        "violation": report.kind.as_str(),
                        "capabilities": report.capabilities,
                    }),
                    context_id,
                )
                .await?;
            info!(agent = %report.agent, "violation escalated to coordinator");
        }

        Ok(Some(report))
    }
}
