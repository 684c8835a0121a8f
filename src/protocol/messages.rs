//! Message types for agent coordination
//!
//! This module defines the message envelope persisted by the store and the
//! closed enumerations governing its lifecycle. The envelope is immutable
//! after creation except for the acknowledgment fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{BusError, BusResult};

/// Enumerated message types accepted by the bus
///
/// The wire form is snake_case; a payload carrying a type outside this set
/// fails deserialization and is rejected before persistence.
///
/// # Examples
/// ```
/// use taskbus::protocol::MessageType;
///
/// let t: MessageType = serde_json::from_str("\"delegation\"").unwrap();
/// assert_eq!(t, MessageType::Delegation);
/// assert!(serde_json::from_str::<MessageType>("\"carrier_pigeon\"").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Instructs an agent to perform a task
    Delegation,
    /// Assignee confirms it has taken a delegated task
    Acceptance,
    /// Interim status for an in-flight task
    Progress,
    /// Terminal success report for a task
    Completion,
    /// Assignee reports it cannot proceed
    Blocker,
    /// Request for information from another agent
    InfoRequest,
    /// Cross-cutting question routed to a strategist role
    StrategicQuery,
    /// Aggregated impact figures from the quantifier
    ImpactReport,
    /// Failure report feeding the recovery engine
    Error,
    /// Processing receipt events
    Acknowledgment,
    /// Recovery or violation escalation to the coordinator
    Escalation,
    /// Risk predictor output
    PredictiveAlert,
    /// Corrective notice for a specialization violation
    ViolationNotice,
    /// Knowledge item shared through the indexer
    KnowledgeShare,
}

impl MessageType {
    /// Stable wire identifier for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Delegation => "delegation",
            MessageType::Acceptance => "acceptance",
            MessageType::Progress => "progress",
            MessageType::Completion => "completion",
            MessageType::Blocker => "blocker",
            MessageType::InfoRequest => "info_request",
            MessageType::StrategicQuery => "strategic_query",
            MessageType::ImpactReport => "impact_report",
            MessageType::Error => "error",
            MessageType::Acknowledgment => "acknowledgment",
            MessageType::Escalation => "escalation",
            MessageType::PredictiveAlert => "predictive_alert",
            MessageType::ViolationNotice => "violation_notice",
            MessageType::KnowledgeShare => "knowledge_share",
        }
    }

    /// Types the knowledge indexer considers worth mining
    pub fn is_high_value(&self) -> bool {
        matches!(
            self,
            MessageType::Completion
                | MessageType::StrategicQuery
                | MessageType::ImpactReport
                | MessageType::Blocker
                | MessageType::KnowledgeShare
        )
    }

    /// Types that signal a failure to the detector and recovery engine
    pub fn is_failure(&self) -> bool {
        matches!(self, MessageType::Error | MessageType::Blocker)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message lifecycle status
///
/// The only permitted transition is `Sent` → `Acknowledged`; there is no
/// reverse edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Acknowledged,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Acknowledged)
    }
}

/// Severity scale shared by blockers, recovery protocols, and retention
///
/// Ordered so that `Severity::Critical > Severity::Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The persisted message envelope
///
/// Created once on send; immutable except for the acknowledgment fields,
/// which are stamped exactly once by the first `acknowledge` call.
///
/// # Examples
/// ```
/// use taskbus::protocol::{Message, MessageType, MessageStatus};
/// use serde_json::json;
///
/// let msg = Message::new(
///     "dispatcher",
///     "data-steward",
///     MessageType::Delegation,
///     json!({"task_id": 42}),
///     Some("ctx-42".to_string()),
/// );
/// assert_eq!(msg.status, MessageStatus::Sent);
/// assert!(msg.acknowledged_at.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier, immutable
    pub id: Uuid,
    /// Registered sender agent name
    pub sender: String,
    /// Registered recipient agent name
    pub recipient: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Opaque structured payload, non-empty object
    pub payload: Value,
    /// Threads related messages; None for standalone messages
    pub context_id: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a fresh envelope in `Sent` status with store-assigned id and
    /// timestamps
    pub fn new(
        sender: &str,
        recipient: &str,
        message_type: MessageType,
        payload: Value,
        context_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            message_type,
            payload,
            context_id,
            status: MessageStatus::Sent,
            created_at: now,
            updated_at: now,
            acknowledged_by: None,
            acknowledged_at: None,
        }
    }

    /// Severity carried in the payload, if any
    ///
    /// Used by the retention sweep to protect the highest-severity
    /// categories from deletion.
    pub fn payload_severity(&self) -> Option<Severity> {
        self.payload
            .get("severity")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Free-text fields of the payload joined for textual pattern matching
    pub fn payload_text(&self) -> String {
        const TEXT_FIELDS: &[&str] = &["description", "task", "detail", "message", "reason"];
        let mut parts = Vec::new();
        for field in TEXT_FIELDS {
            if let Some(s) = self.payload.get(field).and_then(Value::as_str) {
                parts.push(s);
            }
        }
        parts.join(" ")
    }
}

/// Validate that a payload deserializes to a non-empty JSON object
///
/// Called by the store before persistence; violations are `ValidationError`
/// per the bus taxonomy.
pub fn validate_payload(payload: &Value) -> BusResult<()> {
    match payload.as_object() {
        Some(map) if !map.is_empty() => Ok(()),
        Some(_) => Err(BusError::validation("payload must be a non-empty object")),
        None => Err(BusError::validation(format!(
            "payload must be a JSON object, got {}",
            json_type_name(payload)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_type_wire_form_round_trips() {
        let encoded = serde_json::to_string(&MessageType::InfoRequest).unwrap();
        assert_eq!(encoded, "\"info_request\"");
        let decoded: MessageType = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, MessageType::InfoRequest);
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        let result = serde_json::from_str::<MessageType>("\"teleport\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_status_wire_form_is_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::Acknowledged).unwrap(),
            "\"ACKNOWLEDGED\""
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_new_message_starts_sent() {
        let msg = Message::new(
            "dispatcher",
            "analyst",
            MessageType::Delegation,
            json!({"task": "reconcile reports"}),
            None,
        );
        assert_eq!(msg.status, MessageStatus::Sent);
        assert_eq!(msg.created_at, msg.updated_at);
        assert!(msg.acknowledged_by.is_none());
        assert!(msg.acknowledged_at.is_none());
    }

    #[test]
    fn test_validate_payload_accepts_non_empty_object() {
        assert!(validate_payload(&json!({"task_id": 42})).is_ok());
    }

    #[test]
    fn test_validate_payload_rejects_empty_object() {
        let err = validate_payload(&json!({})).unwrap_err();
        assert!(matches!(err, BusError::Validation { .. }));
    }

    #[test]
    fn test_validate_payload_rejects_non_object() {
        for bad in [json!(null), json!(3), json!("text"), json!([1, 2])] {
            assert!(validate_payload(&bad).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn test_payload_severity_extraction() {
        let msg = Message::new(
            "monitor",
            "coordinator",
            MessageType::Blocker,
            json!({"severity": "critical", "detail": "quota exceeded"}),
            None,
        );
        assert_eq!(msg.payload_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_payload_text_joins_known_fields() {
        let msg = Message::new(
            "dispatcher",
            "analyst",
            MessageType::Delegation,
            json!({"task": "audit trail review", "detail": "quarterly", "count": 3}),
            None,
        );
        let text = msg.payload_text();
        assert!(text.contains("audit trail review"));
        assert!(text.contains("quarterly"));
        assert!(!text.contains('3'));
    }

    #[test]
    fn test_high_value_types() {
        assert!(MessageType::Completion.is_high_value());
        assert!(MessageType::StrategicQuery.is_high_value());
        assert!(!MessageType::Acknowledgment.is_high_value());
    }
}
