//! Heuristic risk prediction
//!
//! A small linear model over three normalized factors: response-rate
//! trend, backlog ratio, and latency trend. The output is a triage
//! probability in [0, 1], not a calibrated forecast. Crossing the
//! configured threshold emits a predictive alert with suggested
//! preventive actions and a rough time-to-occurrence.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::MonitorSection;
use crate::protocol::{Message, MessageStatus, MessageType};
use crate::store::MessageStore;

/// Fixed factor weights; they must sum to 1
const WEIGHT_RESPONSE_RATE: f64 = 0.40;
const WEIGHT_BACKLOG: f64 = 0.35;
const WEIGHT_LATENCY: f64 = 0.25;

/// One risk evaluation over a window
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    /// Stall probability in [0, 1]
    pub probability: f64,
    pub response_rate_factor: f64,
    pub backlog_factor: f64,
    pub latency_factor: f64,
    pub suggested_actions: Vec<String>,
    /// Rough estimate until the predicted stall materializes
    pub estimated_minutes_to_occurrence: i64,
}

/// Linear risk scorer over the trailing window
pub struct RiskPredictor {
    config: MonitorSection,
}

impl RiskPredictor {
    pub fn new(config: MonitorSection) -> Self {
        Self { config }
    }

    /// Evaluate the window; None when it holds no messages
    pub fn predict(&self, window: &[Message], now: DateTime<Utc>) -> Option<RiskAssessment> {
        if window.is_empty() {
            return None;
        }

        let delegations = window
            .iter()
            .filter(|m| m.message_type == MessageType::Delegation)
            .count();
        let acceptances = window
            .iter()
            .filter(|m| m.message_type == MessageType::Acceptance)
            .count();

        // Unanswered delegations drive the response factor up
        let response_rate_factor = if delegations == 0 {
            0.0
        } else {
            (1.0 - acceptances as f64 / delegations as f64).clamp(0.0, 1.0)
        };

        let unsettled = window
            .iter()
            .filter(|m| m.status == MessageStatus::Sent)
            .count();
        let backlog_factor = unsettled as f64 / window.len() as f64;

        // Mean age of unsettled messages, normalized by the window span
        let window_minutes = self.config.window_minutes.max(1);
        let latency_factor = if unsettled == 0 {
            0.0
        } else {
            let total_minutes: i64 = window
                .iter()
                .filter(|m| m.status == MessageStatus::Sent)
                .map(|m| (now - m.created_at).num_minutes().max(0))
                .sum();
            let mean = total_minutes as f64 / unsettled as f64;
            (mean / window_minutes as f64).clamp(0.0, 1.0)
        };

        let probability = (WEIGHT_RESPONSE_RATE * response_rate_factor
            + WEIGHT_BACKLOG * backlog_factor
            + WEIGHT_LATENCY * latency_factor)
            .clamp(0.0, 1.0);

        let estimated_minutes_to_occurrence =
            ((1.0 - probability) * window_minutes as f64).round() as i64;

        debug!(
            probability,
            response_rate_factor, backlog_factor, latency_factor, "risk evaluated"
        );

        Some(RiskAssessment {
            probability,
            response_rate_factor,
            backlog_factor,
            latency_factor,
            suggested_actions: self.suggest(
                response_rate_factor,
                backlog_factor,
                latency_factor,
            ),
            estimated_minutes_to_occurrence,
        })
    }

    /// Evaluate and, above the threshold, send a predictive alert to the
    /// coordinator
    ///
    /// Never propagates internal errors; prediction is best-effort.
    pub async fn predict_and_alert<S: MessageStore>(
        &self,
        window: &[Message],
        now: DateTime<Utc>,
        store: &S,
        reporter: &str,
        coordinator: &str,
    ) -> Option<RiskAssessment> {
        let assessment = self.predict(window, now)?;
        if assessment.probability < self.config.risk_threshold {
            return Some(assessment);
        }

        info!(
            probability = assessment.probability,
            "risk above threshold, emitting predictive alert"
        );
        let result = store
            .send(
                reporter,
                coordinator,
                MessageType::PredictiveAlert,
                json!({
                    "probability": assessment.probability,
                    "factors": {
                        "response_rate": assessment.response_rate_factor,
                        "backlog": assessment.backlog_factor,
                        "latency": assessment.latency_factor,
                    },
                    "suggested_actions": assessment.suggested_actions,
                    "estimated_minutes_to_occurrence":
                        assessment.estimated_minutes_to_occurrence,
                }),
                None,
            )
            .await;

        if let Err(e) = result {
            warn!(error = %e, "failed to emit predictive alert");
        }
        Some(assessment)
    }

    fn suggest(&self, response: f64, backlog: f64, latency: f64) -> Vec<String> {
        let mut actions = Vec::new();
        if response >= backlog && response >= latency {
            actions.push("ping unresponsive assignees and confirm delegation receipt".to_string());
        }
        if backlog >= 0.5 {
            actions.push("rebalance open delegations across available agents".to_string());
        }
        if latency >= 0.5 {
            actions.push("raise poll frequency or clear stalled consumers".to_string());
        }
        if actions.is_empty() {
            actions.push("monitor; no single factor dominates yet".to_string());
        }
        actions
    }

    /// Window span the predictor was configured with
    pub fn window(&self) -> Duration {
        Duration::minutes(self.config.window_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{AgentDirectory, AgentProfile};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn predictor() -> RiskPredictor {
        RiskPredictor::new(MonitorSection::default())
    }

    fn aged(mut m: Message, minutes: i64) -> Message {
        m.created_at = Utc::now() - Duration::minutes(minutes);
        m.updated_at = m.created_at;
        m
    }

    #[test]
    fn test_empty_window_has_no_assessment() {
        assert!(predictor().predict(&[], Utc::now()).is_none());
    }

    #[test]
    fn test_unanswered_delegations_raise_risk() {
        let mut window = Vec::new();
        for i in 0..4 {
            window.push(aged(
                Message::new(
                    "dispatcher",
                    "analyst",
                    MessageType::Delegation,
                    json!({"task": format!("job {i}")}),
                    None,
                ),
                55,
            ));
        }

        let assessment = predictor().predict(&window, Utc::now()).unwrap();
        // No acceptances, full backlog, old messages: every factor maxed
        assert!(assessment.response_rate_factor > 0.99);
        assert!(assessment.backlog_factor > 0.99);
        assert!(assessment.latency_factor > 0.8);
        assert!(assessment.probability > 0.9);
    }

    #[test]
    fn test_settled_stream_scores_low() {
        let mut window = Vec::new();
        for i in 0..4 {
            let mut delegation = Message::new(
                "dispatcher",
                "analyst",
                MessageType::Delegation,
                json!({"task": format!("job {i}")}),
                None,
            );
            delegation.status = MessageStatus::Acknowledged;
            window.push(aged(delegation, 10));

            let mut acceptance = Message::new(
                "analyst",
                "dispatcher",
                MessageType::Acceptance,
                json!({"accepted": true}),
                None,
            );
            acceptance.status = MessageStatus::Acknowledged;
            window.push(aged(acceptance, 9));
        }

        let assessment = predictor().predict(&window, Utc::now()).unwrap();
        assert!(assessment.probability < 0.1);
        assert!(assessment.estimated_minutes_to_occurrence > 50);
    }

    #[tokio::test]
    async fn test_alert_emitted_above_threshold() {
        let directory = AgentDirectory::new(
            vec![AgentProfile::new("monitor"), AgentProfile::new("coordinator")],
            "coordinator".to_string(),
        );
        let store = MemoryStore::new(directory);

        let window = vec![aged(
            Message::new(
                "dispatcher",
                "analyst",
                MessageType::Delegation,
                json!({"task": "stalled job"}),
                None,
            ),
            59,
        )];

        predictor()
            .predict_and_alert(&window, Utc::now(), &store, "monitor", "coordinator")
            .await
            .unwrap();

        let alerts = store
            .receive("coordinator", None, 10, Some(&[MessageType::PredictiveAlert]))
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].payload["probability"].as_f64().unwrap() >= 0.7);
        assert!(alerts[0].payload["suggested_actions"].is_array());
    }

    #[tokio::test]
    async fn test_no_alert_below_threshold() {
        let directory = AgentDirectory::new(
            vec![AgentProfile::new("monitor"), AgentProfile::new("coordinator")],
            "coordinator".to_string(),
        );
        let store = MemoryStore::new(directory);

        let mut settled = Message::new(
            "dispatcher",
            "analyst",
            MessageType::Progress,
            json!({"note": "all good"}),
            None,
        );
        settled.status = MessageStatus::Acknowledged;

        predictor()
            .predict_and_alert(&[settled], Utc::now(), &store, "monitor", "coordinator")
            .await
            .unwrap();

        let alerts = store
            .receive("coordinator", None, 10, Some(&[MessageType::PredictiveAlert]))
            .await
            .unwrap();
        assert!(alerts.is_empty());
    }
}
