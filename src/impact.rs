//! Impact quantification
//!
//! Assigns each qualifying message a heuristic monetary/efficiency score:
//! per-type base value, scaled by the shared classifier's category
//! multiplier and a keyword-derived urgency multiplier. Rolling-window
//! aggregation produces per-category and per-agent breakdowns plus a
//! naive daily-to-annual projection against the configured revenue
//! target. Reporting signal only; nothing here touches a ledger.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::classify::{Classifier, TaskCategory};
use crate::config::ImpactSection;
use crate::protocol::{Message, MessageType};

/// Base value per qualifying message type
fn base_value(message_type: MessageType) -> Option<f64> {
    match message_type {
        MessageType::Completion => Some(500.0),
        MessageType::ImpactReport => Some(300.0),
        MessageType::StrategicQuery => Some(250.0),
        MessageType::Delegation => Some(200.0),
        MessageType::KnowledgeShare => Some(150.0),
        MessageType::Blocker => Some(100.0),
        _ => None,
    }
}

/// Category multiplier applied on top of the base value
fn category_multiplier(category: TaskCategory) -> f64 {
    match category {
        TaskCategory::EmergencyResponse => 3.0,
        TaskCategory::RevenueAnalytics => 2.5,
        TaskCategory::ComplianceAudit => 2.0,
        TaskCategory::CustomerExperience => 1.8,
        TaskCategory::DataPipeline => 1.5,
        TaskCategory::Infrastructure => 1.2,
        TaskCategory::Coordination => 1.0,
        TaskCategory::General => 0.8,
    }
}

const URGENT_KEYWORDS: &[&str] = &["urgent", "immediate", "critical", "emergency"];
const PRIORITY_KEYWORDS: &[&str] = &["important", "priority", "deadline"];

fn urgency_multiplier(text: &str) -> f64 {
    let lower = text.to_lowercase();
    if URGENT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        1.5
    } else if PRIORITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        1.2
    } else {
        1.0
    }
}

/// Aggregated impact figures over one window
#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub total: f64,
    pub by_category: HashMap<TaskCategory, f64>,
    pub by_agent: HashMap<String, f64>,
    pub messages_scored: usize,
    /// Window span the totals were observed over, in days
    pub span_days: f64,
    pub daily_rate: f64,
    pub monthly_projection: f64,
    pub annual_projection: f64,
    pub annual_revenue_target: f64,
    /// Annual projection as a fraction of the target
    pub target_attainment: f64,
    /// Simplified return figure under the fixed cost ratio
    pub roi: f64,
}

/// Heuristic impact scorer over the message stream
pub struct ImpactQuantifier {
    classifier: Classifier,
    config: ImpactSection,
}

impl ImpactQuantifier {
    pub fn new(classifier: Classifier, config: ImpactSection) -> Self {
        Self { classifier, config }
    }

    /// Score one message; None for non-qualifying types
    pub fn score(&self, message: &Message) -> Option<f64> {
        let base = base_value(message.message_type)?;
        let text = message.payload_text();
        let category = self.classifier.classify(&text);
        Some(base * category_multiplier(category) * urgency_multiplier(&text))
    }

    /// Aggregate a window into breakdowns and projections
    pub fn report(&self, window: &[Message], now: DateTime<Utc>) -> ImpactReport {
        let mut total = 0.0;
        let mut by_category: HashMap<TaskCategory, f64> = HashMap::new();
        let mut by_agent: HashMap<String, f64> = HashMap::new();
        let mut messages_scored = 0;

        for message in window {
            let Some(value) = self.score(message) else {
                continue;
            };
            messages_scored += 1;
            total += value;

            let category = self.classifier.classify(&message.payload_text());
            *by_category.entry(category).or_default() += value;

            // Credit the agent doing the work: completions to their
            // sender, delegations to their assignee
            let agent = match message.message_type {
                MessageType::Delegation => message.recipient.clone(),
                _ => message.sender.clone(),
            };
            *by_agent.entry(agent).or_default() += value;
        }

        // Span floor of one hour keeps tiny windows from exploding the
        // projection
        let span_days = window
            .iter()
            .map(|m| m.created_at)
            .min()
            .map(|oldest| (now - oldest).num_seconds() as f64 / 86_400.0)
            .unwrap_or(0.0)
            .max(1.0 / 24.0);

        let daily_rate = total / span_days;
        let monthly_projection = daily_rate * 30.0;
        let annual_projection = daily_rate * 365.0;

        let cost = annual_projection * self.config.cost_ratio;
        let roi = if cost > 0.0 {
            (annual_projection - cost) / cost
        } else {
            0.0
        };

        ImpactReport {
            total,
            by_category,
            by_agent,
            messages_scored,
            span_days,
            daily_rate,
            monthly_projection,
            annual_projection,
            annual_revenue_target: self.config.annual_revenue_target,
            target_attainment: if self.config.annual_revenue_target > 0.0 {
                annual_projection / self.config.annual_revenue_target
            } else {
                0.0
            },
            roi,
        }
    }
}
