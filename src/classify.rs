//! Shared task classification
//!
//! One deterministic classifier serves the router, the knowledge indexer,
//! and the impact quantifier. Classification walks an ordered rule table:
//! the highest-weight matching rule wins, and ties resolve to the rule
//! declared first. No iteration-order dependence anywhere.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::protocol::Severity;

/// Task categories recognized across the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    EmergencyResponse,
    ComplianceAudit,
    DataPipeline,
    CustomerExperience,
    RevenueAnalytics,
    Infrastructure,
    Coordination,
    General,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::EmergencyResponse => "emergency_response",
            TaskCategory::ComplianceAudit => "compliance_audit",
            TaskCategory::DataPipeline => "data_pipeline",
            TaskCategory::CustomerExperience => "customer_experience",
            TaskCategory::RevenueAnalytics => "revenue_analytics",
            TaskCategory::Infrastructure => "infrastructure",
            TaskCategory::Coordination => "coordination",
            TaskCategory::General => "general",
        }
    }

    /// All categories, in rule-table order
    pub fn all() -> &'static [TaskCategory] {
        &[
            TaskCategory::EmergencyResponse,
            TaskCategory::ComplianceAudit,
            TaskCategory::DataPipeline,
            TaskCategory::CustomerExperience,
            TaskCategory::RevenueAnalytics,
            TaskCategory::Infrastructure,
            TaskCategory::Coordination,
            TaskCategory::General,
        ]
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Business impact tier assigned to routed work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessImpact {
    Medium,
    High,
    Critical,
}

impl BusinessImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessImpact::Medium => "medium",
            BusinessImpact::High => "high",
            BusinessImpact::Critical => "critical",
        }
    }

    /// Duration multiplier: higher-impact work gets a wider estimate
    fn duration_factor(&self) -> f64 {
        match self {
            BusinessImpact::Critical => 1.5,
            BusinessImpact::High => 1.25,
            BusinessImpact::Medium => 1.0,
        }
    }
}

impl std::fmt::Display for BusinessImpact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in the ordered classification rule table
struct ClassificationRule {
    category: TaskCategory,
    weight: u32,
    keywords: &'static [&'static str],
}

/// Ordered rule table. Declaration order is the documented tie-break:
/// among equal weights the earliest rule wins.
const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        category: TaskCategory::EmergencyResponse,
        weight: 10,
        keywords: &[
            "emergency",
            "outage",
            "incident",
            "health alert",
            "sla breach",
            "immediate",
        ],
    },
    ClassificationRule {
        category: TaskCategory::ComplianceAudit,
        weight: 8,
        keywords: &["compliance", "audit", "regulatory", "policy", "privacy"],
    },
    ClassificationRule {
        category: TaskCategory::DataPipeline,
        weight: 6,
        keywords: &["data", "pipeline", "etl", "ingest", "database", "migration"],
    },
    ClassificationRule {
        category: TaskCategory::CustomerExperience,
        weight: 6,
        keywords: &["customer", "onboarding", "support ticket", "churn", "complaint"],
    },
    ClassificationRule {
        category: TaskCategory::RevenueAnalytics,
        weight: 5,
        keywords: &["revenue", "billing", "forecast", "analytics", "report", "metrics"],
    },
    ClassificationRule {
        category: TaskCategory::Infrastructure,
        weight: 5,
        keywords: &["deploy", "infrastructure", "server", "scaling", "build"],
    },
    ClassificationRule {
        category: TaskCategory::Coordination,
        weight: 3,
        keywords: &["coordinate", "schedule", "plan", "review", "standup"],
    },
];

/// Keyword to capability-tag mapping, evaluated in order with duplicate
/// tags removed
const CAPABILITY_RULES: &[(&str, &str)] = &[
    ("emergency", "incident-response"),
    ("outage", "incident-response"),
    ("incident", "incident-response"),
    ("health", "incident-response"),
    ("compliance", "compliance-review"),
    ("audit", "compliance-review"),
    ("policy", "compliance-review"),
    ("privacy", "compliance-review"),
    ("data", "data-analysis"),
    ("pipeline", "data-engineering"),
    ("etl", "data-engineering"),
    ("database", "data-engineering"),
    ("migration", "data-engineering"),
    ("customer", "customer-relations"),
    ("onboarding", "customer-relations"),
    ("churn", "customer-relations"),
    ("revenue", "financial-analysis"),
    ("billing", "financial-analysis"),
    ("forecast", "financial-analysis"),
    ("analytics", "data-analysis"),
    ("report", "reporting"),
    ("metrics", "reporting"),
    ("deploy", "infrastructure-ops"),
    ("infrastructure", "infrastructure-ops"),
    ("server", "infrastructure-ops"),
    ("scaling", "infrastructure-ops"),
    ("schedule", "project-coordination"),
    ("coordinate", "project-coordination"),
    ("plan", "project-coordination"),
];

/// Keywords that raise business impact regardless of stated urgency
const CRITICAL_IMPACT_KEYWORDS: &[&str] =
    &["emergency", "outage", "sla", "security", "revenue loss"];
const HIGH_IMPACT_KEYWORDS: &[&str] = &["revenue", "compliance", "customer", "deadline"];

/// Base duration estimates in minutes per category
const BASE_DURATION_MINUTES: &[(TaskCategory, i64)] = &[
    (TaskCategory::EmergencyResponse, 30),
    (TaskCategory::ComplianceAudit, 240),
    (TaskCategory::DataPipeline, 180),
    (TaskCategory::CustomerExperience, 120),
    (TaskCategory::RevenueAnalytics, 150),
    (TaskCategory::Infrastructure, 180),
    (TaskCategory::Coordination, 60),
    (TaskCategory::General, 90),
];

/// Deterministic task classifier shared by router, indexer, and quantifier
///
/// Stateless; construct once and pass by reference wherever classification
/// is needed.
#[derive(Debug, Clone, Default)]
pub struct Classifier;

impl Classifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a task description into exactly one category
    ///
    /// First highest-weight matching rule wins; no match yields `General`.
    pub fn classify(&self, description: &str) -> TaskCategory {
        let text = description.to_lowercase();
        let mut best: Option<&ClassificationRule> = None;

        for rule in CLASSIFICATION_RULES {
            if rule.keywords.iter().any(|kw| text.contains(kw)) {
                // Strictly-greater keeps the earliest rule on equal weight
                if best.map_or(true, |b| rule.weight > b.weight) {
                    best = Some(rule);
                }
            }
        }

        best.map_or(TaskCategory::General, |rule| rule.category)
    }

    /// Derive required capability tags from the description
    pub fn required_capabilities(&self, description: &str) -> Vec<String> {
        let text = description.to_lowercase();
        let mut tags: Vec<String> = Vec::new();

        for (keyword, capability) in CAPABILITY_RULES {
            if text.contains(keyword) && !tags.iter().any(|t| t == capability) {
                tags.push((*capability).to_string());
            }
        }

        if tags.is_empty() {
            tags.push("general-operations".to_string());
        }
        tags
    }

    /// Compute business impact from stated urgency plus high-impact keywords
    pub fn business_impact(&self, urgency: Severity, description: &str) -> BusinessImpact {
        let text = description.to_lowercase();

        if urgency == Severity::Critical
            || CRITICAL_IMPACT_KEYWORDS.iter().any(|kw| text.contains(kw))
        {
            BusinessImpact::Critical
        } else if urgency == Severity::High
            || HIGH_IMPACT_KEYWORDS.iter().any(|kw| text.contains(kw))
        {
            BusinessImpact::High
        } else {
            BusinessImpact::Medium
        }
    }

    /// Duration estimate from category base scaled by impact
    pub fn estimate_duration(&self, category: TaskCategory, impact: BusinessImpact) -> Duration {
        let base = BASE_DURATION_MINUTES
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, minutes)| *minutes)
            .unwrap_or(90);

        let scaled = (base as f64 * impact.duration_factor()).round() as i64;
        Duration::minutes(scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_beats_lower_weight_rules() {
        let classifier = Classifier::new();
        // Matches both emergency (10) and data (6); emergency wins
        let category = classifier.classify("emergency review of the data ingest job");
        assert_eq!(category, TaskCategory::EmergencyResponse);
    }

    #[test]
    fn test_tie_resolves_to_first_declared_rule() {
        let classifier = Classifier::new();
        // data_pipeline and customer_experience both weigh 6;
        // data_pipeline is declared first
        let category = classifier.classify("customer data export");
        assert_eq!(category, TaskCategory::DataPipeline);
    }

    #[test]
    fn test_unmatched_text_is_general() {
        let classifier = Classifier::new();
        assert_eq!(classifier.classify("water the plants"), TaskCategory::General);
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        let classifier = Classifier::new();
        assert_eq!(
            classifier.classify("EMERGENCY health ALERT"),
            TaskCategory::EmergencyResponse
        );
    }

    #[test]
    fn test_required_capabilities_dedup_preserves_order() {
        let classifier = Classifier::new();
        let caps = classifier.required_capabilities("emergency outage in the billing pipeline");
        assert_eq!(
            caps,
            vec!["incident-response", "financial-analysis", "data-engineering"]
        );
    }

    #[test]
    fn test_required_capabilities_fallback() {
        let classifier = Classifier::new();
        let caps = classifier.required_capabilities("miscellaneous chore");
        assert_eq!(caps, vec!["general-operations"]);
    }

    #[test]
    fn test_business_impact_from_urgency() {
        let classifier = Classifier::new();
        assert_eq!(
            classifier.business_impact(Severity::Critical, "routine work"),
            BusinessImpact::Critical
        );
        assert_eq!(
            classifier.business_impact(Severity::High, "routine work"),
            BusinessImpact::High
        );
        assert_eq!(
            classifier.business_impact(Severity::Low, "routine work"),
            BusinessImpact::Medium
        );
    }

    #[test]
    fn test_business_impact_keywords_override_low_urgency() {
        let classifier = Classifier::new();
        assert_eq!(
            classifier.business_impact(Severity::Low, "production outage follow-up"),
            BusinessImpact::Critical
        );
        assert_eq!(
            classifier.business_impact(Severity::Low, "quarterly revenue summary"),
            BusinessImpact::High
        );
    }

    #[test]
    fn test_duration_scales_with_impact() {
        let classifier = Classifier::new();
        let medium =
            classifier.estimate_duration(TaskCategory::DataPipeline, BusinessImpact::Medium);
        let critical =
            classifier.estimate_duration(TaskCategory::DataPipeline, BusinessImpact::Critical);
        assert_eq!(medium, Duration::minutes(180));
        assert_eq!(critical, Duration::minutes(270));
    }
}
