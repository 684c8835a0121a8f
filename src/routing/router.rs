//! Specialization router
//!
//! Routing runs in six steps: classify, derive capabilities, compute
//! business impact, pick a candidate (direct rule first, capability
//! scoring otherwise), verify load, and assemble the decision. Scoring is
//! +3 per required capability in primary, +1 in secondary, -5 in
//! forbidden, +1 for a matching business-impact tier; ties resolve to the
//! agent declared earliest in the directory.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::classify::{BusinessImpact, Classifier, TaskCategory};
use crate::directory::{AgentDirectory, AgentProfile};
use crate::error::BusResult;
use crate::protocol::{MessageType, Severity};
use crate::store::MessageStore;

/// Trailing window over which open delegations count toward load
const LOAD_WINDOW_HOURS: i64 = 24;

/// Routing decision returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub category: TaskCategory,
    pub required_capabilities: Vec<String>,
    pub business_impact: BusinessImpact,
    /// Selected assignee
    pub agent: String,
    /// Human-readable explanation of the decision path
    pub reasoning: String,
    /// Estimated duration in minutes
    pub estimated_duration_minutes: i64,
}

/// Result of the load check for one agent
#[derive(Debug, Clone, Serialize)]
pub struct LoadStatus {
    pub agent: String,
    pub open_delegations: usize,
    pub max_concurrent_tasks: usize,
    pub is_available: bool,
}

/// Specialization-aware router over the agent directory
pub struct SpecializationRouter<S: MessageStore> {
    directory: AgentDirectory,
    classifier: Classifier,
    store: std::sync::Arc<S>,
    /// Direct category-to-agent rules, checked before capability scoring
    direct_rules: HashMap<TaskCategory, String>,
}

impl<S: MessageStore> SpecializationRouter<S> {
    pub fn new(
        directory: AgentDirectory,
        classifier: Classifier,
        store: std::sync::Arc<S>,
        direct_rules: HashMap<TaskCategory, String>,
    ) -> Self {
        Self {
            directory,
            classifier,
            store,
            direct_rules,
        }
    }

    /// Route a task description to the best-fit agent
    pub async fn route(
        &self,
        task_description: &str,
        requesting_agent: &str,
        urgency: Severity,
    ) -> BusResult<RoutingDecision> {
        let category = self.classifier.classify(task_description);
        let required = self.classifier.required_capabilities(task_description);
        let impact = self.classifier.business_impact(urgency, task_description);

        debug!(
            %category,
            ?required,
            %impact,
            requesting_agent,
            "routing task"
        );

        let mut reasoning = format!(
            "category={category} (impact {impact}, urgency {urgency}); requires [{}]",
            required.join(", ")
        );

        // Direct rules take precedence over capability scoring
        let candidate = match self.direct_rules.get(&category) {
            Some(agent) => {
                reasoning.push_str(&format!("; direct rule {category} -> {agent}"));
                agent.clone()
            }
            None => {
                let (agent, score) = self.best_by_score(&required, impact);
                reasoning.push_str(&format!("; capability score selected {agent} ({score})"));
                agent
            }
        };

        // Load check, with capability-overlap fallback and the coordinator
        // as the terminal fallback
        let load = self.check_load(&candidate).await?;
        let agent = if load.is_available {
            candidate
        } else {
            warn!(
                agent = %candidate,
                open = load.open_delegations,
                max = load.max_concurrent_tasks,
                "candidate at capacity, searching alternates"
            );
            match self.available_alternate(&candidate, &required, impact).await? {
                Some(alternate) => {
                    reasoning.push_str(&format!(
                        "; {candidate} at capacity ({}/{}), reassigned to {alternate}",
                        load.open_delegations, load.max_concurrent_tasks
                    ));
                    alternate
                }
                None => {
                    let coordinator = self.directory.coordinator().to_string();
                    reasoning.push_str(&format!(
                        "; {candidate} at capacity and no alternate qualifies, \
                         falling back to coordinator {coordinator}"
                    ));
                    coordinator
                }
            }
        };

        let estimated = self.classifier.estimate_duration(category, impact);
        info!(%agent, %category, "routing decision made");

        Ok(RoutingDecision {
            category,
            required_capabilities: required,
            business_impact: impact,
            agent,
            reasoning,
            estimated_duration_minutes: estimated.num_minutes(),
        })
    }

    /// Count open delegations to an agent within the trailing load window
    ///
    /// A delegation is open unless a completion sharing its context_id
    /// exists; a delegation without a context counts while still SENT.
    pub async fn check_load(&self, agent: &str) -> BusResult<LoadStatus> {
        let since = Utc::now() - Duration::hours(LOAD_WINDOW_HOURS);
        let window = self.store.window(since).await?;

        let completed_contexts: std::collections::HashSet<&str> = window
            .iter()
            .filter(|m| m.message_type == MessageType::Completion)
            .filter_map(|m| m.context_id.as_deref())
            .collect();

        let open_delegations = window
            .iter()
            .filter(|m| m.message_type == MessageType::Delegation && m.recipient == agent)
            .filter(|m| match m.context_id.as_deref() {
                Some(ctx) => !completed_contexts.contains(ctx),
                None => m.status == crate::protocol::MessageStatus::Sent,
            })
            .count();

        let max_concurrent_tasks = self
            .directory
            .get(agent)
            .map(|p| p.max_concurrent_tasks)
            .unwrap_or(0);

        Ok(LoadStatus {
            agent: agent.to_string(),
            open_delegations,
            max_concurrent_tasks,
            is_available: open_delegations < max_concurrent_tasks,
        })
    }

    /// Capability score for one profile
    fn score(&self, profile: &AgentProfile, required: &[String], impact: BusinessImpact) -> i32 {
        let mut score = 0i32;
        for capability in required {
            if profile.has_primary(capability) {
                score += 3;
            } else if profile.has_secondary(capability) {
                score += 1;
            }
            if profile.is_forbidden(capability) {
                score -= 5;
            }
        }
        if profile.business_impact_tier == impact {
            score += 1;
        }
        score
    }

    /// Highest-scoring agent; equal scores keep the earliest declaration
    fn best_by_score(&self, required: &[String], impact: BusinessImpact) -> (String, i32) {
        let mut best: Option<(&AgentProfile, i32)> = None;
        for profile in self.directory.all() {
            let score = self.score(profile, required, impact);
            // Strictly-greater keeps the first-declared agent on ties
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((profile, score));
            }
        }
        match best {
            Some((profile, score)) => (profile.name.clone(), score),
            // Empty directory is rejected at config load; cover the
            // programmatic case anyway
            None => (self.directory.coordinator().to_string(), 0),
        }
    }

    /// Best-scoring agent with capability overlap and spare capacity,
    /// excluding the saturated candidate
    async fn available_alternate(
        &self,
        exclude: &str,
        required: &[String],
        impact: BusinessImpact,
    ) -> BusResult<Option<String>> {
        let mut best: Option<(String, i32)> = None;

        for profile in self.directory.all() {
            if profile.name == exclude {
                continue;
            }
            let overlaps = required.iter().any(|c| profile.can_handle(c));
            if !overlaps {
                continue;
            }
            if !self.check_load(&profile.name).await?.is_available {
                continue;
            }
            let score = self.score(profile, required, impact);
            if best.as_ref().map_or(true, |(_, b)| score > *b) {
                best = Some((profile.name.clone(), score));
            }
        }

        Ok(best.map(|(name, _)| name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn test_directory() -> AgentDirectory {
        AgentDirectory::new(
            vec![
                AgentProfile::new("coordinator")
                    .with_primary(&["project-coordination"])
                    .with_max_concurrent(10),
                AgentProfile::new("data-steward")
                    .with_primary(&["data-engineering", "data-analysis"])
                    .with_max_concurrent(3),
                AgentProfile::new("data-backup")
                    .with_secondary(&["data-engineering"])
                    .with_max_concurrent(3),
                AgentProfile::new("incident-commander")
                    .with_primary(&["incident-response"])
                    .with_tier(BusinessImpact::Critical)
                    .with_max_concurrent(5),
            ],
            "coordinator".to_string(),
        )
    }

    fn test_router(
        direct: HashMap<TaskCategory, String>,
    ) -> (SpecializationRouter<MemoryStore>, Arc<MemoryStore>) {
        let directory = test_directory();
        let store = Arc::new(MemoryStore::new(directory.clone()));
        let router =
            SpecializationRouter::new(directory, Classifier::new(), store.clone(), direct);
        (router, store)
    }

    #[tokio::test]
    async fn test_scoring_prefers_primary_capability() {
        let (router, _store) = test_router(HashMap::new());
        let decision = router
            .route("migrate the reporting database", "coordinator", Severity::Medium)
            .await
            .unwrap();

        assert_eq!(decision.category, TaskCategory::DataPipeline);
        assert_eq!(decision.agent, "data-steward");
        assert!(decision.reasoning.contains("capability score"));
    }

    #[tokio::test]
    async fn test_direct_rule_takes_precedence() {
        let mut direct = HashMap::new();
        direct.insert(TaskCategory::DataPipeline, "coordinator".to_string());
        let (router, _store) = test_router(direct);

        let decision = router
            .route("migrate the reporting database", "data-steward", Severity::Medium)
            .await
            .unwrap();

        assert_eq!(decision.agent, "coordinator");
        assert!(decision.reasoning.contains("direct rule"));
    }

    #[tokio::test]
    async fn test_emergency_routes_to_specialist() {
        let mut direct = HashMap::new();
        direct.insert(
            TaskCategory::EmergencyResponse,
            "incident-commander".to_string(),
        );
        let (router, _store) = test_router(direct);

        let decision = router
            .route(
                "emergency health alert needs immediate review",
                "coordinator",
                Severity::Critical,
            )
            .await
            .unwrap();

        assert_eq!(decision.category, TaskCategory::EmergencyResponse);
        assert_eq!(decision.agent, "incident-commander");
        assert_eq!(decision.business_impact, BusinessImpact::Critical);
    }

    #[tokio::test]
    async fn test_load_check_counts_open_delegations() {
        let (router, store) = test_router(HashMap::new());

        for i in 0..3 {
            store
                .send(
                    "coordinator",
                    "data-steward",
                    MessageType::Delegation,
                    json!({"task": format!("job {i}")}),
                    Some(format!("ctx-{i}")),
                )
                .await
                .unwrap();
        }

        let load = router.check_load("data-steward").await.unwrap();
        assert_eq!(load.open_delegations, 3);
        assert!(!load.is_available);
    }

    #[tokio::test]
    async fn test_completion_closes_delegation_for_load() {
        let (router, store) = test_router(HashMap::new());

        store
            .send(
                "coordinator",
                "data-steward",
                MessageType::Delegation,
                json!({"task": "ingest"}),
                Some("ctx-1".to_string()),
            )
            .await
            .unwrap();
        store
            .send(
                "data-steward",
                "coordinator",
                MessageType::Completion,
                json!({"result": "done"}),
                Some("ctx-1".to_string()),
            )
            .await
            .unwrap();

        let load = router.check_load("data-steward").await.unwrap();
        assert_eq!(load.open_delegations, 0);
        assert!(load.is_available);
    }

    #[tokio::test]
    async fn test_overload_falls_back_to_capability_overlap() {
        let (router, store) = test_router(HashMap::new());

        // Saturate the primary data agent
        for i in 0..3 {
            store
                .send(
                    "coordinator",
                    "data-steward",
                    MessageType::Delegation,
                    json!({"task": format!("job {i}")}),
                    Some(format!("ctx-{i}")),
                )
                .await
                .unwrap();
        }

        let decision = router
            .route("new etl pipeline run", "coordinator", Severity::Medium)
            .await
            .unwrap();

        assert_eq!(decision.agent, "data-backup");
        assert!(decision.reasoning.contains("at capacity"));
    }

    #[tokio::test]
    async fn test_overload_without_alternate_goes_to_coordinator() {
        let (router, store) = test_router(HashMap::new());

        // Saturate both agents capable of data work
        for agent in ["data-steward", "data-backup"] {
            for i in 0..3 {
                store
                    .send(
                        "coordinator",
                        agent,
                        MessageType::Delegation,
                        json!({"task": format!("job {i}")}),
                        Some(format!("ctx-{agent}-{i}")),
                    )
                    .await
                    .unwrap();
            }
        }

        let decision = router
            .route("new etl pipeline run", "coordinator", Severity::Medium)
            .await
            .unwrap();

        assert_eq!(decision.agent, "coordinator");
        assert!(decision.reasoning.contains("coordinator"));
    }

    #[tokio::test]
    async fn test_duration_estimate_present() {
        let (router, _store) = test_router(HashMap::new());
        let decision = router
            .route("schedule the quarterly plan review", "coordinator", Severity::Low)
            .await
            .unwrap();
        assert!(decision.estimated_duration_minutes > 0);
    }
}
