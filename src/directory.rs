//! Agent directory
//!
//! A queryable directory of registered agents and their capability
//! profiles, loaded from configuration and read-only at runtime. Iteration
//! follows declaration order so that score ties in routing resolve
//! deterministically.

use serde::{Deserialize, Serialize};

use crate::classify::BusinessImpact;

/// Declared capability profile for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Agent identifier (must match [a-zA-Z0-9._-]+)
    pub name: String,
    /// Capabilities the agent is the designated owner of
    #[serde(default)]
    pub primary_capabilities: Vec<String>,
    /// Capabilities the agent can cover at reduced fit
    #[serde(default)]
    pub secondary_capabilities: Vec<String>,
    /// Capabilities the agent must never be assigned
    #[serde(default)]
    pub forbidden_capabilities: Vec<String>,
    /// Open-delegation ceiling for the load check
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Tier used for the +1 impact-match scoring bonus
    #[serde(default = "default_business_impact_tier")]
    pub business_impact_tier: BusinessImpact,
}

fn default_max_concurrent_tasks() -> usize {
    3
}

fn default_business_impact_tier() -> BusinessImpact {
    BusinessImpact::Medium
}

impl AgentProfile {
    /// Create a profile with defaults for everything but the name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            primary_capabilities: Vec::new(),
            secondary_capabilities: Vec::new(),
            forbidden_capabilities: Vec::new(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            business_impact_tier: default_business_impact_tier(),
        }
    }

    /// Builder method to set primary capabilities
    pub fn with_primary(mut self, capabilities: &[&str]) -> Self {
        self.primary_capabilities = capabilities.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Builder method to set secondary capabilities
    pub fn with_secondary(mut self, capabilities: &[&str]) -> Self {
        self.secondary_capabilities = capabilities.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Builder method to set forbidden capabilities
    pub fn with_forbidden(mut self, capabilities: &[&str]) -> Self {
        self.forbidden_capabilities = capabilities.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Builder method to set the concurrency ceiling
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Builder method to set the business impact tier
    pub fn with_tier(mut self, tier: BusinessImpact) -> Self {
        self.business_impact_tier = tier;
        self
    }

    /// Case-insensitive membership test against primary capabilities
    pub fn has_primary(&self, capability: &str) -> bool {
        contains_tag(&self.primary_capabilities, capability)
    }

    /// Case-insensitive membership test against secondary capabilities
    pub fn has_secondary(&self, capability: &str) -> bool {
        contains_tag(&self.secondary_capabilities, capability)
    }

    /// Case-insensitive membership test against forbidden capabilities
    pub fn is_forbidden(&self, capability: &str) -> bool {
        contains_tag(&self.forbidden_capabilities, capability)
    }

    /// True when the agent declares the capability as primary or secondary
    pub fn can_handle(&self, capability: &str) -> bool {
        self.has_primary(capability) || self.has_secondary(capability)
    }
}

fn contains_tag(tags: &[String], capability: &str) -> bool {
    tags.iter().any(|t| t.eq_ignore_ascii_case(capability))
}

/// Read-only directory of registered agents
///
/// Both ends of every message must resolve here before persistence; the
/// router walks the directory in declaration order when scoring.
#[derive(Debug, Clone)]
pub struct AgentDirectory {
    agents: Vec<AgentProfile>,
    coordinator: String,
}

impl AgentDirectory {
    /// Build a directory from configured profiles and the designated
    /// coordinator name
    pub fn new(agents: Vec<AgentProfile>, coordinator: String) -> Self {
        Self { agents, coordinator }
    }

    /// Look up a profile by name
    pub fn get(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.name == name)
    }

    /// True when the name resolves to a registered agent
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All profiles in declaration order
    pub fn all(&self) -> &[AgentProfile] {
        &self.agents
    }

    /// Name of the designated coordinator role
    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }

    /// Profile of the designated coordinator
    pub fn coordinator_profile(&self) -> Option<&AgentProfile> {
        self.get(&self.coordinator)
    }

    /// Agents declaring the capability as primary or secondary,
    /// declaration order preserved
    pub fn agents_with_capability(&self, capability: &str) -> Vec<&AgentProfile> {
        self.agents
            .iter()
            .filter(|a| a.can_handle(capability))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_directory() -> AgentDirectory {
        AgentDirectory::new(
            vec![
                AgentProfile::new("coordinator").with_primary(&["project-coordination"]),
                AgentProfile::new("data-steward")
                    .with_primary(&["data-engineering", "data-analysis"])
                    .with_secondary(&["reporting"])
                    .with_forbidden(&["incident-response"]),
                AgentProfile::new("incident-commander")
                    .with_primary(&["incident-response"])
                    .with_tier(BusinessImpact::Critical),
            ],
            "coordinator".to_string(),
        )
    }

    #[test]
    fn test_lookup_and_contains() {
        let directory = test_directory();
        assert!(directory.contains("data-steward"));
        assert!(!directory.contains("ghost"));
        assert_eq!(directory.get("data-steward").unwrap().name, "data-steward");
    }

    #[test]
    fn test_capability_checks_are_case_insensitive() {
        let directory = test_directory();
        let steward = directory.get("data-steward").unwrap();
        assert!(steward.has_primary("Data-Engineering"));
        assert!(steward.has_secondary("REPORTING"));
        assert!(steward.is_forbidden("Incident-Response"));
    }

    #[test]
    fn test_agents_with_capability_keeps_declaration_order() {
        let directory = test_directory();
        let matches = directory.agents_with_capability("data-analysis");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "data-steward");
    }

    #[test]
    fn test_coordinator_resolution() {
        let directory = test_directory();
        assert_eq!(directory.coordinator(), "coordinator");
        assert!(directory.coordinator_profile().is_some());
    }
}
