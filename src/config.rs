//! Configuration system for the coordination bus
//!
//! One TOML file describes the agent directory, routing rules, consumer
//! cadence, monitoring windows, impact reporting, and retention policy.
//! Everything here is read once at startup; runtime components receive the
//! parsed sections by reference.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::classify::TaskCategory;
use crate::directory::{AgentDirectory, AgentProfile};

/// Main bus configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusConfig {
    pub bus: BusSection,
    #[serde(default)]
    pub consumer: ConsumerSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub impact: ImpactSection,
    #[serde(default)]
    pub retention: RetentionSection,
    #[serde(default)]
    pub routing: RoutingSection,
    /// Registered agents, declaration order significant for tie-breaks
    pub agents: Vec<AgentProfile>,
}

/// Bus identity section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusSection {
    /// Name of the agent receiving escalations and overload fallbacks
    pub coordinator: String,
    /// Port for the health/metrics HTTP endpoints
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

/// Polling consumer cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerSection {
    /// Seconds between receive calls (5-30s operating range)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Maximum messages fetched per poll
    #[serde(default = "default_receive_limit")]
    pub receive_limit: usize,
    /// Processed-id set is cleared once it exceeds this bound
    #[serde(default = "default_processed_set_bound")]
    pub processed_set_bound: usize,
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            receive_limit: default_receive_limit(),
            processed_set_bound: default_processed_set_bound(),
        }
    }
}

/// Blocker detection and prediction windows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorSection {
    /// Seconds between monitor scans
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Trailing window the scanners evaluate, in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    /// A delegation unanswered for this long is a communication breakdown
    #[serde(default = "default_breakdown_minutes")]
    pub communication_breakdown_minutes: i64,
    /// Assignment-to-completion ratio that flags agent overload
    #[serde(default = "default_overload_ratio")]
    pub overload_ratio: f64,
    /// Failures sharing a category that flag a repeated-failure blocker
    #[serde(default = "default_repeated_failure_threshold")]
    pub repeated_failure_threshold: usize,
    /// SLA bound for emergency-tagged tasks, in minutes
    #[serde(default = "default_emergency_sla_minutes")]
    pub emergency_sla_minutes: i64,
    /// Risk probability above which a predictive alert is emitted
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: f64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            window_minutes: default_window_minutes(),
            communication_breakdown_minutes: default_breakdown_minutes(),
            overload_ratio: default_overload_ratio(),
            repeated_failure_threshold: default_repeated_failure_threshold(),
            emergency_sla_minutes: default_emergency_sla_minutes(),
            risk_threshold: default_risk_threshold(),
        }
    }
}

/// Impact quantifier reporting targets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImpactSection {
    /// Annual revenue target the projection is reported against
    #[serde(default = "default_revenue_target")]
    pub annual_revenue_target: f64,
    /// Fixed cost ratio assumed by the ROI figure
    #[serde(default = "default_cost_ratio")]
    pub cost_ratio: f64,
}

impl Default for ImpactSection {
    fn default() -> Self {
        Self {
            annual_revenue_target: default_revenue_target(),
            cost_ratio: default_cost_ratio(),
        }
    }
}

/// Age-based retention sweep policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionSection {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    /// Payload severities never removed by the sweep
    #[serde(default = "default_protected_severities")]
    pub protected_severities: Vec<crate::protocol::Severity>,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            protected_severities: default_protected_severities(),
        }
    }
}

/// Routing rule overrides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RoutingSection {
    /// Direct category-to-agent rules checked before capability scoring
    #[serde(default)]
    pub direct: HashMap<TaskCategory, String>,
}

fn default_health_port() -> u16 {
    8080
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_receive_limit() -> usize {
    25
}

fn default_processed_set_bound() -> usize {
    1024
}

fn default_scan_interval_secs() -> u64 {
    60
}

fn default_window_minutes() -> i64 {
    60
}

fn default_breakdown_minutes() -> i64 {
    30
}

fn default_overload_ratio() -> f64 {
    3.0
}

fn default_repeated_failure_threshold() -> usize {
    3
}

fn default_emergency_sla_minutes() -> i64 {
    15
}

fn default_risk_threshold() -> f64 {
    0.7
}

fn default_revenue_target() -> f64 {
    1_000_000.0
}

fn default_cost_ratio() -> f64 {
    0.35
}

fn default_max_age_days() -> i64 {
    30
}

fn default_protected_severities() -> Vec<crate::protocol::Severity> {
    vec![
        crate::protocol::Severity::Critical,
        crate::protocol::Severity::High,
    ]
}

impl BusConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::FileRead(format!("{}: {e}", path.as_ref().display()))
        })?;
        let config: BusConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one [[agents]] entry is required".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.name.is_empty()
                || !agent
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            {
                return Err(ConfigError::InvalidConfig(format!(
                    "agent name '{}' must match [a-zA-Z0-9._-]+",
                    agent.name
                )));
            }
            if !seen.insert(agent.name.clone()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
            if agent.max_concurrent_tasks == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "agent '{}' must allow at least one concurrent task",
                    agent.name
                )));
            }
        }

        if !seen.contains(&self.bus.coordinator) {
            return Err(ConfigError::InvalidConfig(format!(
                "coordinator '{}' is not a registered agent",
                self.bus.coordinator
            )));
        }

        for (category, target) in &self.routing.direct {
            if !seen.contains(target) {
                return Err(ConfigError::InvalidConfig(format!(
                    "direct route for {category} targets unregistered agent '{target}'"
                )));
            }
        }

        if self.consumer.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "consumer.poll_interval_secs must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.monitor.risk_threshold) {
            return Err(ConfigError::InvalidConfig(
                "monitor.risk_threshold must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.impact.cost_ratio) {
            return Err(ConfigError::InvalidConfig(
                "impact.cost_ratio must be within [0, 1)".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the runtime agent directory from the configured profiles
    pub fn directory(&self) -> AgentDirectory {
        AgentDirectory::new(self.agents.clone(), self.bus.coordinator.clone())
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
