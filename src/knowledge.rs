//! Knowledge indexing
//!
//! Mines the message stream for high-value content, classifies it with
//! the shared classifier, and indexes it by id, category, tag, and source
//! agent for constant-time bucket lookup. Search ranks by phrase match,
//! keyword and tag overlap, recency, and business relevance, gated by a
//! category-to-role access table. The index is process-local and rebuilt
//! from the stream on restart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::classify::{Classifier, TaskCategory};
use crate::error::{BusError, BusResult};
use crate::protocol::{Message, MessageType};
use crate::store::MessageStore;

/// Minimum serialized payload size for a message to qualify
const MIN_PAYLOAD_BYTES: usize = 64;

/// Content is extracted from the first of these payload fields
const CONTENT_FIELDS: &[&str] = &[
    "summary",
    "insight",
    "result",
    "description",
    "detail",
    "task",
    "message",
];

/// Keyword tags applied by presence
const TAG_KEYWORDS: &[&str] = &[
    "revenue",
    "customer",
    "compliance",
    "data",
    "emergency",
    "infrastructure",
    "forecast",
    "audit",
    "pipeline",
    "billing",
];

/// Relevance weights by keyword presence
const RELEVANCE_KEYWORDS: &[(&str, f64)] = &[
    ("revenue", 0.30),
    ("emergency", 0.25),
    ("customer", 0.20),
    ("compliance", 0.20),
    ("cost", 0.15),
    ("efficiency", 0.10),
];

/// Per-type confidence base
fn type_confidence(message_type: MessageType) -> f64 {
    match message_type {
        MessageType::Completion => 0.90,
        MessageType::ImpactReport => 0.85,
        MessageType::KnowledgeShare => 0.80,
        MessageType::Blocker => 0.75,
        MessageType::StrategicQuery => 0.70,
        _ => 0.60,
    }
}

/// One indexed knowledge item
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeItem {
    /// Deterministic hash of source, timestamp, and content prefix
    pub id: String,
    pub category: TaskCategory,
    pub tags: Vec<String>,
    pub content: String,
    pub confidence: f64,
    pub business_relevance: f64,
    pub source_agent: String,
    pub timestamp: DateTime<Utc>,
}

/// Category-to-permitted-roles access table
///
/// A category with no entry is open to every registered agent.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: HashMap<TaskCategory, Vec<String>>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict a category to the given agents
    pub fn restrict(mut self, category: TaskCategory, agents: &[&str]) -> Self {
        self.rules
            .insert(category, agents.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn permits(&self, category: TaskCategory, agent: &str) -> bool {
        match self.rules.get(&category) {
            Some(allowed) => allowed.iter().any(|a| a == agent),
            None => true,
        }
    }
}

/// Search filters; empty fields do not constrain
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub category: Option<TaskCategory>,
    pub tags: Vec<String>,
    pub source_agent: Option<String>,
}

/// One ranked search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub item: KnowledgeItem,
    pub score: f64,
}

/// Stream-fed knowledge index
pub struct KnowledgeIndexer {
    classifier: Classifier,
    access: AccessPolicy,
    /// Sources granted a confidence bonus
    trusted_sources: Vec<String>,
    items: HashMap<String, KnowledgeItem>,
    by_category: HashMap<TaskCategory, Vec<String>>,
    by_tag: HashMap<String, Vec<String>>,
    by_source: HashMap<String, Vec<String>>,
}

impl KnowledgeIndexer {
    pub fn new(classifier: Classifier, access: AccessPolicy, trusted_sources: Vec<String>) -> Self {
        Self {
            classifier,
            access,
            trusted_sources,
            items: HashMap::new(),
            by_category: HashMap::new(),
            by_tag: HashMap::new(),
            by_source: HashMap::new(),
        }
    }

    /// Scan a window and index qualifying messages; returns how many new
    /// items were added
    ///
    /// Best-effort: a message that fails to index is logged and skipped.
    pub fn ingest(&mut self, window: &[Message]) -> usize {
        let mut added = 0;
        for message in window {
            if !message.message_type.is_high_value() {
                continue;
            }
            let payload_len = message.payload.to_string().len();
            if payload_len < MIN_PAYLOAD_BYTES {
                continue;
            }

            match self.build_item(message, payload_len) {
                Some(item) if !self.items.contains_key(&item.id) => {
                    self.index_item(item);
                    added += 1;
                }
                Some(_) => {}
                None => warn!(id = %message.id, "message did not yield indexable content"),
            }
        }
        if added > 0 {
            debug!(added, total = self.items.len(), "knowledge index updated");
        }
        added
    }

    fn build_item(&self, message: &Message, payload_len: usize) -> Option<KnowledgeItem> {
        let content = extract_content(message)?;
        let text = content.to_lowercase();

        let tags: Vec<String> = TAG_KEYWORDS
            .iter()
            .filter(|kw| text.contains(*kw))
            .map(|kw| kw.to_string())
            .collect();

        let trusted = self.trusted_sources.iter().any(|s| s == &message.sender);
        let richness = (payload_len as f64 / 2048.0).min(0.10);
        let confidence = (type_confidence(message.message_type)
            + if trusted { 0.10 } else { 0.0 }
            + richness)
            .clamp(0.0, 1.0);

        let business_relevance = RELEVANCE_KEYWORDS
            .iter()
            .filter(|(kw, _)| text.contains(kw))
            .map(|(_, weight)| weight)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        Some(KnowledgeItem {
            id: item_id(&message.sender, message.created_at, &content),
            category: self.classifier.classify(&content),
            tags,
            content,
            confidence,
            business_relevance,
            source_agent: message.sender.clone(),
            timestamp: message.created_at,
        })
    }

    fn index_item(&mut self, item: KnowledgeItem) {
        self.by_category
            .entry(item.category)
            .or_default()
            .push(item.id.clone());
        for tag in &item.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .push(item.id.clone());
        }
        self.by_source
            .entry(item.source_agent.clone())
            .or_default()
            .push(item.id.clone());
        self.items.insert(item.id.clone(), item);
    }

    /// Look up one item by id
    pub fn get(&self, id: &str) -> Option<&KnowledgeItem> {
        self.items.get(id)
    }

    /// Number of indexed items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ranked, access-filtered search
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        requesting_agent: &str,
    ) -> Vec<SearchHit> {
        let query_lower = query.to_lowercase();
        let query_words: Vec<&str> = query_lower.split_whitespace().collect();
        let now = Utc::now();

        let candidate_ids: Vec<&String> = match (&filters.category, &filters.source_agent) {
            (Some(category), _) => self
                .by_category
                .get(category)
                .map(|ids| ids.iter().collect())
                .unwrap_or_default(),
            (None, Some(source)) => self
                .by_source
                .get(source)
                .map(|ids| ids.iter().collect())
                .unwrap_or_default(),
            (None, None) => self.items.keys().collect(),
        };

        let mut hits: Vec<SearchHit> = candidate_ids
            .into_iter()
            .filter_map(|id| self.items.get(id))
            .filter(|item| self.access.permits(item.category, requesting_agent))
            .filter(|item| {
                filters
                    .source_agent
                    .as_ref()
                    .map_or(true, |s| &item.source_agent == s)
            })
            .filter(|item| {
                filters.tags.is_empty()
                    || filters.tags.iter().any(|t| item.tags.contains(t))
            })
            .map(|item| SearchHit {
                score: score_item(item, &query_lower, &query_words, &filters.tags, now),
                item: item.clone(),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.item.timestamp.cmp(&a.item.timestamp))
        });
        hits
    }

    /// Share an indexed item with another agent through the bus
    ///
    /// Both the sharing and the receiving agent must pass the access
    /// table for the item's category.
    pub async fn share<S: MessageStore>(
        &self,
        item_id: &str,
        target_agent: &str,
        by_agent: &str,
        store: &S,
    ) -> BusResult<Message> {
        let item = self
            .get(item_id)
            .ok_or_else(|| BusError::validation(format!("unknown knowledge item {item_id}")))?;

        if !self.access.permits(item.category, by_agent) {
            return Err(BusError::validation(format!(
                "agent '{by_agent}' has no access to {} knowledge",
                item.category
            )));
        }
        if !self.access.permits(item.category, target_agent) {
            return Err(BusError::validation(format!(
                "agent '{target_agent}' has no access to {} knowledge",
                item.category
            )));
        }

        store
            .send(
                by_agent,
                target_agent,
                MessageType::KnowledgeShare,
                json!({
                    "item_id": item.id,
                    "category": item.category.as_str(),
                    "tags": item.tags,
                    "content": item.content,
                    "confidence": item.confidence,
                    "business_relevance": item.business_relevance,
                    "source_agent": item.source_agent,
                }),
                None,
            )
            .await
    }
}

/// Deterministic item id: hex SHA-256 over source, timestamp, and the
/// first 64 chars of content
fn item_id(source: &str, timestamp: DateTime<Utc>, content: &str) -> String {
    let prefix: String = content.chars().take(64).collect();
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(b"|");
    hasher.update(prefix.as_bytes());
    hex::encode(hasher.finalize())
}

fn extract_content(message: &Message) -> Option<String> {
    for field in CONTENT_FIELDS {
        if let Some(text) = message.payload.get(field).and_then(|v| v.as_str()) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn score_item(
    item: &KnowledgeItem,
    query_lower: &str,
    query_words: &[&str],
    filter_tags: &[String],
    now: DateTime<Utc>,
) -> f64 {
    let content_lower = item.content.to_lowercase();
    let mut score = 0.0;

    // Exact phrase beats everything else
    if !query_lower.is_empty() && content_lower.contains(query_lower) {
        score += 3.0;
    }

    if !query_words.is_empty() {
        let matched = query_words
            .iter()
            .filter(|w| content_lower.contains(*w))
            .count();
        score += 2.0 * matched as f64 / query_words.len() as f64;
    }

    if !filter_tags.is_empty() {
        let matched = filter_tags.iter().filter(|t| item.tags.contains(t)).count();
        score += matched as f64 / filter_tags.len() as f64;
    }

    // Day-scale recency decay
    let age_days = (now - item.timestamp).num_hours().max(0) as f64 / 24.0;
    score += 1.0 / (1.0 + age_days);

    score + item.business_relevance
}
