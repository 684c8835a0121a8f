//! Knowledge indexer and impact quantifier tests
//!
//! Both scanners run over the same fabricated stream to mirror how the
//! monitor loop feeds them in production.


use chrono::Utc;
use serde_json::json;

use taskbus::classify::{Classifier, TaskCategory};
use taskbus::config::ImpactSection;
use taskbus::error::BusError;
use taskbus::impact::ImpactQuantifier;
use taskbus::knowledge::{AccessPolicy, KnowledgeIndexer, SearchFilters};
use taskbus::protocol::{Message, MessageType};
use taskbus::store::MessageStore;
use test_helpers::aged_message;

fn completion(sender: &str, summary: &str, age_minutes: i64) -> Message {
    aged_message(
        sender,
        "coordinator",
        MessageType::Completion,
        json!({
            "summary": summary,
            "stats": {"rows": 88412, "elapsed_ms": 10533, "retries": 0},
        }),
        Some("ctx-k"),
        age_minutes,
    )
}

fn open_indexer() -> KnowledgeIndexer {
    KnowledgeIndexer::new(
        Classifier::new(),
        AccessPolicy::new(),
        vec!["coordinator".to_string()],
    )
}

#[test]
fn test_index_rebuilds_identically_from_the_stream() {
    let window = vec![
        completion("data-steward", "billing data pipeline rebuilt with retries", 30),
        completion("customer-advocate", "customer onboarding revamp shipped", 20),
    ];

    let mut first = open_indexer();
    first.ingest(&window);

    // A fresh indexer over the same stream converges on the same ids
    let mut second = open_indexer();
    second.ingest(&window);

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    let hits = first.search("billing data pipeline", &SearchFilters::default(), "coordinator");
    assert!(!hits.is_empty());
    assert!(second.get(&hits[0].item.id).is_some());
}

#[test]
fn test_search_ranking_prefers_phrase_then_relevance() {
    let mut indexer = open_indexer();
    indexer.ingest(&[
        completion("data-steward", "revenue forecast for enterprise accounts", 10),
        completion("data-steward", "forecast tooling cleanup", 10),
    ]);

    let hits = indexer.search(
        "revenue forecast",
        &SearchFilters::default(),
        "coordinator",
    );
    assert_eq!(hits.len(), 2);
    assert!(hits[0].item.content.contains("revenue forecast"));
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn test_tag_and_source_buckets() {
    let mut indexer = open_indexer();
    indexer.ingest(&[
        completion("data-steward", "billing data reconciliation finished", 5),
        completion("customer-advocate", "customer escalation postmortem", 5),
    ]);

    let by_source = indexer.search(
        "postmortem",
        &SearchFilters {
            source_agent: Some("customer-advocate".to_string()),
            ..Default::default()
        },
        "coordinator",
    );
    assert_eq!(by_source.len(), 1);
    assert_eq!(by_source[0].item.source_agent, "customer-advocate");

    let by_tag = indexer.search(
        "reconciliation",
        &SearchFilters {
            tags: vec!["billing".to_string()],
            ..Default::default()
        },
        "coordinator",
    );
    assert_eq!(by_tag.len(), 1);
    assert!(by_tag[0].item.tags.contains(&"billing".to_string()));
}

#[tokio::test]
async fn test_gated_category_blocks_search_and_share() {
    let policy = AccessPolicy::new().restrict(
        TaskCategory::ComplianceAudit,
        &["coordinator", "compliance-officer"],
    );
    let mut indexer = KnowledgeIndexer::new(Classifier::new(), policy, Vec::new());
    indexer.ingest(&[completion(
        "compliance-officer",
        "compliance audit findings for the privacy review",
        15,
    )]);

    // Permitted role sees it
    let hits = indexer.search("audit findings", &SearchFilters::default(), "coordinator");
    assert_eq!(hits.len(), 1);
    let item_id = hits[0].item.id.clone();

    // Unpermitted role sees nothing
    let hits = indexer.search("audit findings", &SearchFilters::default(), "data-steward");
    assert!(hits.is_empty());

    // Sharing to an unpermitted target is refused before any send
    let store = test_helpers::standard_store();
    let err = indexer
        .share(&item_id, "data-steward", "coordinator", store.as_ref())
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Validation { .. }));

    // Sharing between permitted roles lands on the bus
    indexer
        .share(&item_id, "compliance-officer", "coordinator", store.as_ref())
        .await
        .unwrap();
    let received = store
        .receive(
            "compliance-officer",
            None,
            10,
            Some(&[MessageType::KnowledgeShare]),
        )
        .await
        .unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload["item_id"], item_id);
}

#[test]
fn test_impact_breakdowns_follow_the_shared_classifier() {
    let quantifier = ImpactQuantifier::new(Classifier::new(), ImpactSection::default());
    let classifier = Classifier::new();

    let window = vec![
        aged_message(
            "coordinator",
            "data-steward",
            MessageType::Delegation,
            json!({"task": "urgent revenue forecast refresh"}),
            None,
            120,
        ),
        aged_message(
            "data-steward",
            "coordinator",
            MessageType::Completion,
            json!({"detail": "revenue forecast refreshed"}),
            None,
            60,
        ),
        // Acknowledgments carry no impact
        aged_message(
            "data-steward",
            "coordinator",
            MessageType::Acknowledgment,
            json!({"ok": true}),
            None,
            60,
        ),
    ];

    let report = quantifier.report(&window, Utc::now());

    assert_eq!(report.messages_scored, 2);
    let revenue_total = report
        .by_category
        .get(&classifier.classify("revenue forecast"))
        .copied()
        .unwrap_or(0.0);
    assert_eq!(revenue_total, report.total);

    // Delegation credits the assignee, completion its sender: both are
    // the data steward here
    assert_eq!(
        report.by_agent.get("data-steward").copied().unwrap_or(0.0),
        report.total
    );

    // 200 x 2.5 x 1.5 urgent delegation + 500 x 2.5 completion
    assert_eq!(report.total, 750.0 + 1250.0);
}

#[test]
fn test_projection_against_revenue_target() {
    let quantifier = ImpactQuantifier::new(Classifier::new(), ImpactSection::default());
    let window = vec![aged_message(
        "data-steward",
        "coordinator",
        MessageType::Completion,
        json!({"detail": "revenue forecast refreshed"}),
        None,
        1440,
    )];

    let report = quantifier.report(&window, Utc::now());

    // One day of observation projects linearly
    assert!((report.span_days - 1.0).abs() < 0.01);
    assert!((report.annual_projection - report.daily_rate * 365.0).abs() < 1e-6);
    assert!(report.target_attainment > 0.0);
    assert!((report.roi - 0.65 / 0.35).abs() < 1e-6);
}
