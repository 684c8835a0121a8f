//! taskbus - agent task-delegation and coordination bus
//!
//! Coordinates work across independent, named software agents through a
//! durable, queryable message store. This crate provides:
//! - The message envelope, its enumerated types, and validation
//! - A store contract with at-least-once delivery and an in-memory
//!   implementation
//! - A specialization-aware router matching tasks to capability profiles
//!   under per-agent load ceilings
//! - Per-agent polling consumers with type-keyed handler tables
//! - A catalog-driven error recovery engine with cancellable backoff
//! - Blocker detection, heuristic risk prediction, and health scoring
//!   over the live stream
//! - A knowledge indexer and an impact quantifier fed by the same stream
//!
//! # Quick Start
//!
//! ```rust
//! use taskbus::classify::Classifier;
//! use taskbus::directory::{AgentDirectory, AgentProfile};
//! use taskbus::protocol::Severity;
//!
//! let directory = AgentDirectory::new(
//!     vec![
//!         AgentProfile::new("coordinator").with_primary(&["project-coordination"]),
//!         AgentProfile::new("data-steward").with_primary(&["data-engineering"]),
//!     ],
//!     "coordinator".to_string(),
//! );
//!
//! let classifier = Classifier::new();
//! let category = classifier.classify("migrate the billing database");
//! let capabilities = classifier.required_capabilities("migrate the billing database");
//! let impact = classifier.business_impact(Severity::High, "migrate the billing database");
//!
//! assert!(directory.contains("data-steward"));
//! assert!(!capabilities.is_empty());
//! let _ = (category, impact);
//! ```
//!
//! Sending and receiving goes through the store contract:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use taskbus::directory::{AgentDirectory, AgentProfile};
//! use taskbus::protocol::MessageType;
//! use taskbus::store::{MemoryStore, MessageStore};
//!
//! # async fn example() -> taskbus::error::BusResult<()> {
//! let directory = AgentDirectory::new(
//!     vec![AgentProfile::new("a"), AgentProfile::new("b")],
//!     "a".to_string(),
//! );
//! let store = Arc::new(MemoryStore::new(directory));
//!
//! let sent = store
//!     .send("a", "b", MessageType::Delegation, json!({"task_id": 42}), None)
//!     .await?;
//! let inbox = store.receive("b", None, 10, None).await?;
//! store.acknowledge(inbox[0].id, "b").await?;
//! # let _ = sent;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod consumer;
pub mod directory;
pub mod error;
pub mod impact;
pub mod knowledge;
pub mod monitor;
pub mod observability;
pub mod protocol;
pub mod recovery;
pub mod routing;
pub mod store;

pub use classify::{BusinessImpact, Classifier, TaskCategory};
pub use config::BusConfig;
pub use consumer::{HandlerFailure, MessageHandler, PollingConsumer};
pub use directory::{AgentDirectory, AgentProfile};
pub use error::{BusError, BusResult};
pub use protocol::{Message, MessageStatus, MessageType, Severity};
pub use routing::{RoutingDecision, SpecializationRouter};
pub use store::{MemoryStore, MessageStore};
