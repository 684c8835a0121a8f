//! Stream monitoring
//!
//! Read-only scanners over the trailing message window: the blocker
//! detector pattern-matches stalls and degradation, the risk predictor
//! folds normalized factors into a heuristic stall probability, and the
//! health scorer condenses the stream into a 0-100 composite. All three
//! are best-effort; an internal failure is logged and skipped, never
//! propagated to the host.

pub mod blockers;
pub mod health;
pub mod predictor;

pub use blockers::{BlockerAlert, BlockerDetector, BlockerPattern};
pub use health::{HealthReport, HealthScorer};
pub use predictor::{RiskAssessment, RiskPredictor};
