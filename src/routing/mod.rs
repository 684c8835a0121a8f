//! Specialization-aware routing
//!
//! Turns a free-text task description into a routing decision: category,
//! required capabilities, business impact, the best-fit agent under its
//! load ceiling, and a human-readable reasoning trail. A separate checker
//! flags assignments that land outside an agent's declared profile.

pub mod router;
pub mod violations;

pub use router::{LoadStatus, RoutingDecision, SpecializationRouter};
pub use violations::{ViolationChecker, ViolationKind, ViolationReport};
