//! Observability: structured logging, bus metrics, and the HTTP
//! health/metrics endpoints.

pub mod logging;
pub mod metrics;
pub mod server;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use server::HealthServer;
