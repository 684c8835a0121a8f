//! Health and metrics HTTP endpoints
//!
//! Small warp server for operators and container orchestration:
//! `/health` (store probe + composite score), `/metrics` (counter
//! snapshot), `/ready`, and `/live`. External dashboards speak the bus
//! contract through send/receive/acknowledge, never through these
//! endpoints.

use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;
use warp::Filter;

use crate::observability::metrics::{BusMetrics, MetricsSnapshot};
use crate::store::{MessageStore, StoreHealth, StoreStatus};

/// HTTP health check server for one bus instance
pub struct HealthServer<S: MessageStore> {
    port: u16,
    store: Arc<S>,
    metrics: Arc<BusMetrics>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: StoreHealth,
    metrics: MetricsSnapshot,
}

#[derive(Serialize)]
struct ProbeResponse {
    status: &'static str,
}

impl<S: MessageStore + 'static> HealthServer<S> {
    pub fn new(port: u16, store: Arc<S>, metrics: Arc<BusMetrics>) -> Self {
        Self {
            port,
            store,
            metrics,
        }
    }

    /// Start serving; runs until the task is dropped
    pub async fn start(self: Arc<Self>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let health_server = self.clone();
        let metrics_server = self.clone();
        let ready_server = self.clone();

        // GET /health - store probe plus metrics snapshot
        let health_route = warp::path("health").and(warp::get()).and_then(move || {
            let server = health_server.clone();
            async move {
                let store = server.store.health_check().await;
                let healthy = store.status == StoreStatus::Healthy;
                let response = HealthResponse {
                    status: if healthy { "healthy" } else { "unhealthy" },
                    store,
                    metrics: server.metrics.snapshot(),
                };
                let code = if healthy { 200 } else { 503 };
                Ok::<_, Infallible>(warp::reply::with_status(
                    warp::reply::json(&response),
                    warp::http::StatusCode::from_u16(code).unwrap(),
                ))
            }
        });

        // GET /metrics - counter snapshot only
        let metrics_route = warp::path("metrics").and(warp::get()).and_then(move || {
            let server = metrics_server.clone();
            async move {
                Ok::<_, Infallible>(warp::reply::json(&server.metrics.snapshot()))
            }
        });

        // GET /ready - store reachable
        let ready_route = warp::path("ready").and(warp::get()).and_then(move || {
            let server = ready_server.clone();
            async move {
                let store = server.store.health_check().await;
                let ready = store.status == StoreStatus::Healthy;
                let code = if ready { 200 } else { 503 };
                Ok::<_, Infallible>(warp::reply::with_status(
                    warp::reply::json(&ProbeResponse {
                        status: if ready { "ready" } else { "not_ready" },
                    }),
                    warp::http::StatusCode::from_u16(code).unwrap(),
                ))
            }
        });

        // GET /live - process is up
        let live_route = warp::path("live").and(warp::get()).map(|| {
            warp::reply::json(&ProbeResponse { status: "alive" })
        });

        let routes = health_route
            .or(metrics_route)
            .or(ready_route)
            .or(live_route);

        info!(port = self.port, "health server listening");
        warp::serve(routes).run(([0, 0, 0, 0], self.port)).await;
        Ok(())
    }
}
