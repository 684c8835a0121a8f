//! Bus metrics
//!
//! Atomic counters covering the monitor loop and consumers. Constructed
//! once and shared by Arc; never a module-level global, so independent
//! test instances stay independent.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Thread-safe metrics collector for one bus instance
#[derive(Debug)]
pub struct BusMetrics {
    scans_completed: AtomicU64,
    blockers_detected: AtomicU64,
    predictive_alerts: AtomicU64,
    handler_failures: AtomicU64,
    recoveries_exhausted: AtomicU64,
    knowledge_items: AtomicU64,
    /// Composite health score, rounded to an integer
    last_health_score: AtomicU64,
    uptime_start: u64,
}

impl Default for BusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BusMetrics {
    pub fn new() -> Self {
        Self {
            scans_completed: AtomicU64::new(0),
            blockers_detected: AtomicU64::new(0),
            predictive_alerts: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            recoveries_exhausted: AtomicU64::new(0),
            knowledge_items: AtomicU64::new(0),
            last_health_score: AtomicU64::new(100),
            uptime_start: now_secs(),
        }
    }

    pub fn record_scan(&self, blockers_found: u64) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
        self.blockers_detected
            .fetch_add(blockers_found, Ordering::Relaxed);
    }

    pub fn record_predictive_alert(&self) {
        self.predictive_alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery_exhausted(&self) {
        self.recoveries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_knowledge_items(&self, count: u64) {
        self.knowledge_items.store(count, Ordering::Relaxed);
    }

    pub fn set_health_score(&self, composite: f64) {
        self.last_health_score
            .store(composite.round().clamp(0.0, 100.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            blockers_detected: self.blockers_detected.load(Ordering::Relaxed),
            predictive_alerts: self.predictive_alerts.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            recoveries_exhausted: self.recoveries_exhausted.load(Ordering::Relaxed),
            knowledge_items: self.knowledge_items.load(Ordering::Relaxed),
            last_health_score: self.last_health_score.load(Ordering::Relaxed),
            uptime_seconds: now_secs().saturating_sub(self.uptime_start),
        }
    }
}

/// Point-in-time serializable metrics view
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub scans_completed: u64,
    pub blockers_detected: u64,
    pub predictive_alerts: u64,
    pub handler_failures: u64,
    pub recoveries_exhausted: u64,
    pub knowledge_items: u64,
    pub last_health_score: u64,
    pub uptime_seconds: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
