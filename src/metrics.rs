//! Metrics registry (part of capability J). Plain atomics where possible,
//! per the design's concurrency guidance, rather than pulling in a
//! metrics-exporter crate the spec doesn't ask for.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Default)]
pub struct PoolMetrics {
    pub active_browsers: AtomicUsize,
    pub idle_browsers: AtomicUsize,
    pub total_pages: AtomicUsize,
    pub queue_depth: AtomicUsize,
    pub launches_total: AtomicU64,
    pub launch_failures_total: AtomicU64,
    pub recycles_total: AtomicU64,
    pub acquire_timeouts_total: AtomicU64,
    pub circuit_opens_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PoolMetricsSnapshot {
    pub active_browsers: usize,
    pub idle_browsers: usize,
    pub total_pages: usize,
    pub queue_depth: usize,
    pub launches_total: u64,
    pub launch_failures_total: u64,
    pub recycles_total: u64,
    pub acquire_timeouts_total: u64,
    pub circuit_opens_total: u64,
    pub utilization: f64,
}

impl PoolMetrics {
    pub fn snapshot(&self, max_size: usize) -> PoolMetricsSnapshot {
        let active = self.active_browsers.load(Ordering::Relaxed);
        PoolMetricsSnapshot {
            active_browsers: active,
            idle_browsers: self.idle_browsers.load(Ordering::Relaxed),
            total_pages: self.total_pages.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            launches_total: self.launches_total.load(Ordering::Relaxed),
            launch_failures_total: self.launch_failures_total.load(Ordering::Relaxed),
            recycles_total: self.recycles_total.load(Ordering::Relaxed),
            acquire_timeouts_total: self.acquire_timeouts_total.load(Ordering::Relaxed),
            circuit_opens_total: self.circuit_opens_total.load(Ordering::Relaxed),
            utilization: if max_size == 0 {
                0.0
            } else {
                active as f64 / max_size as f64
            },
        }
    }
}

#[derive(Default)]
pub struct ActionMetrics {
    pub dispatched_total: AtomicU64,
    pub succeeded_total: AtomicU64,
    pub failed_total: AtomicU64,
    pub retried_total: AtomicU64,
}
