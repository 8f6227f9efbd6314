//! Process-wide performance counters.
//!
//! [`PerformanceMetrics`] is owned by the composition root and shared behind
//! `Arc`. Every completed operation records itself once; cache lookups record
//! their outcome separately. All updates go through one mutex so the running
//! average never loses an update.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Read-only view of the counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Running average latency of completed requests, in milliseconds.
    pub avg_response_time_ms: f64,
}

impl MetricsSnapshot {
    /// Cache hit rate as a percentage of all cache lookups.
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / lookups as f64) * 100.0
        }
    }

    /// Failed requests as a percentage of all requests.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.failed_requests as f64 / self.total_requests as f64) * 100.0
        }
    }
}

/// Running counters shared by every request-handling task.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    state: Mutex<MetricsSnapshot>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed operation and folds its latency into the average.
    pub fn record_request(&self, latency: Duration, success: bool) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        let mut state = self.state.lock();
        state.total_requests += 1;
        if !success {
            state.failed_requests += 1;
        }
        let n = state.total_requests as f64;
        state.avg_response_time_ms += (latency_ms - state.avg_response_time_ms) / n;
    }

    pub fn record_cache_hit(&self) {
        self.state.lock().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.state.lock().cache_misses += 1;
    }

    /// Returns a copy of the current counters without modifying them.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_empty_snapshot() {
        let metrics = PerformanceMetrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot, MetricsSnapshot::default());
        assert!((snapshot.cache_hit_rate() - 0.0).abs() < f64::EPSILON);
        assert!((snapshot.error_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_running_average() {
        let metrics = PerformanceMetrics::new();
        metrics.record_request(Duration::from_millis(10), true);
        metrics.record_request(Duration::from_millis(20), true);
        metrics.record_request(Duration::from_millis(30), false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.failed_requests, 1);
        assert!((snapshot.avg_response_time_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_has_no_side_effects() {
        let metrics = PerformanceMetrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        assert_eq!(metrics.snapshot(), metrics.snapshot());
        assert_eq!(metrics.snapshot().cache_hits, 1);
        assert!((metrics.snapshot().cache_hit_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let metrics = Arc::new(PerformanceMetrics::new());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_request(Duration::from_millis(1), true);
                        metrics.record_cache_hit();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 8000);
        assert_eq!(snapshot.cache_hits, 8000);
        assert!((snapshot.avg_response_time_ms - 1.0).abs() < 1e-6);
    }
}
