//! Pool statistics: running counters and derived snapshots
//!
//! Counters are lock-free atomics updated on the hot path. [`PoolStats`] is
//! derived at call time; it may be slightly stale relative to concurrent
//! mutation, which is fine for an observability surface.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Running request and failure counters for one pool
#[derive(Debug)]
pub(crate) struct PoolCounters {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_response_time_us: AtomicU64,
    waiting_requests: AtomicU64,
    connection_errors: AtomicU64,
    health_check_failures: AtomicU64,
    started_at: Instant,
}

impl PoolCounters {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            waiting_requests: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            health_check_failures: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Count a new acquire request and mark it waiting until the guard drops
    pub fn begin_request(&self) -> WaitingGuard<'_> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.waiting_requests.fetch_add(1, Ordering::Relaxed);
        WaitingGuard { counters: self }
    }

    pub fn record_success(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_response_time_us
            .fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_health_check_failure(&self) {
        self.health_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Combine counters with live connection counts into a snapshot
    pub fn snapshot(&self, counts: ConnectionCounts) -> PoolStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_response_time_us = self.total_response_time_us.load(Ordering::Relaxed);

        let average_response_time_ms = if total_requests == 0 {
            0.0
        } else {
            total_response_time_us as f64 / total_requests as f64 / 1000.0
        };

        let pool_utilization = if counts.total == 0 {
            0
        } else {
            ((counts.active as f64 / counts.total as f64) * 100.0)
                .round()
                .clamp(0.0, 100.0) as u8
        };

        PoolStats {
            pool_count: counts.pools,
            total_connections: counts.total,
            active_connections: counts.active,
            idle_connections: counts.total.saturating_sub(counts.active),
            pending_connections: counts.pending,
            waiting_requests: self.waiting_requests.load(Ordering::Relaxed),
            total_requests,
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time_ms,
            pool_utilization,
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

/// Decrements the waiting counter when an acquire finishes, however it ends
pub(crate) struct WaitingGuard<'a> {
    counters: &'a PoolCounters,
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.counters.waiting_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Live connection counts summed across sub-pools
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ConnectionCounts {
    pub pools: usize,
    pub total: usize,
    pub active: usize,
    pub pending: usize,
}

/// Point-in-time view of a pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    /// Number of distinct pool keys
    pub pool_count: usize,
    pub total_connections: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    /// Connections currently being opened
    pub pending_connections: usize,
    pub waiting_requests: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    /// Total successful acquire time divided by all requests
    pub average_response_time_ms: f64,
    /// `active / total` as a rounded percentage, 0 when empty
    pub pool_utilization: u8,
    pub connection_errors: u64,
    pub health_check_failures: u64,
    pub uptime: Duration,
}

impl PoolStats {
    /// Percentage of requests that succeeded (100 when nothing was requested)
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            100.0
        } else {
            let succeeded = self.total_requests.saturating_sub(self.failed_requests);
            (succeeded as f64 / self.total_requests as f64) * 100.0
        }
    }

    /// Requests per second since the pool was built
    pub fn throughput(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.total_requests as f64 / secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let counters = PoolCounters::new();
        let stats = counters.snapshot(ConnectionCounts::default());
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.average_response_time_ms, 0.0);
        assert_eq!(stats.pool_utilization, 0);
        assert_eq!(stats.success_rate(), 100.0);
    }

    #[test]
    fn test_waiting_guard_decrements() {
        let counters = PoolCounters::new();
        {
            let _first = counters.begin_request();
            let _second = counters.begin_request();
            let stats = counters.snapshot(ConnectionCounts::default());
            assert_eq!(stats.waiting_requests, 2);
        }
        let stats = counters.snapshot(ConnectionCounts::default());
        assert_eq!(stats.waiting_requests, 0);
        assert_eq!(stats.total_requests, 2);
    }

    #[test]
    fn test_derived_metrics() {
        let counters = PoolCounters::new();
        for _ in 0..4 {
            drop(counters.begin_request());
        }
        counters.record_success(Duration::from_millis(10));
        counters.record_success(Duration::from_millis(30));
        counters.record_failure();

        let stats = counters.snapshot(ConnectionCounts {
            pools: 1,
            total: 3,
            active: 2,
            pending: 0,
        });

        // 40ms of successful acquire time spread over 4 requests
        assert!((stats.average_response_time_ms - 10.0).abs() < f64::EPSILON);
        assert_eq!(stats.pool_utilization, 67);
        assert_eq!(stats.idle_connections, 1);
        assert!((stats.success_rate() - 75.0).abs() < f64::EPSILON);
    }
}
