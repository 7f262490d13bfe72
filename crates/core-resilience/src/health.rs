//! Periodic health checks and idle eviction per pool key
//!
//! Each key with at least one entry gets a tokio task that wakes every
//! `health_check_interval`. A cycle probes the idle entries concurrently
//! (outside the registry lock, each probe bounded by
//! `connection_validation_timeout`), then applies the results under the lock:
//!
//! 1. a probe success resets `error_count`; a failure bumps it and marks the
//!    entry unhealthy
//! 2. idle entries with [`MAX_ENTRY_ERRORS`] consecutive failures are evicted
//! 3. idle entries past `max_idle_time` are evicted in pool order, never
//!    taking the sub-pool below `min_connections`
//! 4. entries that are healthy again go to queued waiters
//!
//! In-use entries are never evicted. The task exits once its sub-pool is
//! empty and is respawned by the next connection created for that key.

use crate::connection_pool::{ConnectionFactory, ConnectionPool, PoolInner};
use crate::registry::{PoolKey, MAX_ENTRY_ERRORS};
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Handle of a running health task
///
/// A task keeps running only while the map still holds its generation, so a
/// stale task never survives the spawn of its replacement.
pub(crate) struct HealthTask {
    generation: u64,
    pub handle: JoinHandle<()>,
}

/// Outcome of one health-check cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Idle entries probed
    pub probed: usize,
    /// Probes that failed or timed out
    pub failed: usize,
    /// Entries evicted for reaching the failure threshold
    pub evicted_unhealthy: usize,
    /// Entries evicted for idling past `max_idle_time`
    pub evicted_idle: usize,
    /// Entries left in the sub-pool
    pub remaining: usize,
}

impl<F: ConnectionFactory> PoolInner<F> {
    /// Start the background health task for `key` unless one is running
    pub(crate) fn ensure_health_task(&self, key: &PoolKey) {
        let interval = self.config.health_check_interval;
        if interval.is_zero() || self.is_closed() {
            return;
        }

        let mut tasks = self.health_tasks.lock();
        if tasks.get(key).is_some_and(|task| !task.handle.is_finished()) {
            return;
        }

        debug!(key = %key, interval_ms = interval.as_millis() as u64, "starting health checks");
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(health_loop(
            self.this.clone(),
            key.clone(),
            interval,
            generation,
        ));
        tasks.insert(key.clone(), HealthTask { generation, handle });
    }

    fn owns_health_task(&self, key: &PoolKey, generation: u64) -> bool {
        self.health_tasks
            .lock()
            .get(key)
            .is_some_and(|task| task.generation == generation)
    }

    /// Run one probe-and-evict cycle for `key`
    pub(crate) async fn health_cycle(&self, key: &PoolKey) -> HealthReport {
        let idle: Vec<(u64, F::Connection)> = {
            let registry = self.registry.lock();
            match registry.pools.get(key) {
                Some(sub) => sub
                    .entries
                    .iter()
                    .filter(|e| !e.in_use)
                    .map(|e| (e.id, e.connection.clone()))
                    .collect(),
                None => return HealthReport::default(),
            }
        };

        let limit = self.config.connection_validation_timeout;
        let probes = idle.into_iter().map(|(id, connection)| async move {
            let healthy = match timeout(limit, self.factory.validate(&connection)).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    debug!(key = %key, entry_id = id, error = %e, "health probe failed");
                    false
                }
                Err(_) => {
                    debug!(key = %key, entry_id = id, "health probe timed out");
                    false
                }
            };
            (id, healthy)
        });
        let results = join_all(probes).await;

        let mut report = HealthReport {
            probed: results.len(),
            ..Default::default()
        };

        let evicted = {
            let mut registry = self.registry.lock();
            let Some(sub) = registry.pools.get_mut(key) else {
                return report;
            };
            let now = Instant::now();

            for (id, healthy) in results {
                if let Some(entry) = sub.entry_mut(id) {
                    entry.record_probe(healthy, now);
                }
                if !healthy {
                    report.failed += 1;
                    self.counters.record_health_check_failure();
                }
            }

            let mut evicted = Vec::new();

            let mut index = 0;
            while index < sub.entries.len() {
                let entry = &sub.entries[index];
                if !entry.in_use && entry.error_count >= MAX_ENTRY_ERRORS {
                    evicted.push(sub.entries.remove(index));
                    report.evicted_unhealthy += 1;
                } else {
                    index += 1;
                }
            }

            let mut removable = sub
                .entries
                .len()
                .saturating_sub(self.config.min_connections);
            let mut index = 0;
            while index < sub.entries.len() && removable > 0 {
                let entry = &sub.entries[index];
                if !entry.in_use && entry.idle_for(now) > self.config.max_idle_time {
                    evicted.push(sub.entries.remove(index));
                    report.evicted_idle += 1;
                    removable -= 1;
                } else {
                    index += 1;
                }
            }

            self.dispatch_idle(key, sub);
            for _ in 0..evicted.len() {
                sub.signal_capacity();
            }

            report.remaining = sub.entries.len();
            if sub.entries.is_empty() {
                if sub.is_vacant() {
                    registry.pools.remove(key);
                }
                self.health_tasks.lock().remove(key);
            }
            evicted
        };

        if !evicted.is_empty() {
            info!(
                key = %key,
                unhealthy = report.evicted_unhealthy,
                idle = report.evicted_idle,
                "evicted connections"
            );
        }
        if report.failed > 0 {
            warn!(key = %key, failed = report.failed, probed = report.probed, "health check failures");
        }

        join_all(
            evicted
                .into_iter()
                .map(|entry| self.close_connection(key, entry.connection)),
        )
        .await;

        report
    }
}

async fn health_loop<F: ConnectionFactory>(
    pool: Weak<PoolInner<F>>,
    key: PoolKey,
    period: Duration,
    generation: u64,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(inner) = pool.upgrade() else {
            break;
        };
        if inner.is_closed() || !inner.owns_health_task(&key, generation) {
            break;
        }
        if inner.health_cycle(&key).await.remaining == 0 {
            debug!(key = %key, "sub-pool empty, stopping health checks");
            break;
        }
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Run one health-check cycle for `credentials` now
    pub async fn run_health_check(&self, credentials: &F::Credentials) -> HealthReport {
        let key = self.key_for(credentials);
        self.inner.health_cycle(&key).await
    }
}
