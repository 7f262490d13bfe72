//! Pool entry registry: per-key sub-pools of tracked connections
//!
//! The registry is plain data. Every mutation happens inside a short,
//! synchronous critical section owned by the pool; nothing here awaits.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::connection_pool::PooledConnection;

/// Consecutive failures after which an idle entry is evicted
pub const MAX_ENTRY_ERRORS: u32 = 3;

/// Identity of a sub-pool
///
/// Connections are never shared across keys, so two credential sets share a
/// sub-pool only when they resolve to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PoolKey(String);

impl PoolKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoolKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for PoolKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// One live connection plus its lifecycle metadata
#[derive(Debug)]
pub(crate) struct PoolEntry<C> {
    pub id: u64,
    /// Bumped on every checkout; a handle is only honoured for its own lease
    pub lease: u64,
    pub connection: C,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub last_health_check_at: Option<Instant>,
    pub is_healthy: bool,
    pub in_use: bool,
    pub error_count: u32,
}

impl<C> PoolEntry<C> {
    /// A freshly created entry, already checked out by its creator
    pub fn checked_out(id: u64, connection: C) -> Self {
        let now = Instant::now();
        Self {
            id,
            lease: 1,
            connection,
            created_at: now,
            last_used_at: now,
            last_health_check_at: None,
            is_healthy: true,
            in_use: true,
            error_count: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        !self.in_use && self.is_healthy
    }

    /// Mark checked out and start a new lease
    pub fn check_out(&mut self) -> u64 {
        self.in_use = true;
        self.lease += 1;
        self.last_used_at = Instant::now();
        self.lease
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }

    pub fn record_probe(&mut self, healthy: bool, now: Instant) {
        self.last_health_check_at = Some(now);
        if healthy {
            self.error_count = 0;
            self.is_healthy = true;
        } else {
            self.error_count += 1;
            self.is_healthy = false;
        }
    }

    pub fn snapshot(&self, now: Instant) -> EntrySnapshot {
        EntrySnapshot {
            id: self.id,
            in_use: self.in_use,
            is_healthy: self.is_healthy,
            error_count: self.error_count,
            age: now.saturating_duration_since(self.created_at),
            idle_for: self.idle_for(now),
            since_health_check: self
                .last_health_check_at
                .map(|at| now.saturating_duration_since(at)),
        }
    }
}

/// Read-only view of one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySnapshot {
    pub id: u64,
    pub in_use: bool,
    pub is_healthy: bool,
    pub error_count: u32,
    pub age: Duration,
    pub idle_for: Duration,
    pub since_health_check: Option<Duration>,
}

/// Message delivered to a queued acquirer
pub(crate) enum Handoff<C: Send + Sync + 'static> {
    /// A released entry, already checked out for the waiter
    Entry(PooledConnection<C>),
    /// Capacity was freed; the waiter should try to create a connection
    Capacity,
}

/// All entries for one pool key
pub(crate) struct SubPool<C: Send + Sync + 'static> {
    pub entries: Vec<PoolEntry<C>>,
    /// Creations in flight; they count toward the size bound
    pub pending: usize,
    pub waiters: VecDeque<oneshot::Sender<Handoff<C>>>,
}

impl<C: Send + Sync + 'static> Default for SubPool<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            pending: 0,
            waiters: VecDeque::new(),
        }
    }
}

impl<C: Send + Sync + 'static> SubPool<C> {
    /// Entries plus reserved slots
    pub fn size(&self) -> usize {
        self.entries.len() + self.pending
    }

    pub fn active(&self) -> usize {
        self.entries.iter().filter(|e| e.in_use).count()
    }

    pub fn entry_mut(&mut self, id: u64) -> Option<&mut PoolEntry<C>> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn remove(&mut self, id: u64) -> Option<PoolEntry<C>> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Drop waiters whose acquire already gave up
    pub fn prune_waiters(&mut self) {
        self.waiters.retain(|tx| !tx.is_closed());
    }

    /// Tell the first live waiter that a slot is free
    pub fn signal_capacity(&mut self) {
        while let Some(tx) = self.waiters.pop_front() {
            if tx.send(Handoff::Capacity).is_ok() {
                return;
            }
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.entries.is_empty() && self.pending == 0 && self.waiters.is_empty()
    }
}

/// Keyed collection of sub-pools
pub(crate) struct Registry<C: Send + Sync + 'static> {
    pub pools: HashMap<PoolKey, SubPool<C>>,
    next_id: u64,
}

impl<C: Send + Sync + 'static> Default for Registry<C> {
    fn default() -> Self {
        Self {
            pools: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<C: Send + Sync + 'static> Registry<C> {
    pub fn next_entry_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_resets_error_count() {
        let now = Instant::now();
        let mut entry = PoolEntry::checked_out(1, ());
        entry.in_use = false;

        entry.record_probe(false, now);
        entry.record_probe(false, now);
        assert_eq!(entry.error_count, 2);
        assert!(!entry.is_available());

        entry.record_probe(true, now);
        assert_eq!(entry.error_count, 0);
        assert!(entry.is_available());
    }

    #[test]
    fn test_check_out_bumps_lease() {
        let mut entry = PoolEntry::checked_out(7, ());
        assert_eq!(entry.lease, 1);
        entry.in_use = false;
        assert_eq!(entry.check_out(), 2);
        assert!(entry.in_use);
    }

    #[test]
    fn test_signal_capacity_skips_abandoned_waiters() {
        let mut sub: SubPool<()> = SubPool::default();
        let (gone_tx, gone_rx) = oneshot::channel();
        let (live_tx, mut live_rx) = oneshot::channel();
        drop(gone_rx);
        sub.waiters.push_back(gone_tx);
        sub.waiters.push_back(live_tx);

        sub.signal_capacity();

        assert!(matches!(live_rx.try_recv(), Ok(Handoff::Capacity)));
        assert!(sub.waiters.is_empty());
    }

    #[test]
    fn test_pool_key_display() {
        let key = PoolKey::from("ws://db:8000|app|main|root:admin");
        assert_eq!(key.to_string(), "ws://db:8000|app|main|root:admin");
        assert_eq!(key.as_str(), key.to_string());
    }
}
