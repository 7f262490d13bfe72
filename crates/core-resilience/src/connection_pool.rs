//! Keyed connection pool with FIFO hand-off and background health checks
//!
//! Connections are partitioned into sub-pools by [`PoolKey`]; a connection is
//! never shared across keys. All registry mutations (scan-and-mark, append,
//! remove) happen inside one synchronous critical section that is never held
//! across an `.await`.
//!
//! Under contention an acquirer joins a FIFO queue for its key. A release hands
//! the returned entry straight to the oldest live waiter; freed capacity
//! (eviction, failed creation) wakes the oldest waiter so it can create a
//! replacement.

use crate::error::ResilienceError;
use crate::health::HealthTask;
use crate::registry::{EntrySnapshot, Handoff, PoolEntry, PoolKey, Registry, SubPool};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::stats::{ConnectionCounts, PoolCounters, PoolStats};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration for pool behavior
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Upper bound on connections per pool key
    pub max_connections: usize,
    /// Floor that idle eviction never goes below
    pub min_connections: usize,
    /// How long an acquire may wait for capacity
    pub acquire_timeout: Duration,
    /// Period of the background health check; zero disables it
    pub health_check_interval: Duration,
    /// Idle time after which an entry becomes an eviction candidate
    pub max_idle_time: Duration,
    /// Retries when opening a connection fails transiently
    pub retry_attempts: u32,
    /// Base delay between connection retries
    pub retry_delay: Duration,
    /// Round-trip every connection before handing it out
    pub enable_connection_validation: bool,
    /// Bound for validation and health-check probes
    pub connection_validation_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            max_idle_time: Duration::from_secs(300), // 5 minutes
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            enable_connection_validation: true,
            connection_validation_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    /// Check the configuration, collecting every violation
    pub fn validate(&self) -> Result<(), ResilienceError> {
        let mut violations = Vec::new();

        if self.max_connections == 0 {
            violations.push("max_connections must be at least 1".to_string());
        }
        if self.min_connections > self.max_connections {
            violations.push(format!(
                "min_connections ({}) must not exceed max_connections ({})",
                self.min_connections, self.max_connections
            ));
        }
        let probes_enabled =
            self.enable_connection_validation || !self.health_check_interval.is_zero();
        if probes_enabled && self.connection_validation_timeout.is_zero() {
            violations.push(
                "connection_validation_timeout must be greater than zero when validation or health checks are enabled"
                    .to_string(),
            );
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ResilienceError::InvalidConfig(violations))
        }
    }

    fn connection_retry(&self) -> RetryConfig {
        RetryConfig::for_connections(self.retry_attempts, self.retry_delay)
    }
}

/// Opens, probes and closes connections for the pool
///
/// `pool_key` decides which sub-pool a credential set belongs to; two
/// credential sets must only map to the same key when they authenticate as the
/// same identity.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Identity the pool is keyed by
    type Credentials: Send + Sync;
    /// Connection handle; clones must refer to the same underlying connection
    type Connection: Clone + Send + Sync + 'static;

    /// Derive the sub-pool key for a credential set
    fn pool_key(&self, credentials: &Self::Credentials) -> PoolKey;

    /// Open and authenticate a new connection
    async fn create(
        &self,
        credentials: &Self::Credentials,
    ) -> Result<Self::Connection, ResilienceError>;

    /// Trivial round-trip used for validation and health checks
    async fn validate(&self, connection: &Self::Connection) -> Result<(), ResilienceError>;

    /// Close a connection (best-effort)
    async fn close(&self, connection: Self::Connection) -> Result<(), ResilienceError> {
        drop(connection);
        Ok(())
    }
}

/// Returns a lease to the pool that issued it
pub(crate) trait LeaseReturn<C>: Send + Sync {
    fn return_lease(&self, key: &PoolKey, entry_id: u64, lease: u64);
}

/// A checked-out connection
///
/// Dereferences to the connection. Dropping the handle releases it, so a
/// connection is returned even when the caller bails out early; an explicit
/// [`ConnectionPool::release`] followed by the drop is harmless.
pub struct PooledConnection<C: Send + Sync + 'static> {
    connection: C,
    key: PoolKey,
    entry_id: u64,
    lease: u64,
    pool_id: u64,
    pool: Option<Weak<dyn LeaseReturn<C>>>,
}

impl<C: Send + Sync + 'static> PooledConnection<C> {
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Key of the sub-pool this connection belongs to
    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn entry_id(&self) -> u64 {
        self.entry_id
    }

    /// Drop without returning the lease
    ///
    /// Required wherever the registry lock is already held.
    pub(crate) fn disarm(mut self) {
        self.pool = None;
    }
}

impl<C: Send + Sync + 'static> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.connection
    }
}

impl<C: Send + Sync + 'static> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("key", &self.key)
            .field("entry_id", &self.entry_id)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl<C: Send + Sync + 'static> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take().and_then(|weak| weak.upgrade()) {
            pool.return_lease(&self.key, self.entry_id, self.lease);
        }
    }
}

/// Shared pool state
pub(crate) struct PoolInner<F: ConnectionFactory> {
    pub id: u64,
    pub factory: F,
    pub config: PoolConfig,
    pub registry: Mutex<Registry<F::Connection>>,
    /// Lock order: `registry` before `health_tasks`
    pub health_tasks: Mutex<HashMap<PoolKey, HealthTask>>,
    pub counters: PoolCounters,
    pub closed: AtomicBool,
    pub this: Weak<Self>,
}

impl<F: ConnectionFactory> PoolInner<F> {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn lease_handle(
        &self,
        key: &PoolKey,
        entry: &PoolEntry<F::Connection>,
        lease: u64,
    ) -> PooledConnection<F::Connection> {
        let pool: Weak<dyn LeaseReturn<F::Connection>> = self.this.clone();
        PooledConnection {
            connection: entry.connection.clone(),
            key: key.clone(),
            entry_id: entry.id,
            lease,
            pool_id: self.id,
            pool: Some(pool),
        }
    }

    /// Hand available entries to queued waiters, oldest waiter first
    ///
    /// Runs under the registry lock.
    pub fn dispatch_idle(&self, key: &PoolKey, sub: &mut SubPool<F::Connection>) {
        sub.prune_waiters();
        while let Some(tx) = sub.waiters.pop_front() {
            let Some(entry) = sub.entries.iter_mut().find(|e| e.is_available()) else {
                sub.waiters.push_front(tx);
                return;
            };
            let lease = entry.check_out();
            let handle = self.lease_handle(key, entry, lease);

            if let Err(Handoff::Entry(returned)) = tx.send(Handoff::Entry(handle)) {
                // Waiter gave up after pruning; undo the checkout
                let entry_id = returned.entry_id;
                returned.disarm();
                if let Some(entry) = sub.entry_mut(entry_id) {
                    entry.in_use = false;
                }
            }
        }
    }

    /// Remove an entry whose lease is still `lease`, freeing its slot
    fn evict_leased(&self, key: &PoolKey, entry_id: u64, lease: u64) -> Option<F::Connection> {
        let mut registry = self.registry.lock();
        let sub = registry.pools.get_mut(key)?;
        if sub.entry_mut(entry_id)?.lease != lease {
            return None;
        }
        let entry = sub.remove(entry_id)?;
        sub.signal_capacity();
        self.drop_if_vacant(&mut registry, key);
        Some(entry.connection)
    }

    /// Forget the sub-pool for `key` once it has no entries, reservations or waiters
    ///
    /// Runs under the registry lock.
    pub fn drop_if_vacant(&self, registry: &mut Registry<F::Connection>, key: &PoolKey) {
        let vacant = registry.pools.get_mut(key).is_some_and(|sub| {
            sub.prune_waiters();
            sub.is_vacant()
        });
        if vacant {
            registry.pools.remove(key);
            self.health_tasks.lock().remove(key);
        }
    }

    pub async fn close_connection(&self, key: &PoolKey, connection: F::Connection) {
        if let Err(e) = self.factory.close(connection).await {
            warn!(key = %key, error = %e, "failed to close connection");
        }
    }
}

impl<F: ConnectionFactory> LeaseReturn<F::Connection> for PoolInner<F> {
    fn return_lease(&self, key: &PoolKey, entry_id: u64, lease: u64) {
        let mut registry = self.registry.lock();
        let Some(sub) = registry.pools.get_mut(key) else {
            return;
        };
        let Some(entry) = sub.entry_mut(entry_id) else {
            return;
        };
        if !entry.in_use || entry.lease != lease {
            return;
        }

        entry.in_use = false;
        entry.last_used_at = Instant::now();
        debug!(key = %key, entry_id, "connection released");
        self.dispatch_idle(key, sub);
    }
}

/// A free slot reserved for a connection being opened
///
/// Dropping it uncommitted (failed or cancelled creation) frees the slot and
/// wakes the next waiter.
struct SlotReservation<'a, F: ConnectionFactory> {
    inner: &'a PoolInner<F>,
    key: &'a PoolKey,
    armed: bool,
}

impl<F: ConnectionFactory> SlotReservation<'_, F> {
    /// Turn the reservation into a checked-out entry; `None` once the pool is closed
    fn commit(mut self, connection: F::Connection) -> Option<PooledConnection<F::Connection>> {
        self.armed = false;
        let mut registry = self.inner.registry.lock();
        if self.inner.is_closed() {
            return None;
        }
        let id = registry.next_entry_id();
        let sub = registry.pools.entry(self.key.clone()).or_default();
        sub.pending = sub.pending.saturating_sub(1);
        let entry = PoolEntry::checked_out(id, connection);
        let handle = self.inner.lease_handle(self.key, &entry, entry.lease);
        sub.entries.push(entry);
        Some(handle)
    }
}

impl<F: ConnectionFactory> Drop for SlotReservation<'_, F> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut registry = self.inner.registry.lock();
        if let Some(sub) = registry.pools.get_mut(self.key) {
            sub.pending = sub.pending.saturating_sub(1);
            sub.signal_capacity();
        }
        self.inner.drop_if_vacant(&mut registry, self.key);
    }
}

enum Step<C: Send + Sync + 'static> {
    Ready(PooledConnection<C>),
    Create,
    Wait(oneshot::Receiver<Handoff<C>>),
}

/// A keyed connection pool
///
/// # Example
/// ```no_run
/// use surreal_core_resilience::{ConnectionFactory, ConnectionPool, PoolConfig, PoolKey, ResilienceError};
///
/// struct EchoFactory;
///
/// #[async_trait::async_trait]
/// impl ConnectionFactory for EchoFactory {
///     type Credentials = String;
///     type Connection = u64;
///
///     fn pool_key(&self, credentials: &String) -> PoolKey {
///         PoolKey::new(credentials.as_str())
///     }
///
///     async fn create(&self, _credentials: &String) -> Result<u64, ResilienceError> {
///         Ok(42)
///     }
///
///     async fn validate(&self, _connection: &u64) -> Result<(), ResilienceError> {
///         Ok(())
///     }
/// }
///
/// # async fn example() -> Result<(), ResilienceError> {
/// let pool = ConnectionPool::new(EchoFactory, PoolConfig::default())?;
/// let credentials = "tenant-a".to_string();
///
/// let conn = pool.acquire(&credentials).await?;
/// assert_eq!(*conn, 42);
/// pool.release(&credentials, &conn);
///
/// pool.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool<F: ConnectionFactory> {
    pub(crate) inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("closed", &self.inner.is_closed())
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool; the configuration is validated before anything else
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, ResilienceError> {
        config.validate()?;

        let inner = Arc::new_cyclic(|this| PoolInner {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            factory,
            config,
            registry: Mutex::new(Registry::default()),
            health_tasks: Mutex::new(HashMap::new()),
            counters: PoolCounters::new(),
            closed: AtomicBool::new(false),
            this: this.clone(),
        });

        Ok(Self { inner })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Sub-pool key for a credential set
    pub fn key_for(&self, credentials: &F::Credentials) -> PoolKey {
        self.inner.factory.pool_key(credentials)
    }

    /// Acquire a connection for `credentials`
    ///
    /// Reuses an idle healthy entry, opens a new one while the sub-pool is
    /// under `max_connections`, or queues until one is handed over. Fails with
    /// [`ResilienceError::PoolExhausted`] once `acquire_timeout` elapses.
    pub async fn acquire(
        &self,
        credentials: &F::Credentials,
    ) -> Result<PooledConnection<F::Connection>, ResilienceError> {
        let inner = &self.inner;
        let key = inner.factory.pool_key(credentials);
        let started = Instant::now();
        let _waiting = inner.counters.begin_request();

        let result = self.acquire_for_key(&key, credentials, started).await;
        match &result {
            Ok(conn) => {
                inner.counters.record_success(started.elapsed());
                debug!(key = %key, entry_id = conn.entry_id, "connection acquired");
            }
            Err(e) => {
                inner.counters.record_failure();
                debug!(key = %key, error = %e, "acquire failed");
            }
        }
        result
    }

    async fn acquire_for_key(
        &self,
        key: &PoolKey,
        credentials: &F::Credentials,
        started: Instant,
    ) -> Result<PooledConnection<F::Connection>, ResilienceError> {
        let inner = &self.inner;
        let deadline = started + inner.config.acquire_timeout;
        let mut requeue_at_front = false;

        loop {
            let step = {
                let mut registry = inner.registry.lock();
                if inner.is_closed() {
                    return Err(ResilienceError::PoolClosed);
                }
                let sub = registry.pools.entry(key.clone()).or_default();

                let available = sub.entries.iter().position(|e| e.is_available());
                if let Some(index) = available {
                    let entry = &mut sub.entries[index];
                    let lease = entry.check_out();
                    Step::Ready(inner.lease_handle(key, entry, lease))
                } else if sub.size() < inner.config.max_connections {
                    sub.pending += 1;
                    Step::Create
                } else {
                    let (tx, rx) = oneshot::channel();
                    if requeue_at_front {
                        sub.waiters.push_front(tx);
                    } else {
                        sub.waiters.push_back(tx);
                    }
                    Step::Wait(rx)
                }
            };

            match step {
                Step::Ready(conn) => return self.validated(conn).await,
                Step::Create => {
                    let reservation = SlotReservation {
                        inner,
                        key,
                        armed: true,
                    };
                    let conn = self.create_connection(reservation, key, credentials).await?;
                    return self.validated(conn).await;
                }
                Step::Wait(rx) => match self.wait_for_handoff(key, rx, deadline).await? {
                    Handoff::Entry(conn) => return self.validated(conn).await,
                    Handoff::Capacity => requeue_at_front = true,
                },
            }
        }
    }

    async fn wait_for_handoff(
        &self,
        key: &PoolKey,
        mut rx: oneshot::Receiver<Handoff<F::Connection>>,
        deadline: Instant,
    ) -> Result<Handoff<F::Connection>, ResilienceError> {
        let outcome = tokio::select! {
            handoff = &mut rx => Some(handoff),
            _ = sleep_until(deadline) => None,
        };

        match outcome {
            Some(Ok(handoff)) => Ok(handoff),
            // Sender dropped: only happens when the registry is torn down
            Some(Err(_)) => Err(ResilienceError::PoolClosed),
            None => {
                rx.close();
                let handoff = rx.try_recv();
                let mut registry = self.inner.registry.lock();
                match handoff {
                    // Handed over just as the deadline hit; keep it
                    Ok(Handoff::Entry(conn)) => Ok(Handoff::Entry(conn)),
                    Ok(Handoff::Capacity) => {
                        // Pass the wake-up on so the slot is not lost
                        if let Some(sub) = registry.pools.get_mut(key) {
                            sub.signal_capacity();
                        }
                        self.inner.drop_if_vacant(&mut registry, key);
                        Err(self.exhausted(key))
                    }
                    Err(_) => {
                        self.inner.drop_if_vacant(&mut registry, key);
                        Err(self.exhausted(key))
                    }
                }
            }
        }
    }

    fn exhausted(&self, key: &PoolKey) -> ResilienceError {
        warn!(
            key = %key,
            timeout_ms = self.inner.config.acquire_timeout.as_millis() as u64,
            "connection pool exhausted"
        );
        ResilienceError::PoolExhausted {
            key: key.to_string(),
            timeout: self.inner.config.acquire_timeout,
        }
    }

    async fn create_connection(
        &self,
        reservation: SlotReservation<'_, F>,
        key: &PoolKey,
        credentials: &F::Credentials,
    ) -> Result<PooledConnection<F::Connection>, ResilienceError> {
        let inner = &self.inner;
        let retry = inner.config.connection_retry();

        let connection = match retry_with_backoff(
            || inner.factory.create(credentials),
            &retry,
            "create connection",
        )
        .await
        {
            Ok(connection) => connection,
            Err(e) => {
                inner.counters.record_connection_error();
                warn!(key = %key, error = %e, "failed to create connection");
                return Err(e);
            }
        };

        match reservation.commit(connection.clone()) {
            Some(handle) => {
                info!(key = %key, entry_id = handle.entry_id, "created new connection");
                inner.ensure_health_task(key);
                Ok(handle)
            }
            None => {
                inner.close_connection(key, connection).await;
                Err(ResilienceError::PoolClosed)
            }
        }
    }

    /// Validate before handing out; a failing entry is evicted on the spot
    async fn validated(
        &self,
        conn: PooledConnection<F::Connection>,
    ) -> Result<PooledConnection<F::Connection>, ResilienceError> {
        let inner = &self.inner;
        if !inner.config.enable_connection_validation {
            return Ok(conn);
        }

        let limit = inner.config.connection_validation_timeout;
        let reason = match timeout(limit, inner.factory.validate(conn.connection())).await {
            Ok(Ok(())) => return Ok(conn),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("validation timed out after {limit:?}"),
        };

        let key = conn.key.clone();
        let (entry_id, lease) = (conn.entry_id, conn.lease);
        conn.disarm();

        warn!(key = %key, entry_id, reason = %reason, "connection failed validation, evicting");
        if let Some(connection) = inner.evict_leased(&key, entry_id, lease) {
            inner.close_connection(&key, connection).await;
        }

        Err(ResilienceError::ValidationFailed {
            key: key.to_string(),
            reason,
        })
    }

    /// Return a connection to its sub-pool
    ///
    /// Never fails: unknown, foreign or already released handles are ignored.
    pub fn release(&self, credentials: &F::Credentials, conn: &PooledConnection<F::Connection>) {
        let key = self.inner.factory.pool_key(credentials);
        if conn.pool_id != self.inner.id || conn.key != key {
            debug!(key = %key, entry_id = conn.entry_id, "ignoring release of untracked connection");
            return;
        }
        self.inner.return_lease(&key, conn.entry_id, conn.lease);
    }

    /// Acquire, run `f` with the connection, then release it
    pub async fn with_connection<T, E, Op, Fut>(
        &self,
        credentials: &F::Credentials,
        op: Op,
    ) -> Result<T, E>
    where
        Op: FnOnce(F::Connection) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ResilienceError>,
    {
        let conn = self.acquire(credentials).await?;
        let result = op(conn.connection().clone()).await;
        self.release(credentials, &conn);
        result
    }

    /// Snapshot of every entry for `credentials`, in pool order
    pub fn entries(&self, credentials: &F::Credentials) -> Vec<EntrySnapshot> {
        let key = self.inner.factory.pool_key(credentials);
        let now = Instant::now();
        let registry = self.inner.registry.lock();
        registry
            .pools
            .get(&key)
            .map(|sub| sub.entries.iter().map(|e| e.snapshot(now)).collect())
            .unwrap_or_default()
    }

    /// Current pool statistics
    pub fn stats(&self) -> PoolStats {
        let counts = {
            let registry = self.inner.registry.lock();
            registry.pools.values().fold(
                ConnectionCounts {
                    pools: registry.pools.len(),
                    ..Default::default()
                },
                |mut counts, sub| {
                    counts.total += sub.entries.len();
                    counts.active += sub.active();
                    counts.pending += sub.pending;
                    counts
                },
            )
        };
        self.inner.counters.snapshot(counts)
    }

    /// Stop health checks, fail queued waiters and close every connection
    ///
    /// Idempotent. Close failures are logged, never returned.
    pub async fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let tasks = std::mem::take(&mut *inner.health_tasks.lock());
        for task in tasks.into_values() {
            task.handle.abort();
        }

        let registry = std::mem::take(&mut *inner.registry.lock());
        let connections: Vec<(PoolKey, F::Connection)> = registry
            .pools
            .into_iter()
            .flat_map(|(key, sub)| {
                sub.entries
                    .into_iter()
                    .map(move |entry| (key.clone(), entry.connection))
            })
            .collect();

        let count = connections.len();
        join_all(
            connections
                .into_iter()
                .map(|(key, connection)| async move {
                    inner.close_connection(&key, connection).await
                }),
        )
        .await;

        info!(connections = count, "connection pool closed");
    }
}
