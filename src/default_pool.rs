/*!
 * Process-wide default pool
 *
 * Code that can pass a [`SurrealPool`] around should do so. This module is the
 * outermost-edge helper for callers that expect one shared pool: it is created
 * on first use and torn down by [`shutdown_default_pool`].
 */

use parking_lot::Mutex;
use std::sync::Arc;
use surreal_core_resilience::PoolConfig;
use tracing::info;

use crate::driver::SurrealDriver;
use crate::error::{Result, SurrealPoolError};
use crate::factory::{SurrealConnectionFactory, SurrealPool};

static DEFAULT_POOL: Mutex<Option<SurrealPool>> = parking_lot::const_mutex(None);

fn build(driver: Arc<dyn SurrealDriver>, config: PoolConfig) -> Result<SurrealPool> {
    Ok(SurrealPool::new(SurrealConnectionFactory::new(driver), config)?)
}

/// Install the default pool; fails if one is already installed
pub fn init_default_pool(driver: Arc<dyn SurrealDriver>, config: PoolConfig) -> Result<SurrealPool> {
    let mut slot = DEFAULT_POOL.lock();
    if slot.is_some() {
        return Err(SurrealPoolError::Config(
            "default pool is already initialized".to_string(),
        ));
    }
    let pool = build(driver, config)?;
    *slot = Some(pool.clone());
    info!("default pool initialized");
    Ok(pool)
}

/// The installed default pool
pub fn default_pool() -> Result<SurrealPool> {
    DEFAULT_POOL
        .lock()
        .clone()
        .ok_or(SurrealPoolError::DefaultPoolMissing)
}

/// The installed default pool, creating it from `driver` and `config` if absent
///
/// `config` is ignored when a pool already exists.
pub fn get_or_init_default_pool(
    driver: Arc<dyn SurrealDriver>,
    config: PoolConfig,
) -> Result<SurrealPool> {
    let mut slot = DEFAULT_POOL.lock();
    if let Some(pool) = slot.as_ref() {
        return Ok(pool.clone());
    }
    let pool = build(driver, config)?;
    *slot = Some(pool.clone());
    info!("default pool initialized");
    Ok(pool)
}

/// Close and forget the default pool; a no-op when none is installed
pub async fn shutdown_default_pool() {
    let pool = DEFAULT_POOL.lock().take();
    if let Some(pool) = pool {
        pool.close().await;
        info!("default pool shut down");
    }
}
