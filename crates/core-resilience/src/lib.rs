//! Surreal Core Resilience: pure-logic connection pooling and failure handling
//!
//! # Overview
//!
//! This crate provides the building blocks a database node needs to talk to a
//! remote service reliably:
//!
//! - **Error Classifier**: maps a raw failure to a category, severity and retry policy
//! - **Retry Executor**: retries classified-retryable failures with exponential backoff
//! - **Connection Pool**: keyed sub-pools with bounded size, FIFO hand-off and validation
//! - **Health Checks**: periodic probes plus idle eviction down to a configured floor
//! - **Pool Statistics**: lock-free counters and derived utilization/throughput
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Database drivers or wire protocols
//! - Credential formats (a [`ConnectionFactory`] derives the [`PoolKey`])
//! - Application configuration or logging setup
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Your Application                │
//! └─────────────┬───────────────────────────┘
//!               │ acquire(credentials)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Connection Pool                   │  ← one sub-pool per PoolKey
//! │  (scan+mark, FIFO waiters, validation)  │
//! └──────┬──────────────────────┬───────────┘
//!        │ under capacity       │ every health_check_interval
//!        ▼                      ▼
//! ┌──────────────────┐   ┌──────────────────┐
//! │  Retry Executor  │   │  Health Checks   │  ← probe, evict, hand off
//! │  (backoff)       │   └──────────────────┘
//! └──────┬───────────┘
//!        │ on failure
//!        ▼
//! ┌──────────────────┐
//! │ Error Classifier │  ← ordered signature table
//! └──────────────────┘
//!        │
//!        ▼
//!   ConnectionFactory
//!   (SurrealDB, mock, ...)
//! ```
//!
//! # Usage Example
//!
//! ## Retry with backoff
//!
//! ```no_run
//! use surreal_core_resilience::{retry_with_backoff, ResilienceError, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let config = RetryConfig {
//!     max_retries: 5,
//!     base_delay: Duration::from_millis(200),
//!     ..Default::default()
//! };
//!
//! let rows = retry_with_backoff(
//!     || async {
//!         // Your potentially failing operation
//!         Ok::<_, std::io::Error>(42)
//!     },
//!     &config,
//!     "select users",
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Connection Pool
//!
//! ```no_run
//! use surreal_core_resilience::{ConnectionFactory, ConnectionPool, PoolConfig, PoolKey, ResilienceError};
//!
//! # #[derive(Clone)]
//! # struct MyConnection;
//! struct MyConnectionFactory;
//!
//! #[async_trait::async_trait]
//! impl ConnectionFactory for MyConnectionFactory {
//!     type Credentials = String;
//!     type Connection = MyConnection;
//!
//!     fn pool_key(&self, tenant: &String) -> PoolKey {
//!         PoolKey::new(tenant.as_str())
//!     }
//!
//!     async fn create(&self, _tenant: &String) -> Result<MyConnection, ResilienceError> {
//!         // Open and authenticate your connection
//! #       Ok(MyConnection)
//!     }
//!
//!     async fn validate(&self, _conn: &MyConnection) -> Result<(), ResilienceError> {
//!         // Cheap round-trip
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let pool = ConnectionPool::new(MyConnectionFactory, PoolConfig::default())?;
//! let tenant = "tenant-a".to_string();
//!
//! // Acquire connection
//! let conn = pool.acquire(&tenant).await?;
//! // Use connection...
//!
//! // Return to pool (dropping the handle does the same)
//! pool.release(&tenant, &conn);
//!
//! println!("utilization: {}%", pool.stats().pool_utilization);
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod connection_pool;
pub mod error;
pub mod health;
pub mod registry;
pub mod retry;
pub mod stats;

// Re-export main types for convenience
pub use classifier::{
    classify, classify_message, CategoryPolicy, ErrorCategory, ErrorClassification, Severity,
};
pub use connection_pool::{ConnectionFactory, ConnectionPool, PoolConfig, PooledConnection};
pub use error::{BoxError, ResilienceError};
pub use health::HealthReport;
pub use registry::{EntrySnapshot, PoolKey, MAX_ENTRY_ERRORS};
pub use retry::{retry_with_backoff, RetryConfig};
pub use stats::PoolStats;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use surreal_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::classifier::{classify, ErrorCategory, ErrorClassification, Severity};
    pub use super::connection_pool::{
        ConnectionFactory, ConnectionPool, PoolConfig, PooledConnection,
    };
    pub use super::error::ResilienceError;
    pub use super::registry::PoolKey;
    pub use super::retry::{retry_with_backoff, RetryConfig};
    pub use super::stats::PoolStats;
}
