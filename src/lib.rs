/*!
 * surreal-pool - pooled, health-checked SurrealDB connections
 *
 * Binds the keyed connection pool from `surreal-core-resilience` to SurrealDB:
 * - Credential identity and pool-key derivation
 * - A driver seam over the database client (real client behind `surrealdb`)
 * - A connection factory with retry on transient connect failures
 * - TOML configuration and host-supplied JSON pool overrides
 * - Structured logging setup
 * - A process-wide default pool for callers that expect one
 */

pub mod config;
pub mod credentials;
pub mod default_pool;
pub mod driver;
#[cfg(feature = "surrealdb")]
pub mod engine;
pub mod error;
pub mod factory;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, LogLevel, LoggingSection, PoolOverrides, PoolSection};
pub use credentials::{AuthMode, Credentials};
pub use default_pool::{
    default_pool, get_or_init_default_pool, init_default_pool, shutdown_default_pool,
};
pub use driver::{SurrealDriver, SurrealSession};
#[cfg(feature = "surrealdb")]
pub use engine::{SurrealEngineDriver, SurrealEngineSession};
pub use error::{Result, SurrealPoolError};
pub use factory::{SurrealConnection, SurrealConnectionFactory, SurrealPool, PROBE_STATEMENT};

pub use surreal_core_resilience::{
    classify, classify_message, ErrorCategory, ErrorClassification, HealthReport, PoolConfig,
    PoolStats, PooledConnection, ResilienceError, RetryConfig, Severity,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
