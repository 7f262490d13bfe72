/*!
 * Configuration types for surreal-pool
 *
 * Two sources feed the pool configuration: a TOML file for the operator CLI
 * and a JSON object of partial overrides supplied by the host runtime. Both
 * merge over [`PoolConfig::default`] and are validated before any pool is
 * built, reporting every violation at once.
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use surreal_core_resilience::PoolConfig;

use crate::credentials::Credentials;
use crate::error::{Result, SurrealPoolError};

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Credentials used by the CLI
    #[serde(default)]
    pub connection: Option<Credentials>,

    #[serde(default)]
    pub pool: PoolSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SurrealPoolError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SurrealPoolError::Config(format!("TOML render error: {}", e)))
    }

    /// Validate pool settings and credentials, collecting every violation
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if let Err(surreal_core_resilience::ResilienceError::InvalidConfig(pool)) =
            self.pool.to_pool_config().validate()
        {
            violations.extend(pool);
        }
        if let Some(credentials) = &self.connection {
            if let Err(e) = credentials.validate_scope() {
                violations.push(e.to_string());
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SurrealPoolError::InvalidConfig(violations))
        }
    }

    /// Credentials, or an error when the file has no `[connection]` table
    pub fn credentials(&self) -> Result<&Credentials> {
        self.connection
            .as_ref()
            .ok_or_else(|| SurrealPoolError::Config("missing [connection] table".to_string()))
    }
}

/// `[pool]` table; durations in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub max_connections: usize,
    pub min_connections: usize,
    pub acquire_timeout_ms: u64,
    /// Zero disables background health checks
    pub health_check_interval_ms: u64,
    pub max_idle_time_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub enable_connection_validation: bool,
    pub connection_validation_timeout_ms: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

impl From<&PoolConfig> for PoolSection {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            acquire_timeout_ms: millis(config.acquire_timeout),
            health_check_interval_ms: millis(config.health_check_interval),
            max_idle_time_ms: millis(config.max_idle_time),
            retry_attempts: config.retry_attempts,
            retry_delay_ms: millis(config.retry_delay),
            enable_connection_validation: config.enable_connection_validation,
            connection_validation_timeout_ms: millis(config.connection_validation_timeout),
        }
    }
}

impl PoolSection {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            health_check_interval: Duration::from_millis(self.health_check_interval_ms),
            max_idle_time: Duration::from_millis(self.max_idle_time_ms),
            retry_attempts: self.retry_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            enable_connection_validation: self.enable_connection_validation,
            connection_validation_timeout: Duration::from_millis(
                self.connection_validation_timeout_ms,
            ),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `[logging]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: LogLevel,

    /// Log file path (None = stdout)
    pub file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for level = debug)
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Partial pool configuration supplied by the host runtime
///
/// Keys are the host's camelCase names; durations are milliseconds. Unset
/// fields keep the base configuration's value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolOverrides {
    pub max_connections: Option<usize>,
    pub min_connections: Option<usize>,
    pub acquire_timeout: Option<Duration>,
    pub health_check_interval: Option<Duration>,
    pub max_idle_time: Option<Duration>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub enable_connection_validation: Option<bool>,
    pub connection_validation_timeout: Option<Duration>,
}

impl PoolOverrides {
    /// Parse and check a JSON object, reporting every violation
    pub fn from_json(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(SurrealPoolError::InvalidConfig(vec![
                "pool configuration must be an object".to_string(),
            ]));
        };

        let mut reader = FieldReader {
            object,
            violations: Vec::new(),
        };

        let overrides = Self {
            max_connections: reader.count("maxConnections"),
            min_connections: reader.count("minConnections"),
            acquire_timeout: reader.millis("acquireTimeout"),
            health_check_interval: reader.millis("healthCheckInterval"),
            max_idle_time: reader.millis("maxIdleTime"),
            retry_attempts: reader
                .count("retryAttempts")
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX)),
            retry_delay: reader.millis("retryDelay"),
            enable_connection_validation: reader.flag("enableConnectionValidation"),
            connection_validation_timeout: reader.millis("connectionValidationTimeout"),
        };

        let mut violations = reader.violations;
        for key in object.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                violations.push(format!("unknown pool option '{}'", key));
            }
        }
        if let (Some(min), Some(max)) = (overrides.min_connections, overrides.max_connections) {
            if min > max {
                violations.push(format!(
                    "minConnections ({}) must not exceed maxConnections ({})",
                    min, max
                ));
            }
        }

        if violations.is_empty() {
            Ok(overrides)
        } else {
            Err(SurrealPoolError::InvalidConfig(violations))
        }
    }

    /// Merge over `base` and validate the result
    pub fn apply(&self, base: &PoolConfig) -> Result<PoolConfig> {
        let merged = PoolConfig {
            max_connections: self.max_connections.unwrap_or(base.max_connections),
            min_connections: self.min_connections.unwrap_or(base.min_connections),
            acquire_timeout: self.acquire_timeout.unwrap_or(base.acquire_timeout),
            health_check_interval: self
                .health_check_interval
                .unwrap_or(base.health_check_interval),
            max_idle_time: self.max_idle_time.unwrap_or(base.max_idle_time),
            retry_attempts: self.retry_attempts.unwrap_or(base.retry_attempts),
            retry_delay: self.retry_delay.unwrap_or(base.retry_delay),
            enable_connection_validation: self
                .enable_connection_validation
                .unwrap_or(base.enable_connection_validation),
            connection_validation_timeout: self
                .connection_validation_timeout
                .unwrap_or(base.connection_validation_timeout),
        };
        merged.validate()?;
        Ok(merged)
    }
}

const KNOWN_KEYS: &[&str] = &[
    "maxConnections",
    "minConnections",
    "acquireTimeout",
    "healthCheckInterval",
    "maxIdleTime",
    "retryAttempts",
    "retryDelay",
    "enableConnectionValidation",
    "connectionValidationTimeout",
];

struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    violations: Vec<String>,
}

impl FieldReader<'_> {
    /// Whole non-negative number; `4` and `4.0` are the same count
    fn count(&mut self, key: &str) -> Option<usize> {
        let value = self.object.get(key)?;
        let whole = value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u64::MAX as f64)
                .map(|n| n as u64)
        });
        match whole {
            Some(n) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
            None => {
                self.violations
                    .push(format!("{} must be a non-negative integer, got {}", key, value));
                None
            }
        }
    }

    /// Non-negative milliseconds; fractions round up to the next millisecond
    fn millis(&mut self, key: &str) -> Option<Duration> {
        let value = self.object.get(key)?;
        let ms = value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|n| *n >= 0.0 && *n <= u64::MAX as f64)
                .map(|n| n.ceil() as u64)
        });
        match ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => {
                self.violations.push(format!(
                    "{} must be a non-negative number of milliseconds, got {}",
                    key, value
                ));
                None
            }
        }
    }

    fn flag(&mut self, key: &str) -> Option<bool> {
        let value = self.object.get(key)?;
        match value.as_bool() {
            Some(flag) => Some(flag),
            None => {
                self.violations
                    .push(format!("{} must be a boolean, got {}", key, value));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_section_matches_pool_defaults() {
        let section = PoolSection::default();
        assert_eq!(section.to_pool_config(), PoolConfig::default());
        assert_eq!(section.acquire_timeout_ms, 30_000);
        assert_eq!(section.max_idle_time_ms, 300_000);
    }

    #[test]
    fn test_overrides_merge_over_defaults() {
        let overrides = PoolOverrides::from_json(&json!({
            "maxConnections": 4,
            "acquireTimeout": 250,
            "enableConnectionValidation": false
        }))
        .unwrap();

        let config = overrides.apply(&PoolConfig::default()).unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert!(!config.enable_connection_validation);
    }

    #[test]
    fn test_overrides_accept_float_numbers() {
        let overrides = PoolOverrides::from_json(&json!({
            "maxConnections": 4.0,
            "acquireTimeout": 1000.0,
            "retryDelay": 2.5
        }))
        .unwrap();

        let config = overrides.apply(&PoolConfig::default()).unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.acquire_timeout, Duration::from_millis(1000));
        assert_eq!(config.retry_delay, Duration::from_millis(3));

        let err = PoolOverrides::from_json(&json!({ "maxConnections": 2.5 })).unwrap_err();
        assert!(err.to_string().contains("maxConnections must be a non-negative integer"));
    }

    #[test]
    fn test_overrides_report_every_violation() {
        let err = PoolOverrides::from_json(&json!({
            "maxConnections": -1,
            "retryDelay": "fast",
            "enableConnectionValidation": "yes",
            "poolName": "x"
        }))
        .unwrap_err();

        match err {
            SurrealPoolError::InvalidConfig(violations) => {
                assert_eq!(violations.len(), 4);
                assert!(violations.iter().any(|v| v.starts_with("maxConnections")));
                assert!(violations.iter().any(|v| v.starts_with("retryDelay")));
                assert!(violations.iter().any(|v| v.contains("must be a boolean")));
                assert!(violations.iter().any(|v| v.contains("'poolName'")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_overrides_reject_min_above_max() {
        let err = PoolOverrides::from_json(&json!({
            "minConnections": 10,
            "maxConnections": 5
        }))
        .unwrap_err();
        assert!(err.to_string().contains("minConnections (10)"));

        // Only one side overridden: caught when merged
        let overrides = PoolOverrides::from_json(&json!({ "minConnections": 20 })).unwrap();
        let err = overrides.apply(&PoolConfig::default()).unwrap_err();
        assert!(matches!(err, SurrealPoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_overrides_must_be_object() {
        assert!(PoolOverrides::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_app_config_from_toml() {
        let config = AppConfig::from_toml(
            r#"
            [connection]
            endpoint = "ws://localhost:8000"
            username = "root"
            password = "root"
            namespace = "app"

            [pool]
            max_connections = 6
            health_check_interval_ms = 0

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.pool.max_connections, 6);
        assert_eq!(config.pool.min_connections, 2);
        assert!(config.pool.to_pool_config().health_check_interval.is_zero());
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.credentials().unwrap().namespace.as_deref(), Some("app"));
    }

    #[test]
    fn test_app_config_collects_pool_and_credential_violations() {
        let config = AppConfig::from_toml(
            r#"
            [connection]
            endpoint = "ws://localhost:8000"
            auth_mode = "namespace"
            username = "svc"

            [pool]
            min_connections = 10
            max_connections = 5
            "#,
        )
        .unwrap();

        match config.validate().unwrap_err() {
            SurrealPoolError::InvalidConfig(violations) => {
                assert_eq!(violations.len(), 2);
                assert!(violations[0].contains("min_connections (10)"));
                assert!(violations[1].contains("namespace"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_toml_round_trip_keeps_pool_section() {
        let config = AppConfig {
            pool: PoolSection {
                max_connections: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let rendered = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.pool, config.pool);
    }
}
