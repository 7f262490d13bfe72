/*!
 * Error types for surreal-pool
 */

use std::fmt;
use std::io;
use surreal_core_resilience::{ErrorClassification, ResilienceError};

pub type Result<T> = std::result::Result<T, SurrealPoolError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

#[derive(Debug)]
pub enum SurrealPoolError {
    /// Configuration could not be read or parsed
    Config(String),

    /// Configuration parsed but is invalid; one entry per violation
    InvalidConfig(Vec<String>),

    /// I/O error
    Io(io::Error),

    /// Pool, factory or retry failure
    Resilience(ResilienceError),

    /// The process-wide default pool has not been initialized
    DefaultPoolMissing,

    /// Generic error with message
    Other(String),
}

impl SurrealPoolError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SurrealPoolError::Config(_) | SurrealPoolError::InvalidConfig(_) => EXIT_CONFIG,
            SurrealPoolError::Resilience(ResilienceError::InvalidConfig(_))
            | SurrealPoolError::Resilience(ResilienceError::InvalidCredentials(_)) => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }

    /// Classification carried by a wrapped retry failure, if any
    pub fn classification(&self) -> Option<&ErrorClassification> {
        match self {
            SurrealPoolError::Resilience(err) => err.classification(),
            _ => None,
        }
    }

    /// Whether the failure means "no connection" rather than "operation failed"
    pub fn is_pool_error(&self) -> bool {
        matches!(self, SurrealPoolError::Resilience(err) if err.is_pool_error())
    }
}

impl fmt::Display for SurrealPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurrealPoolError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            SurrealPoolError::InvalidConfig(violations) => {
                write!(f, "Invalid configuration: {}", violations.join("; "))
            }
            SurrealPoolError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            SurrealPoolError::Resilience(err) => {
                write!(f, "{}", err)
            }
            SurrealPoolError::DefaultPoolMissing => {
                write!(f, "Default connection pool is not initialized")
            }
            SurrealPoolError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for SurrealPoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SurrealPoolError::Io(err) => Some(err),
            SurrealPoolError::Resilience(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SurrealPoolError {
    fn from(err: io::Error) -> Self {
        SurrealPoolError::Io(err)
    }
}

impl From<ResilienceError> for SurrealPoolError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::InvalidConfig(violations) => SurrealPoolError::InvalidConfig(violations),
            other => SurrealPoolError::Resilience(other),
        }
    }
}

impl From<serde_json::Error> for SurrealPoolError {
    fn from(err: serde_json::Error) -> Self {
        SurrealPoolError::Config(format!("JSON parse error: {}", err))
    }
}

impl From<toml::de::Error> for SurrealPoolError {
    fn from(err: toml::de::Error) -> Self {
        SurrealPoolError::Config(format!("TOML parse error: {}", err))
    }
}
