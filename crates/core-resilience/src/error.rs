//! Error types for pool, factory and retry failures

use crate::classifier::{ErrorCategory, ErrorClassification};
use std::time::Duration;
use thiserror::Error;

/// Boxed error used to carry the original failure through a wrapper
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the resilience layer
///
/// Pool-internal failures (`PoolExhausted`, `ValidationFailed`, `PoolClosed`,
/// `InvalidConfig`) are distinct variants so callers can tell "couldn't get a
/// connection" apart from "got a connection, the operation failed".
#[derive(Error, Debug)]
pub enum ResilienceError {
    /// No connection became available within the acquire timeout
    #[error("Connection pool exhausted for key '{key}': no connection available within {timeout:?}")]
    PoolExhausted { key: String, timeout: Duration },

    /// A checked-out connection failed its validation round-trip
    #[error("Connection validation failed for key '{key}': {reason}")]
    ValidationFailed { key: String, reason: String },

    /// The pool has been closed
    #[error("Connection pool is closed")]
    PoolClosed,

    /// Pool configuration rejected; carries every violation found
    #[error("Invalid pool configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// Transport could not be opened
    #[error("Connection failed to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    /// The database rejected the supplied identity
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Credentials are missing fields required by their scope
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// A query or probe returned an error
    #[error("Query error: {0}")]
    Query(String),

    /// An operation did not complete in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// An operation failed after classification (and possibly retries)
    #[error("{context} failed after {attempts} attempt(s) [{}]: {source}", .classification.category)]
    OperationFailed {
        context: String,
        attempts: u32,
        classification: ErrorClassification,
        #[source]
        source: BoxError,
    },
}

impl ResilienceError {
    /// Whether the failure originated inside the pool rather than downstream
    pub fn is_pool_error(&self) -> bool {
        matches!(
            self,
            ResilienceError::PoolExhausted { .. }
                | ResilienceError::ValidationFailed { .. }
                | ResilienceError::PoolClosed
                | ResilienceError::InvalidConfig(_)
        )
    }

    /// Classification embedded by the retry executor, if any
    pub fn classification(&self) -> Option<&ErrorClassification> {
        match self {
            ResilienceError::OperationFailed { classification, .. } => Some(classification),
            _ => None,
        }
    }

    /// Category of the embedded classification, if any
    pub fn category(&self) -> Option<ErrorCategory> {
        self.classification().map(|c| c.category)
    }

    /// Number of attempts made before this error surfaced (1 when not retried)
    pub fn attempts(&self) -> u32 {
        match self {
            ResilienceError::OperationFailed { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify_message;
    use std::error::Error as _;

    #[test]
    fn test_pool_errors_are_distinguishable() {
        let exhausted = ResilienceError::PoolExhausted {
            key: "ws://db|ns|db|root:admin".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert!(exhausted.is_pool_error());
        assert!(exhausted.to_string().contains("ws://db|ns|db|root:admin"));
        assert!(exhausted.to_string().contains("250ms"));

        assert!(!ResilienceError::Query("bad".to_string()).is_pool_error());
        assert!(ResilienceError::PoolClosed.is_pool_error());
    }

    #[test]
    fn test_invalid_config_lists_all_violations() {
        let err = ResilienceError::InvalidConfig(vec![
            "first violation".to_string(),
            "second violation".to_string(),
        ]);
        let display = err.to_string();
        assert!(display.contains("first violation"));
        assert!(display.contains("second violation"));
    }

    #[test]
    fn test_operation_failed_preserves_source() {
        let original = ResilienceError::Query("parse error near SELEC".to_string());
        let classification = classify_message(&original.to_string(), None);
        let err = ResilienceError::OperationFailed {
            context: "query".to_string(),
            attempts: 1,
            classification,
            source: Box::new(original),
        };

        assert_eq!(err.category(), Some(ErrorCategory::QuerySyntax));
        assert_eq!(err.attempts(), 1);

        let source = err.source().expect("source is kept");
        let inner = source
            .downcast_ref::<ResilienceError>()
            .expect("original error type is recoverable");
        assert!(matches!(inner, ResilienceError::Query(_)));
    }
}
