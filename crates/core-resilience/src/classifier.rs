//! Error classification for retry and reporting decisions
//!
//! Failures coming back from a database driver are mostly free-form text. The
//! classifier maps that text onto a fixed taxonomy ([`ErrorCategory`]) and
//! attaches the retry policy for that category.
//!
//! # Design
//!
//! Classification is an ordered table of signatures evaluated top to bottom;
//! the first signature with a matching needle wins. Order matters because the
//! needles overlap ("connection timeout" is a connection failure, a bare
//! "timeout" is a timeout). Policy per category lives in
//! [`ErrorCategory::policy`], so both tables can be tested in isolation.
//!
//! # Example
//!
//! ```
//! use surreal_core_resilience::classifier::{classify_message, ErrorCategory, Severity};
//!
//! let c = classify_message("connect ECONNREFUSED 127.0.0.1:8000", None);
//! assert_eq!(c.category, ErrorCategory::Connection);
//! assert_eq!(c.severity, Severity::High);
//! assert!(c.retryable);
//! ```

use crate::error::ResilienceError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    /// Transport could not be opened or was lost
    #[serde(rename = "CONNECTION_ERROR")]
    Connection,
    /// Identity rejected
    #[serde(rename = "AUTHENTICATION_ERROR")]
    Authentication,
    /// Operation exceeded its deadline
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    /// Query text could not be parsed
    #[serde(rename = "QUERY_SYNTAX_ERROR")]
    QuerySyntax,
    /// Input failed validation
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    /// Value could not be coerced to the expected type
    #[serde(rename = "DATA_TYPE_ERROR")]
    DataType,
    /// Identity lacks the rights for the operation
    #[serde(rename = "PERMISSION_ERROR")]
    Permission,
    /// Table, record or namespace does not exist
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound,
    /// Server-side or host-level fault
    #[serde(rename = "SYSTEM_ERROR")]
    System,
    /// Throttled by the server
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimit,
    /// Nothing matched
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

/// Severity attached to a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Fixed retry policy for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub severity: Severity,
    pub retryable: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl CategoryPolicy {
    const fn retry(severity: Severity, max_retries: u32, delay_ms: u64) -> Self {
        Self {
            severity,
            retryable: true,
            max_retries,
            retry_delay: Duration::from_millis(delay_ms),
        }
    }

    const fn fail(severity: Severity) -> Self {
        Self {
            severity,
            retryable: false,
            max_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }
}

impl ErrorCategory {
    /// Every category, in declaration order
    pub const ALL: [ErrorCategory; 11] = [
        ErrorCategory::Connection,
        ErrorCategory::Authentication,
        ErrorCategory::Timeout,
        ErrorCategory::QuerySyntax,
        ErrorCategory::Validation,
        ErrorCategory::DataType,
        ErrorCategory::Permission,
        ErrorCategory::ResourceNotFound,
        ErrorCategory::System,
        ErrorCategory::RateLimit,
        ErrorCategory::Unknown,
    ];

    /// The retry policy baked into this category
    pub const fn policy(self) -> CategoryPolicy {
        match self {
            ErrorCategory::Connection => CategoryPolicy::retry(Severity::High, 3, 2000),
            ErrorCategory::Authentication => CategoryPolicy::fail(Severity::Critical),
            ErrorCategory::Timeout => CategoryPolicy::retry(Severity::Medium, 3, 1000),
            ErrorCategory::QuerySyntax => CategoryPolicy::fail(Severity::Medium),
            ErrorCategory::Validation => CategoryPolicy::fail(Severity::Low),
            ErrorCategory::DataType => CategoryPolicy::fail(Severity::Low),
            ErrorCategory::Permission => CategoryPolicy::fail(Severity::High),
            ErrorCategory::ResourceNotFound => CategoryPolicy::fail(Severity::Medium),
            ErrorCategory::System => CategoryPolicy::retry(Severity::High, 2, 3000),
            ErrorCategory::RateLimit => CategoryPolicy::retry(Severity::Medium, 5, 5000),
            ErrorCategory::Unknown => CategoryPolicy::fail(Severity::Medium),
        }
    }

    /// Short remediation hint for operators
    pub fn suggestion(self) -> &'static str {
        match self {
            ErrorCategory::Connection => "Check that the endpoint is reachable and the server is running",
            ErrorCategory::Authentication => "Verify username, password and authentication scope",
            ErrorCategory::Timeout => "Increase the timeout or reduce the size of the operation",
            ErrorCategory::QuerySyntax => "Review the query text for syntax errors",
            ErrorCategory::Validation => "Check the input values against the expected format",
            ErrorCategory::DataType => "Convert the value to the type the field expects",
            ErrorCategory::Permission => "Grant the user access to the namespace, database or table",
            ErrorCategory::ResourceNotFound => "Confirm the table, record or namespace exists",
            ErrorCategory::System => "Retry later; check server logs if the problem persists",
            ErrorCategory::RateLimit => "Reduce the request rate or wait before retrying",
            ErrorCategory::Unknown => "Inspect the error message for details",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Connection => "CONNECTION_ERROR",
            ErrorCategory::Authentication => "AUTHENTICATION_ERROR",
            ErrorCategory::Timeout => "TIMEOUT_ERROR",
            ErrorCategory::QuerySyntax => "QUERY_SYNTAX_ERROR",
            ErrorCategory::Validation => "VALIDATION_ERROR",
            ErrorCategory::DataType => "DATA_TYPE_ERROR",
            ErrorCategory::Permission => "PERMISSION_ERROR",
            ErrorCategory::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCategory::System => "SYSTEM_ERROR",
            ErrorCategory::RateLimit => "RATE_LIMIT_ERROR",
            ErrorCategory::Unknown => "UNKNOWN_ERROR",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result of classifying one failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub retryable: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Original failure message
    pub message: String,
    /// Free-form context (operation name, attempt, pool key, ...)
    pub context: BTreeMap<String, String>,
}

impl ErrorClassification {
    /// Build a classification for `category` using its fixed policy
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        let policy = category.policy();
        Self {
            category,
            severity: policy.severity,
            retryable: policy.retryable,
            max_retries: policy.max_retries,
            retry_delay: policy.retry_delay,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context value
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Operator-facing remediation hint
    pub fn suggestion(&self) -> &'static str {
        self.category.suggestion()
    }
}

/// Where a signature looks for its needles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Message,
    MessageOrStack,
}

struct Signature {
    category: ErrorCategory,
    scope: Scope,
    needles: &'static [&'static str],
    /// Status codes, matched only as whole tokens in a status position
    status_codes: &'static [&'static str],
}

impl Signature {
    fn matches(&self, message: &str, stack: &str) -> bool {
        let hit = |text: &str| {
            self.needles.iter().any(|needle| text.contains(needle))
                || has_status_code(text, self.status_codes)
        };
        match self.scope {
            Scope::Message => hit(message),
            Scope::MessageOrStack => hit(message) || hit(stack),
        }
    }
}

/// Words that mark the next token as a status code
const STATUS_CONTEXT: &[&str] = &["status", "http", "code"];

/// True when one of `codes` leads the text or follows a status word
///
/// Digits inside identifiers or durations ("orders:14290", "500ms") never count.
fn has_status_code(text: &str, codes: &[&str]) -> bool {
    if codes.is_empty() {
        return false;
    }
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();
    tokens.iter().enumerate().any(|(index, token)| {
        codes.contains(token)
            && (index == 0 || STATUS_CONTEXT.contains(&tokens[index - 1]))
    })
}

/// Ordered signature table; first match wins
const SIGNATURES: &[Signature] = &[
    Signature {
        category: ErrorCategory::Connection,
        scope: Scope::MessageOrStack,
        needles: &[
            "econnrefused",
            "econnreset",
            "enotfound",
            "etimedout",
            "connection refused",
            "connection reset",
            "connection closed",
            "connection lost",
            "connection failed",
            "connection timeout",
            "connection timed out",
            "failed to connect",
            "unable to connect",
            "could not connect",
            "socket hang up",
            "network error",
            "network unreachable",
            "broken pipe",
            "websocket",
        ],
        status_codes: &[],
    },
    Signature {
        category: ErrorCategory::Authentication,
        scope: Scope::Message,
        needles: &[
            "authentication",
            "unauthorized",
            "unauthenticated",
            "invalid credentials",
            "login failed",
            "signin failed",
            "not authenticated",
            "invalid token",
            "token expired",
            "jwt",
        ],
        status_codes: &[],
    },
    Signature {
        category: ErrorCategory::Timeout,
        scope: Scope::Message,
        needles: &["timeout", "timed out", "deadline exceeded"],
        status_codes: &[],
    },
    Signature {
        category: ErrorCategory::QuerySyntax,
        scope: Scope::Message,
        needles: &[
            "parse error",
            "syntax error",
            "failed to parse",
            "unexpected token",
            "invalid query",
            "invalid statement",
        ],
        status_codes: &[],
    },
    Signature {
        category: ErrorCategory::Validation,
        scope: Scope::Message,
        needles: &[
            "validation",
            "invalid input",
            "invalid parameter",
            "invalid value",
            "is required",
            "missing required",
            "must be",
        ],
        status_codes: &[],
    },
    Signature {
        category: ErrorCategory::DataType,
        scope: Scope::Message,
        needles: &[
            "type mismatch",
            "cannot coerce",
            "couldn't coerce",
            "could not coerce",
            "expected a ",
            "invalid type",
        ],
        status_codes: &[],
    },
    Signature {
        category: ErrorCategory::Permission,
        scope: Scope::Message,
        needles: &[
            "permission",
            "forbidden",
            "not allowed",
            "access denied",
            "insufficient privileges",
        ],
        status_codes: &[],
    },
    Signature {
        category: ErrorCategory::ResourceNotFound,
        scope: Scope::Message,
        needles: &["not found", "does not exist", "no such"],
        status_codes: &["404"],
    },
    Signature {
        category: ErrorCategory::RateLimit,
        scope: Scope::Message,
        needles: &["rate limit", "too many requests", "throttl", "quota exceeded"],
        status_codes: &["429"],
    },
    Signature {
        category: ErrorCategory::System,
        scope: Scope::Message,
        needles: &[
            "internal error",
            "internal server error",
            "system error",
            "service unavailable",
            "out of memory",
            "disk full",
            "no space left",
            "panicked",
        ],
        status_codes: &["500", "503"],
    },
];

/// Classify a failure message, optionally with its cause chain
///
/// Never fails: text that matches nothing is [`ErrorCategory::Unknown`].
pub fn classify_message(message: &str, stack: Option<&str>) -> ErrorClassification {
    let lower_message = message.to_lowercase();
    let lower_stack = stack.map(str::to_lowercase).unwrap_or_default();

    let category = SIGNATURES
        .iter()
        .find(|signature| signature.matches(&lower_message, &lower_stack))
        .map(|signature| signature.category)
        .unwrap_or(ErrorCategory::Unknown);

    ErrorClassification::new(category, message)
}

/// Classify any error value
///
/// The error's `Display` is the message; its `source()` chain, one cause per
/// line, stands in for the stack. An error already wrapped by the retry
/// executor keeps the classification it carries.
pub fn classify(error: &(dyn std::error::Error + 'static)) -> ErrorClassification {
    if let Some(classification) = error
        .downcast_ref::<ResilienceError>()
        .and_then(ResilienceError::classification)
    {
        return classification.clone();
    }

    let mut stack = String::new();
    let mut cause = error.source();
    while let Some(inner) = cause {
        if !stack.is_empty() {
            stack.push('\n');
        }
        stack.push_str(&inner.to_string());
        cause = inner.source();
    }

    classify_message(&error.to_string(), Some(&stack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_connection_refused_is_connection_error() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "ECONNREFUSED 127.0.0.1:8000");
        let c = classify(&err);
        assert_eq!(c.category, ErrorCategory::Connection);
        assert_eq!(c.severity, Severity::High);
        assert!(c.retryable);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.retry_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_unauthorized_is_not_retryable() {
        let c = classify_message("unauthorized", None);
        assert_eq!(c.category, ErrorCategory::Authentication);
        assert_eq!(c.severity, Severity::Critical);
        assert!(!c.retryable);
    }

    #[test]
    fn test_novel_text_is_unknown() {
        let c = classify_message("totally novel text", None);
        assert_eq!(c.category, ErrorCategory::Unknown);
        assert_eq!(c.severity, Severity::Medium);
        assert!(!c.retryable);
    }

    #[test]
    fn test_connection_timeout_beats_plain_timeout() {
        assert_eq!(
            classify_message("Connection timeout while opening socket", None).category,
            ErrorCategory::Connection
        );
        assert_eq!(
            classify_message("query timed out", None).category,
            ErrorCategory::Timeout
        );
    }

    #[test]
    fn test_connection_detected_in_stack_only() {
        let c = classify_message("request aborted", Some("caused by: socket hang up"));
        assert_eq!(c.category, ErrorCategory::Connection);

        // Other categories look at the message only
        let c = classify_message("request aborted", Some("caused by: unauthorized"));
        assert_eq!(c.category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_embedded_classification_is_kept() {
        let inner = ResilienceError::Connect {
            endpoint: "ws://localhost:8000".to_string(),
            message: "broken pipe".to_string(),
        };
        let outer = ResilienceError::OperationFailed {
            context: "select".to_string(),
            attempts: 1,
            classification: ErrorClassification::new(ErrorCategory::System, "boom"),
            source: Box::new(inner),
        };
        // Embedded classification wins over re-matching
        assert_eq!(classify(&outer).category, ErrorCategory::System);
    }

    #[test]
    fn test_status_codes_need_a_status_position() {
        let cases = [
            ("HTTP 503", ErrorCategory::System),
            ("request failed with status code 500", ErrorCategory::System),
            ("404 Not Found", ErrorCategory::ResourceNotFound),
            ("http 429", ErrorCategory::RateLimit),
            ("record orders:14290 is locked", ErrorCategory::Unknown),
            ("batch 5003 rejected", ErrorCategory::Unknown),
        ];
        for (message, expected) in cases {
            assert_eq!(classify_message(message, None).category, expected, "{message}");
        }
    }

    #[test]
    fn test_exhausted_pool_is_not_a_server_error() {
        let err = ResilienceError::PoolExhausted {
            key: "ws://db|app|main|root:admin".to_string(),
            timeout: Duration::from_millis(500),
        };
        let c = classify(&err);
        assert_ne!(c.category, ErrorCategory::System);
        assert!(!c.retryable);
    }

    #[test]
    fn test_category_order() {
        let cases = [
            ("Parse error: unexpected token at line 1", ErrorCategory::QuerySyntax),
            ("Validation failed: name is required", ErrorCategory::Validation),
            ("Couldn't coerce value for field `age`", ErrorCategory::DataType),
            ("Permission denied for table user", ErrorCategory::Permission),
            ("The table 'person' does not exist", ErrorCategory::ResourceNotFound),
            ("429 Too Many Requests", ErrorCategory::RateLimit),
            ("Internal server error", ErrorCategory::System),
        ];
        for (message, expected) in cases {
            assert_eq!(classify_message(message, None).category, expected, "{message}");
        }
    }

    #[test]
    fn test_policy_table() {
        let rate = ErrorCategory::RateLimit.policy();
        assert_eq!(rate.severity, Severity::Medium);
        assert!(rate.retryable);
        assert_eq!(rate.max_retries, 5);
        assert_eq!(rate.retry_delay, Duration::from_millis(5000));

        let retryable: Vec<_> = ErrorCategory::ALL
            .iter()
            .filter(|c| c.policy().retryable)
            .copied()
            .collect();
        assert_eq!(
            retryable,
            vec![
                ErrorCategory::Connection,
                ErrorCategory::Timeout,
                ErrorCategory::System,
                ErrorCategory::RateLimit
            ]
        );
    }

    #[test]
    fn test_context_and_display() {
        let c = classify_message("ECONNRESET", None)
            .with_context("operation", "create connection")
            .with_context("attempt", 2);
        assert_eq!(c.context.get("attempt").map(String::as_str), Some("2"));
        assert_eq!(c.category.to_string(), "CONNECTION_ERROR");
        assert_eq!(Severity::Critical.to_string(), "CRITICAL");
        assert!(!c.suggestion().is_empty());
    }
}
