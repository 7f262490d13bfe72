/*!
 * Credentials and pool key derivation
 *
 * A pool key identifies one authenticated identity on one endpoint. Two
 * credential sets share a sub-pool only when their keys are equal, and the
 * password never takes part in the key.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use surreal_core_resilience::{PoolKey, ResilienceError};

/// Scope the credentials authenticate at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Root user; namespace and database are optional context
    #[default]
    Root,

    /// Namespace user; needs a namespace
    Namespace,

    /// Database user; needs a namespace and a database
    Database,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Root => write!(f, "root"),
            AuthMode::Namespace => write!(f, "namespace"),
            AuthMode::Database => write!(f, "database"),
        }
    }
}

/// Resolved connection credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Connection string, e.g. `ws://localhost:8000` or `mem://`
    pub endpoint: String,

    #[serde(default)]
    pub auth_mode: AuthMode,

    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub database: Option<String>,
}

impl Credentials {
    /// Root credentials for `endpoint`
    pub fn root(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_mode: AuthMode::Root,
            username: username.into(),
            password: password.into(),
            namespace: None,
            database: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.auth_mode = auth_mode;
        self
    }

    /// `endpoint|namespace|database|mode:username`
    ///
    /// Backslashes and `|` inside a field are escaped with a backslash, so distinct
    /// identities never render to the same key. An absent namespace or
    /// database renders like an empty one.
    pub fn pool_key(&self) -> PoolKey {
        PoolKey::new(format!(
            "{}|{}|{}|{}:{}",
            escape_key_field(&self.endpoint),
            escape_key_field(self.namespace.as_deref().unwrap_or_default()),
            escape_key_field(self.database.as_deref().unwrap_or_default()),
            self.auth_mode,
            escape_key_field(&self.username)
        ))
    }

    /// Check the identity fields the auth scope needs
    pub fn validate_scope(&self) -> Result<(), ResilienceError> {
        let mut missing = Vec::new();

        if self.endpoint.trim().is_empty() {
            missing.push("endpoint");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        match self.auth_mode {
            AuthMode::Root => {}
            AuthMode::Namespace => {
                if !has(&self.namespace) {
                    missing.push("namespace");
                }
            }
            AuthMode::Database => {
                if !has(&self.namespace) {
                    missing.push("namespace");
                }
                if !has(&self.database) {
                    missing.push("database");
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ResilienceError::InvalidCredentials(format!(
                "{} authentication requires {}",
                self.auth_mode,
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("auth_mode", &self.auth_mode)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .finish()
    }
}

fn escape_key_field(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for c in field.chars() {
        if matches!(c, '\\' | '|') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use surreal_core_resilience::{classify, ErrorCategory};

    #[test]
    fn test_pool_key_format() {
        let creds = Credentials::root("ws://db:8000", "admin", "secret")
            .with_namespace("app")
            .with_database("main");
        assert_eq!(creds.pool_key().as_str(), "ws://db:8000|app|main|root:admin");
    }

    #[test]
    fn test_pool_key_ignores_password() {
        let a = Credentials::root("ws://db:8000", "admin", "one");
        let b = Credentials::root("ws://db:8000", "admin", "two");
        assert_eq!(a.pool_key(), b.pool_key());
    }

    #[test]
    fn test_pool_key_escapes_separators() {
        let split_ns = Credentials::root("ws://db:8000", "admin", "secret")
            .with_namespace("a|b")
            .with_database("c");
        let split_db = Credentials::root("ws://db:8000", "admin", "secret")
            .with_namespace("a")
            .with_database("b|c");
        assert_ne!(split_ns.pool_key(), split_db.pool_key());
        assert_eq!(split_ns.pool_key().as_str(), r"ws://db:8000|a\|b|c|root:admin");

        let slash = Credentials::root("ws://db:8000", r"a\", "secret");
        let pipe = Credentials::root("ws://db:8000", "a|", "secret");
        assert_ne!(slash.pool_key(), pipe.pool_key());
    }

    #[test]
    fn test_pool_key_separates_identities() {
        let base = Credentials::root("ws://db:8000", "admin", "secret").with_namespace("a");
        let other_ns = base.clone().with_namespace("b");
        let other_mode = base.clone().with_auth_mode(AuthMode::Namespace);
        assert_ne!(base.pool_key(), other_ns.pool_key());
        assert_ne!(base.pool_key(), other_mode.pool_key());
    }

    #[test]
    fn test_scope_validation() {
        let root = Credentials::root("mem://", "admin", "secret");
        assert!(root.validate_scope().is_ok());

        let database = root.clone().with_auth_mode(AuthMode::Database).with_namespace("app");
        let err = database.validate_scope().unwrap_err();
        assert!(err.to_string().contains("database authentication requires database"));
        assert_eq!(classify(&err).category, ErrorCategory::Authentication);
        assert!(!classify(&err).retryable);

        let empty = Credentials::root("", "", "");
        let message = empty.validate_scope().unwrap_err().to_string();
        assert!(message.contains("endpoint, username"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::root("mem://", "admin", "hunter2");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_deserialize_from_toml() {
        let creds: Credentials = toml::from_str(
            r#"
            endpoint = "ws://localhost:8000"
            auth_mode = "database"
            username = "svc"
            password = "pw"
            namespace = "app"
            database = "main"
            "#,
        )
        .unwrap();
        assert_eq!(creds.auth_mode, AuthMode::Database);
        assert!(creds.validate_scope().is_ok());
    }
}
