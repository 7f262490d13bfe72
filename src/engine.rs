/*!
 * SurrealDB driver on the `engine::any` client
 *
 * Only compiled with the `surrealdb` feature.
 */

use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use surreal_core_resilience::ResilienceError;
use surrealdb::engine::any::{self, Any as AnyEngine};
use surrealdb::opt::auth::{Database, Namespace, Root};
use surrealdb::Surreal;

use crate::credentials::{AuthMode, Credentials};
use crate::driver::{SurrealDriver, SurrealSession};

/// Connects with `surrealdb::engine::any::connect`
#[derive(Debug, Clone, Copy, Default)]
pub struct SurrealEngineDriver;

#[async_trait]
impl SurrealDriver for SurrealEngineDriver {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn SurrealSession>, ResilienceError> {
        let db = any::connect(endpoint)
            .await
            .map_err(|e| ResilienceError::Connect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        Ok(Arc::new(SurrealEngineSession { db }))
    }
}

/// A live `Surreal<Any>` client
pub struct SurrealEngineSession {
    db: Surreal<AnyEngine>,
}

impl SurrealEngineSession {
    /// The underlying client, for operations beyond the session trait
    pub fn client(&self) -> &Surreal<AnyEngine> {
        &self.db
    }
}

fn missing(field: &str, mode: AuthMode) -> ResilienceError {
    ResilienceError::InvalidCredentials(format!("{mode} authentication requires {field}"))
}

#[async_trait]
impl SurrealSession for SurrealEngineSession {
    async fn use_namespace(
        &self,
        namespace: &str,
        database: Option<&str>,
    ) -> Result<(), ResilienceError> {
        let result = match database {
            Some(database) => self.db.use_ns(namespace).use_db(database).await,
            None => self.db.use_ns(namespace).await,
        };
        result.map_err(|e| ResilienceError::Query(e.to_string()))
    }

    async fn signin(&self, credentials: &Credentials) -> Result<(), ResilienceError> {
        let username = credentials.username.as_str();
        let password = credentials.password.as_str();
        let mode = credentials.auth_mode;

        let result = match mode {
            AuthMode::Root => self.db.signin(Root { username, password }).await,
            AuthMode::Namespace => {
                let namespace = credentials
                    .namespace
                    .as_deref()
                    .ok_or_else(|| missing("namespace", mode))?;
                self.db
                    .signin(Namespace {
                        namespace,
                        username,
                        password,
                    })
                    .await
            }
            AuthMode::Database => {
                let namespace = credentials
                    .namespace
                    .as_deref()
                    .ok_or_else(|| missing("namespace", mode))?;
                let database = credentials
                    .database
                    .as_deref()
                    .ok_or_else(|| missing("database", mode))?;
                self.db
                    .signin(Database {
                        namespace,
                        database,
                        username,
                        password,
                    })
                    .await
            }
        };

        result
            .map(|_| ())
            .map_err(|e| ResilienceError::Authentication(e.to_string()))
    }

    async fn query(&self, statement: &str) -> Result<Value, ResilienceError> {
        let mut response = self
            .db
            .query(statement)
            .await
            .and_then(|response| response.check())
            .map_err(|e| ResilienceError::Query(e.to_string()))?;

        let value: Option<Value> = response
            .take(0)
            .map_err(|e| ResilienceError::Query(e.to_string()))?;
        Ok(value.unwrap_or(Value::Null))
    }

    async fn close(&self) -> Result<(), ResilienceError> {
        // The client disconnects once its last handle is dropped
        self.db
            .invalidate()
            .await
            .map_err(|e| ResilienceError::Query(e.to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
