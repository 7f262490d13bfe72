/*!
 * Database driver seam
 *
 * The pool never talks to SurrealDB directly. A [`SurrealDriver`] opens
 * transports and a [`SurrealSession`] is one open, possibly authenticated
 * connection. The real client lives behind the `surrealdb` feature; tests and
 * embedders can supply their own.
 */

use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use surreal_core_resilience::ResilienceError;

use crate::credentials::Credentials;

/// Opens transports to a database endpoint
#[async_trait]
pub trait SurrealDriver: Send + Sync + 'static {
    /// Open a transport; failures should map to [`ResilienceError::Connect`]
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn SurrealSession>, ResilienceError>;
}

/// One open connection
#[async_trait]
pub trait SurrealSession: Send + Sync + 'static {
    /// Select the namespace, and the database when given
    async fn use_namespace(
        &self,
        namespace: &str,
        database: Option<&str>,
    ) -> Result<(), ResilienceError>;

    /// Authenticate; failures should map to [`ResilienceError::Authentication`]
    async fn signin(&self, credentials: &Credentials) -> Result<(), ResilienceError>;

    /// Run a statement and return the first result set
    async fn query(&self, statement: &str) -> Result<Value, ResilienceError>;

    /// Close the connection (best-effort)
    async fn close(&self) -> Result<(), ResilienceError>;

    /// Downcast hook for reaching the concrete client
    fn as_any(&self) -> &dyn Any;
}
