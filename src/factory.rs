/*!
 * SurrealDB connection factory
 *
 * Opening a pooled connection is a fixed sequence: check the credential scope,
 * open the transport, select namespace/database, then sign in. Once the
 * transport is open, any later failure closes it before the error propagates.
 */

use async_trait::async_trait;
use std::sync::Arc;
use surreal_core_resilience::{ConnectionFactory, ConnectionPool, PoolKey, ResilienceError};
use tracing::{debug, warn};

use crate::credentials::Credentials;
use crate::driver::{SurrealDriver, SurrealSession};

/// Statement used for validation and health probes
pub const PROBE_STATEMENT: &str = "RETURN 1";

/// Pool of SurrealDB sessions keyed by credential identity
pub type SurrealPool = ConnectionPool<SurrealConnectionFactory>;

/// Pooled connection handle
pub type SurrealConnection = Arc<dyn SurrealSession>;

/// Builds authenticated sessions through a [`SurrealDriver`]
#[derive(Clone)]
pub struct SurrealConnectionFactory {
    driver: Arc<dyn SurrealDriver>,
}

impl SurrealConnectionFactory {
    pub fn new(driver: Arc<dyn SurrealDriver>) -> Self {
        Self { driver }
    }

    async fn prepare(
        &self,
        session: &SurrealConnection,
        credentials: &Credentials,
    ) -> Result<(), ResilienceError> {
        if let Some(namespace) = credentials.namespace.as_deref() {
            session
                .use_namespace(namespace, credentials.database.as_deref())
                .await?;
        }
        session.signin(credentials).await
    }
}

#[async_trait]
impl ConnectionFactory for SurrealConnectionFactory {
    type Credentials = Credentials;
    type Connection = SurrealConnection;

    fn pool_key(&self, credentials: &Credentials) -> PoolKey {
        credentials.pool_key()
    }

    async fn create(&self, credentials: &Credentials) -> Result<SurrealConnection, ResilienceError> {
        credentials.validate_scope()?;

        let session = self.driver.connect(&credentials.endpoint).await?;

        if let Err(e) = self.prepare(&session, credentials).await {
            if let Err(close_err) = session.close().await {
                debug!(error = %close_err, "ignoring close failure after setup error");
            }
            warn!(
                endpoint = %credentials.endpoint,
                auth_mode = %credentials.auth_mode,
                error = %e,
                "connection setup failed"
            );
            return Err(e);
        }

        debug!(key = %credentials.pool_key(), "opened SurrealDB session");
        Ok(session)
    }

    async fn validate(&self, connection: &SurrealConnection) -> Result<(), ResilienceError> {
        connection.query(PROBE_STATEMENT).await.map(|_| ())
    }

    async fn close(&self, connection: SurrealConnection) -> Result<(), ResilienceError> {
        connection.close().await
    }
}
