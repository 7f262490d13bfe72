//! In-memory stand-in for the SurrealDB client

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surreal_pool::{
    Credentials, PoolConfig, ResilienceError, SurrealConnection, SurrealDriver, SurrealSession,
};

pub const PASSWORD: &str = "secret";

#[derive(Default)]
pub struct DriverState {
    pub connects: AtomicUsize,
    pub closed: AtomicUsize,
    /// Number of upcoming connects to refuse
    pub refuse_connects: AtomicUsize,
    pub fail_probes: AtomicBool,
}

pub struct MockDriver {
    pub state: Arc<DriverState>,
}

impl MockDriver {
    pub fn new() -> (Arc<Self>, Arc<DriverState>) {
        let state = Arc::new(DriverState::default());
        (
            Arc::new(Self {
                state: state.clone(),
            }),
            state,
        )
    }
}

#[async_trait]
impl SurrealDriver for MockDriver {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn SurrealSession>, ResilienceError> {
        let serial = self.state.connects.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .state
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ResilienceError::Connect {
                endpoint: endpoint.to_string(),
                message: "ECONNREFUSED".to_string(),
            });
        }

        Ok(Arc::new(MockSession {
            serial,
            state: self.state.clone(),
            scope: Mutex::new(None),
            user: Mutex::new(None),
        }))
    }
}

pub struct MockSession {
    pub serial: usize,
    state: Arc<DriverState>,
    scope: Mutex<Option<(String, Option<String>)>>,
    user: Mutex<Option<String>>,
}

impl MockSession {
    pub fn namespace(&self) -> Option<String> {
        self.scope.lock().as_ref().map(|(ns, _)| ns.clone())
    }

    pub fn user(&self) -> Option<String> {
        self.user.lock().clone()
    }
}

#[async_trait]
impl SurrealSession for MockSession {
    async fn use_namespace(
        &self,
        namespace: &str,
        database: Option<&str>,
    ) -> Result<(), ResilienceError> {
        *self.scope.lock() = Some((namespace.to_string(), database.map(str::to_string)));
        Ok(())
    }

    async fn signin(&self, credentials: &Credentials) -> Result<(), ResilienceError> {
        if credentials.password != PASSWORD {
            return Err(ResilienceError::Authentication(
                "There was a problem with authentication".to_string(),
            ));
        }
        *self.user.lock() = Some(credentials.username.clone());
        Ok(())
    }

    async fn query(&self, statement: &str) -> Result<Value, ResilienceError> {
        if self.state.fail_probes.load(Ordering::SeqCst) {
            return Err(ResilienceError::Query("connection reset by peer".to_string()));
        }
        Ok(json!({ "statement": statement, "session": self.serial }))
    }

    async fn close(&self) -> Result<(), ResilienceError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Concrete session behind a pooled connection
pub fn session(conn: &SurrealConnection) -> &MockSession {
    conn.as_any()
        .downcast_ref::<MockSession>()
        .expect("pooled connection is a MockSession")
}

pub fn credentials(namespace: &str) -> Credentials {
    Credentials::root("mem://", "root", PASSWORD).with_namespace(namespace)
}

/// Small pool without background health checks or retry delays
pub fn test_config() -> PoolConfig {
    PoolConfig {
        max_connections: 3,
        min_connections: 0,
        acquire_timeout: Duration::from_millis(500),
        health_check_interval: Duration::ZERO,
        retry_attempts: 0,
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}
