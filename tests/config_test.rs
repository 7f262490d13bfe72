use serde_json::json;
use std::io::Write;
use std::time::Duration;
use surreal_pool::{AppConfig, AuthMode, PoolOverrides, SurrealPoolError};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config_file() {
    let file = write_config(
        r#"
        [connection]
        endpoint = "ws://db.internal:8000"
        auth_mode = "database"
        username = "svc"
        password = "pw"
        namespace = "app"
        database = "main"

        [pool]
        max_connections = 8
        min_connections = 1
        acquire_timeout_ms = 2000
        enable_connection_validation = false

        [logging]
        level = "warn"
        "#,
    );

    let config = AppConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();

    let creds = config.credentials().unwrap();
    assert_eq!(creds.auth_mode, AuthMode::Database);
    assert_eq!(creds.pool_key().as_str(), "ws://db.internal:8000|app|main|database:svc");

    let pool = config.pool.to_pool_config();
    assert_eq!(pool.max_connections, 8);
    assert_eq!(pool.acquire_timeout, Duration::from_secs(2));
    assert!(!pool.enable_connection_validation);
    assert_eq!(pool.health_check_interval, Duration::from_secs(60));
}

#[test]
fn test_missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SurrealPoolError::Config(_)));
    assert_eq!(err.exit_code(), surreal_pool::error::EXIT_CONFIG);
}

#[test]
fn test_malformed_toml_is_rejected() {
    let file = write_config("[pool\nmax_connections = ");
    assert!(AppConfig::from_file(file.path()).is_err());
}

#[test]
fn test_config_without_connection_table() {
    let file = write_config("[pool]\nmax_connections = 4\n");
    let config = AppConfig::from_file(file.path()).unwrap();
    assert!(config.validate().is_ok());
    assert!(config.credentials().is_err());
}

#[test]
fn test_host_overrides_on_top_of_file() {
    let file = write_config("[pool]\nmax_connections = 4\nmin_connections = 1\n");
    let config = AppConfig::from_file(file.path()).unwrap();

    let overrides = PoolOverrides::from_json(&json!({
        "maxConnections": 6,
        "healthCheckInterval": 0
    }))
    .unwrap();
    let merged = overrides.apply(&config.pool.to_pool_config()).unwrap();
    assert_eq!(merged.max_connections, 6);
    assert_eq!(merged.min_connections, 1);
    assert!(merged.health_check_interval.is_zero());

    let err = PoolOverrides::from_json(&json!({ "maxConnections": 0 }))
        .unwrap()
        .apply(&config.pool.to_pool_config())
        .unwrap_err();
    assert!(matches!(err, SurrealPoolError::InvalidConfig(_)));
}
