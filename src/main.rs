/*!
 * surreal-pool CLI
 *
 * Operator entry point: validate configuration, classify error messages and
 * exercise a live pool against a SurrealDB endpoint.
 */

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use surreal_pool::{
    classify_message,
    config::{AppConfig, LogLevel},
    error::{Result, EXIT_SUCCESS},
    logging, PoolConfig, PoolOverrides,
};

#[derive(Parser)]
#[command(name = "surreal-pool")]
#[command(version, about = "Pooled, health-checked SurrealDB connections", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the effective pool settings
    Validate {
        /// TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// JSON object of pool overrides (camelCase keys, milliseconds)
        #[arg(long)]
        overrides: Option<String>,
    },

    /// Classify an error message
    Classify {
        message: String,
    },

    /// Run acquire/query/release cycles and print pool statistics
    Probe {
        /// TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Number of acquire/query/release cycles
        #[arg(long, default_value = "10")]
        requests: usize,

        /// Cycles in flight at once
        #[arg(long, default_value = "1")]
        concurrency: usize,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config, overrides } => {
            let app = AppConfig::from_file(&config)?;
            app.validate()?;
            let pool = effective_pool_config(&app, overrides.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&pool_summary(&pool))?);
            Ok(())
        }
        Commands::Classify { message } => {
            let classification = classify_message(&message, None);
            println!("{}", serde_json::to_string_pretty(&classification)?);
            println!("suggestion: {}", classification.suggestion());
            Ok(())
        }
        Commands::Probe {
            config,
            requests,
            concurrency,
        } => {
            let mut app = AppConfig::from_file(&config)?;
            if let Some(level) = cli.log_level {
                app.logging.level = level.into();
            }
            app.logging.verbose |= cli.verbose;
            if let Err(e) = logging::init_logging(&app.logging) {
                eprintln!("Warning: Failed to initialize logging: {}", e);
            }
            app.validate()?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(probe::run(app, requests, concurrency.max(1)))
        }
    }
}

fn effective_pool_config(app: &AppConfig, overrides: Option<&str>) -> Result<PoolConfig> {
    let base = app.pool.to_pool_config();
    match overrides {
        Some(raw) => {
            let value: serde_json::Value = serde_json::from_str(raw)?;
            PoolOverrides::from_json(&value)?.apply(&base)
        }
        None => Ok(base),
    }
}

fn pool_summary(config: &PoolConfig) -> serde_json::Value {
    serde_json::json!({
        "maxConnections": config.max_connections,
        "minConnections": config.min_connections,
        "acquireTimeout": config.acquire_timeout.as_millis() as u64,
        "healthCheckInterval": config.health_check_interval.as_millis() as u64,
        "maxIdleTime": config.max_idle_time.as_millis() as u64,
        "retryAttempts": config.retry_attempts,
        "retryDelay": config.retry_delay.as_millis() as u64,
        "enableConnectionValidation": config.enable_connection_validation,
        "connectionValidationTimeout": config.connection_validation_timeout.as_millis() as u64,
    })
}

#[cfg(feature = "surrealdb")]
mod probe {
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;
    use surreal_pool::{
        get_or_init_default_pool, shutdown_default_pool, AppConfig, Result, SurrealEngineDriver,
        SurrealPoolError, SurrealSession as _, PROBE_STATEMENT,
    };
    use tracing::warn;

    pub async fn run(app: AppConfig, requests: usize, concurrency: usize) -> Result<()> {
        let credentials = app.credentials()?.clone();
        let pool = get_or_init_default_pool(
            Arc::new(SurrealEngineDriver),
            app.pool.to_pool_config(),
        )?;

        let failures = stream::iter(0..requests)
            .map(|_| {
                let pool = pool.clone();
                let credentials = credentials.clone();
                async move {
                    let conn = pool.acquire(&credentials).await?;
                    let result = conn.query(PROBE_STATEMENT).await;
                    pool.release(&credentials, &conn);
                    result.map(|_| ())
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(|outcome| async move {
                outcome
                    .map_err(|e| warn!(error = %e, "probe cycle failed"))
                    .err()
            })
            .count()
            .await;

        println!("{}", serde_json::to_string_pretty(&pool.stats())?);
        shutdown_default_pool().await;

        if failures > 0 {
            return Err(SurrealPoolError::Other(format!(
                "{} of {} probe cycles failed",
                failures, requests
            )));
        }
        Ok(())
    }
}

#[cfg(not(feature = "surrealdb"))]
mod probe {
    use surreal_pool::{AppConfig, Result, SurrealPoolError};

    pub async fn run(_app: AppConfig, _requests: usize, _concurrency: usize) -> Result<()> {
        Err(SurrealPoolError::Other(
            "probe needs the `surrealdb` feature".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use surreal_pool::SurrealPoolError;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_validate_subcommand() {
        let cli = Cli::try_parse_from([
            "surreal-pool",
            "validate",
            "--config",
            "pool.toml",
            "--overrides",
            r#"{"maxConnections": 4}"#,
        ])
        .unwrap();
        match cli.command {
            Commands::Validate { config, overrides } => {
                assert_eq!(config, PathBuf::from("pool.toml"));
                assert!(overrides.is_some());
            }
            _ => panic!("Expected Validate subcommand"),
        }
    }

    #[test]
    fn test_probe_defaults() {
        let cli = Cli::try_parse_from(["surreal-pool", "probe", "-c", "pool.toml"]).unwrap();
        match cli.command {
            Commands::Probe {
                requests,
                concurrency,
                ..
            } => {
                assert_eq!(requests, 10);
                assert_eq!(concurrency, 1);
            }
            _ => panic!("Expected Probe subcommand"),
        }
    }

    #[test]
    fn test_effective_pool_config_applies_overrides() {
        let app = AppConfig::default();
        let config =
            effective_pool_config(&app, Some(r#"{"maxConnections": 4, "retryDelay": 50}"#))
                .unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.retry_delay.as_millis(), 50);

        let err = effective_pool_config(&app, Some(r#"{"minConnections": 99}"#)).unwrap_err();
        assert!(matches!(err, SurrealPoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_pool_summary_uses_host_keys() {
        let summary = pool_summary(&PoolConfig::default());
        assert_eq!(summary["maxConnections"], 10);
        assert_eq!(summary["acquireTimeout"], 30_000);
    }
}
