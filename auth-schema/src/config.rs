use crate::error::{Result, SchemaError};
use std::str::FromStr;
use std::time::Duration;

/// Schema store configuration
#[derive(Debug, Clone)]
pub struct SchemaStoreConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Deadline applied to operations whose context carries none
    pub operation_timeout: Option<Duration>,
    /// Create the schema table on connect
    pub run_migrations: bool,
}

impl Default for SchemaStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost:5432/rustcare".to_string(),
            max_connections: 20,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            operation_timeout: None,
            run_migrations: false,
        }
    }
}

impl SchemaStoreConfig {
    /// Load configuration from environment variables (and `.env`, if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("SCHEMA_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .ok_or_else(|| {
                SchemaError::Configuration(
                    "SCHEMA_DATABASE_URL or DATABASE_URL must be set".to_string(),
                )
            })?;

        let max_connections = parse_var(
            &lookup,
            "SCHEMA_DB_MAX_CONNECTIONS",
            defaults.max_connections,
        )?;
        let min_connections = parse_var(
            &lookup,
            "SCHEMA_DB_MIN_CONNECTIONS",
            defaults.min_connections,
        )?;
        if min_connections > max_connections {
            return Err(SchemaError::Configuration(format!(
                "SCHEMA_DB_MIN_CONNECTIONS ({}) exceeds SCHEMA_DB_MAX_CONNECTIONS ({})",
                min_connections, max_connections
            )));
        }

        let acquire_timeout = Duration::from_secs(parse_var(
            &lookup,
            "SCHEMA_DB_ACQUIRE_TIMEOUT_SECS",
            defaults.acquire_timeout.as_secs(),
        )?);
        let idle_timeout = Duration::from_secs(parse_var(
            &lookup,
            "SCHEMA_DB_IDLE_TIMEOUT_SECS",
            defaults.idle_timeout.as_secs(),
        )?);

        let operation_timeout = match lookup("SCHEMA_OPERATION_TIMEOUT_MS") {
            Some(raw) => Some(Duration::from_millis(parse_value(
                "SCHEMA_OPERATION_TIMEOUT_MS",
                &raw,
            )?)),
            None => None,
        };

        let run_migrations = parse_var(&lookup, "SCHEMA_RUN_MIGRATIONS", defaults.run_migrations)?;

        Ok(Self {
            database_url,
            max_connections,
            min_connections,
            acquire_timeout,
            idle_timeout,
            operation_timeout,
            run_migrations,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| SchemaError::Configuration(format!("Invalid value for {}: '{}'", key, raw)))
}
