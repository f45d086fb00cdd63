//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use crate::ddl::SinkMode;
use crate::naming::DEFAULT_MAX_IDENTIFIER_LENGTH;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub schema: String,
    pub max_pool_size: usize,
    pub require_tls: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            schema: "public".to_string(),
            max_pool_size: 4,
            require_tls: false,
        }
    }
}

/// What to run and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub plan: PathBuf,
    pub mode: SinkMode,
    pub output_dir: PathBuf,
    pub table_prefix: String,
    pub max_identifier_length: usize,
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub migration: MigrationConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any variable source
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = DatabaseConfig::default();

        // DATABASE_URL wins over the individual variables
        let mut database = if let Some(database_url) = var("DATABASE_URL") {
            Self::parse_database_url(&database_url)?
        } else {
            DatabaseConfig {
                host: var("DB_HOST").unwrap_or(defaults.host.clone()),
                port: parse_or(&var, "DB_PORT", defaults.port)?,
                user: var("DB_USER").unwrap_or(defaults.user.clone()),
                password: var("DB_PASSWORD").unwrap_or_default(),
                database: var("DB_NAME").unwrap_or(defaults.database.clone()),
                ..DatabaseConfig::default()
            }
        };
        database.schema = var("DB_SCHEMA").unwrap_or(defaults.schema);
        database.max_pool_size = parse_or(&var, "DB_MAX_CONNECTIONS", defaults.max_pool_size)?;
        if let Some(flag) = var("DB_REQUIRE_TLS") {
            database.require_tls = parse_flag("DB_REQUIRE_TLS", &flag)?;
        }

        let mode = match var("MIGRATION_MODE") {
            Some(mode) => mode.parse().map_err(ConfigError::InvalidValue)?,
            None => SinkMode::default(),
        };

        let migration = MigrationConfig {
            plan: var("MIGRATION_PLAN")
                .map(PathBuf::from)
                .ok_or_else(|| ConfigError::MissingVar("MIGRATION_PLAN".to_string()))?,
            mode,
            output_dir: PathBuf::from(var("MIGRATION_OUTPUT_DIR").unwrap_or_else(|| "migrations".to_string())),
            table_prefix: var("DB_TABLE_PREFIX").unwrap_or_default(),
            max_identifier_length: parse_or(&var, "MAX_IDENTIFIER_LENGTH", DEFAULT_MAX_IDENTIFIER_LENGTH)?,
        };

        Ok(Self { database, migration })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str) -> Result<DatabaseConfig, ConfigError> {
        let parsed = url::Url::parse(url).map_err(|_| {
            ConfigError::InvalidValue("Invalid DATABASE_URL format (expected postgresql://...)".to_string())
        })?;
        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(ConfigError::InvalidValue(format!(
                "Unsupported DATABASE_URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(ConfigError::InvalidValue("Missing database name in DATABASE_URL".to_string()));
        }

        let require_tls = parsed
            .query_pairs()
            .any(|(key, value)| key == "sslmode" && (value == "require" || value.starts_with("verify")));

        Ok(DatabaseConfig {
            host,
            port: parsed.port().unwrap_or(5432),
            user: parsed.username().to_string(),
            password: parsed.password().map(|p| p.to_string()).unwrap_or_default(),
            database,
            require_tls,
            ..DatabaseConfig::default()
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, raw))),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!("{}={}", key, raw))),
    }
}
