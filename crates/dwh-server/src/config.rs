//! Configuration management
//!
//! Everything is read from the environment (after `.env`), with defaults
//! suitable for a local PostgreSQL.

use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;

use crate::db::DbConfig;
use crate::etl::{StagingPolicy, DEFAULT_BATCH_SIZE};

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default source file for the ETL run.
pub const DEFAULT_CSV_FILE_PATH: &str = "online_store_sales.csv";

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DbConfig,
    pub etl: EtlConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Inputs of one ETL run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EtlConfig {
    pub csv_file_path: PathBuf,
    pub staging_policy: StagingPolicy,
    /// Rows per chunk for staging commits and multi-row upserts
    pub batch_size: usize,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            csv_file_path: PathBuf::from(DEFAULT_CSV_FILE_PATH),
            staging_policy: StagingPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl EtlConfig {
    /// `CSV_FILE_PATH`, `ETL_STAGING_POLICY`, `ETL_BATCH_SIZE`
    pub fn from_env() -> anyhow::Result<Self> {
        let staging_policy = match std::env::var("ETL_STAGING_POLICY") {
            Ok(value) => value.parse::<StagingPolicy>()?,
            Err(_) => StagingPolicy::default(),
        };

        let batch_size = match std::env::var("ETL_BATCH_SIZE") {
            Ok(value) => value
                .trim()
                .parse()
                .with_context(|| format!("ETL_BATCH_SIZE must be a positive integer, got '{value}'"))?,
            Err(_) => DEFAULT_BATCH_SIZE,
        };

        Ok(Self {
            csv_file_path: std::env::var("CSV_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CSV_FILE_PATH)),
            staging_policy,
            batch_size,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("DWH_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("DWH_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: std::env::var("DWH_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            database: DbConfig::from_env(),
            etl: EtlConfig::from_env()?,
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: std::env::var("CORS_ALLOW_CREDENTIALS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(false),
            },
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.etl.batch_size == 0 {
            anyhow::bail!("ETL batch size must be greater than 0");
        }

        if self.etl.csv_file_path.as_os_str().is_empty() {
            anyhow::bail!("CSV_FILE_PATH cannot be empty");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DbConfig::default(),
            etl: EtlConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: false,
            },
        }
    }
}
