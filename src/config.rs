//! Configuration loader for the `sensorflow-quality` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The per-reading-type sensor document lives in its
//! own file; only its path is configured here.
//!
use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Default location of the sensor config document.
pub const DEFAULT_SENSOR_CONFIG_PATH: &str = "config/sensor_config.json";

/// Ten years of hourly samples.
pub const DEFAULT_AUDIT_MAX_COVERAGE_HOURS: u32 = 87_600;

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Port the HTTP server listens on.
    pub bind_port: u16,

    /// Path of the per-reading-type bounds/calibration document.
    pub sensor_config_path: PathBuf,

    /// Longest hourly grid the coverage audit will build for one sensor.
    pub audit_max_coverage_hours: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_PORT` – HTTP listen port (default: 8080)
/// - `SENSOR_CONFIG_PATH` – sensor config document (default: `config/sensor_config.json`)
/// - `AUDIT_MAX_COVERAGE_HOURS` – per-sensor coverage grid limit (default: 87600)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let bind_port = u16::try_from(parse_env_u32!("BIND_PORT", 8080))
        .map_err(|e| anyhow!("Invalid BIND_PORT: {}", e))?;
    let audit_max_coverage_hours =
        parse_env_u32!("AUDIT_MAX_COVERAGE_HOURS", DEFAULT_AUDIT_MAX_COVERAGE_HOURS);
    let sensor_config_path = env::var("SENSOR_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SENSOR_CONFIG_PATH));

    Ok(Config {
        db_url,
        db_pool_max,
        bind_port,
        sensor_config_path,
        audit_max_coverage_hours,
    })
}

impl Config {
    /// Mask the password component of the database URL.
    fn masked_db_url(&self) -> String {
        // ---
        let Some(at_pos) = self.db_url.rfind('@') else {
            return self.db_url.clone();
        };
        match self.db_url[..at_pos].rfind(':') {
            // `postgres://host...` has its only colon in the scheme
            Some(colon_pos) if !self.db_url[colon_pos..].starts_with("://") => format!(
                "{}:****{}",
                &self.db_url[..colon_pos],
                &self.db_url[at_pos..]
            ),
            _ => self.db_url.clone(),
        }
    }

    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL             : {}", self.masked_db_url());
        tracing::info!("  DB_POOL_MAX              : {}", self.db_pool_max);
        tracing::info!("  BIND_PORT                : {}", self.bind_port);
        tracing::info!("  SENSOR_CONFIG_PATH       : {}", self.sensor_config_path.display());
        tracing::info!("  AUDIT_MAX_COVERAGE_HOURS : {}", self.audit_max_coverage_hours);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn with_url(db_url: &str) -> Config {
        Config {
            db_url: db_url.to_string(),
            db_pool_max: 5,
            bind_port: 8080,
            sensor_config_path: PathBuf::from(DEFAULT_SENSOR_CONFIG_PATH),
            audit_max_coverage_hours: DEFAULT_AUDIT_MAX_COVERAGE_HOURS,
        }
    }

    #[test]
    fn test_password_is_masked() {
        // ---
        let cfg = with_url("postgres://sensor:s3cret@db:5432/sensorflow");
        assert_eq!(cfg.masked_db_url(), "postgres://sensor:****@db:5432/sensorflow");
    }

    #[test]
    fn test_url_without_credentials_unchanged() {
        // ---
        let cfg = with_url("postgres://db:5432/sensorflow");
        assert_eq!(cfg.masked_db_url(), "postgres://db:5432/sensorflow");

        let cfg = with_url("postgres://sensor@db/sensorflow");
        assert_eq!(cfg.masked_db_url(), "postgres://sensor@db/sensorflow");
    }
}
