//! Configuration loader for the `solarflow-telemetry` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;

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

    /// TCP port the HTTP surface listens on.
    pub listen_port: u32,

    /// Local wall-clock hour of the daily rollup trigger.
    pub rollup_hour: u32,

    /// Local wall-clock minute of the daily rollup trigger.
    pub rollup_minute: u32,

    /// Local wall-clock second of the daily rollup trigger.
    pub rollup_second: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `LISTEN_PORT` – HTTP listen port (default: 8080)
/// - `ROLLUP_HOUR` / `ROLLUP_MINUTE` / `ROLLUP_SECOND` – daily rollup
///   trigger time (default: 23:59:55)
///
/// Returns an error if any required variable is missing, or if a trigger
/// field is outside its wall-clock range.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let listen_port = parse_env_u32!("LISTEN_PORT", 8080);
    let rollup_hour = parse_env_u32!("ROLLUP_HOUR", 23);
    let rollup_minute = parse_env_u32!("ROLLUP_MINUTE", 59);
    let rollup_second = parse_env_u32!("ROLLUP_SECOND", 55);

    if listen_port > u32::from(u16::MAX) {
        return Err(anyhow!("Invalid LISTEN_PORT: {}", listen_port));
    }
    if rollup_hour > 23 || rollup_minute > 59 || rollup_second > 59 {
        return Err(anyhow!(
            "Invalid rollup trigger time {:02}:{:02}:{:02}",
            rollup_hour,
            rollup_minute,
            rollup_second
        ));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        listen_port,
        rollup_hour,
        rollup_minute,
        rollup_second,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        // Mask the password in the database URL for security
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL   : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX    : {}", self.db_pool_max);
        tracing::info!("  LISTEN_PORT    : {}", self.listen_port);
        tracing::info!(
            "  ROLLUP_AT      : {:02}:{:02}:{:02}",
            self.rollup_hour,
            self.rollup_minute,
            self.rollup_second
        );
    }
}
