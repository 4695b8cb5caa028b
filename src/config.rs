//! Runtime configuration.
//!
//! Read from the process environment, after loading a `.env` file from the
//! working directory when one exists. Only `ATLAS_WAREHOUSE_PATH` is
//! required; everything else has a default.
//!
//! | Variable                        | Default        |
//! |---------------------------------|----------------|
//! | `ATLAS_WAREHOUSE_PATH`          | (required)     |
//! | `ATLAS_BUSY_TIMEOUT_MS`         | 5000           |
//! | `ATLAS_POOL_MIN`                | 1              |
//! | `ATLAS_POOL_MAX`                | 10             |
//! | `ATLAS_POOL_IDLE_TIMEOUT_MS`    | 30000          |
//! | `ATLAS_POOL_ACQUIRE_TIMEOUT_MS` | 30000          |
//! | `ATLAS_CACHE_TTL_SECS`          | 300            |
//! | `ATLAS_CONNECT_RETRIES`         | 3              |
//! | `ATLAS_BIND_ADDR`               | 0.0.0.0:3000   |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::cache::DEFAULT_TTL_SECS;
use crate::db::SqliteManager;
use crate::pool::PoolConfig;
use crate::retry::RetryPolicy;

pub const WAREHOUSE_PATH_VAR: &str = "ATLAS_WAREHOUSE_PATH";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WarehouseConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl WarehouseConfig {
    pub fn manager(&self) -> SqliteManager {
        SqliteManager::new(self.path.clone(), self.busy_timeout)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub pool: PoolConfig,
    pub cache_ttl_secs: i64,
    pub connect_retries: u32,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    /// Load `.env` (if any) and read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name → value lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let path = get(WAREHOUSE_PATH_VAR).ok_or_else(|| ConfigError::Missing(vec![WAREHOUSE_PATH_VAR]))?;

        let defaults = PoolConfig::default();
        let pool = PoolConfig {
            min_size: parse_or(&get, "ATLAS_POOL_MIN", defaults.min_size)?,
            max_size: parse_or(&get, "ATLAS_POOL_MAX", defaults.max_size)?,
            idle_timeout: millis_or(&get, "ATLAS_POOL_IDLE_TIMEOUT_MS", defaults.idle_timeout)?,
            acquire_timeout: millis_or(&get, "ATLAS_POOL_ACQUIRE_TIMEOUT_MS", defaults.acquire_timeout)?,
        };
        validate_pool(&pool)?;

        let cache_ttl_secs = parse_or(&get, "ATLAS_CACHE_TTL_SECS", DEFAULT_TTL_SECS)?;
        if cache_ttl_secs <= 0 {
            return Err(invalid("ATLAS_CACHE_TTL_SECS", cache_ttl_secs, "must be positive"));
        }

        Ok(Self {
            warehouse: WarehouseConfig {
                path: PathBuf::from(path),
                busy_timeout: millis_or(&get, "ATLAS_BUSY_TIMEOUT_MS", Duration::from_secs(5))?,
            },
            pool,
            cache_ttl_secs,
            connect_retries: parse_or(&get, "ATLAS_CONNECT_RETRIES", 3)?,
            bind_addr: parse_or(&get, "ATLAS_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
        })
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.connect_retries, Duration::from_secs(1))
    }
}

fn validate_pool(pool: &PoolConfig) -> Result<(), ConfigError> {
    if pool.max_size == 0 {
        return Err(invalid("ATLAS_POOL_MAX", pool.max_size, "must be at least 1"));
    }
    if pool.min_size > pool.max_size {
        return Err(invalid(
            "ATLAS_POOL_MIN",
            pool.min_size,
            &format!("exceeds ATLAS_POOL_MAX ({})", pool.max_size),
        ));
    }
    Ok(())
}

fn invalid(var: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn millis_or<G>(get: &G, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, var, default.as_millis() as u64).map(Duration::from_millis)
}
