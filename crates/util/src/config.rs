use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://hr-insights.db";
pub const DEFAULT_GENERAL_TTL_SECS: u64 = 300;
pub const DEFAULT_DEPARTMENT_TTL_SECS: u64 = 600;
pub const DEFAULT_USER_MANAGEMENT_TTL_SECS: u64 = 600;
pub const DEFAULT_RECENT_ACTIVITY_DAYS: u32 = 30;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Time-to-live bands applied by the stats cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub general: Duration,
    pub department: Duration,
    pub user_management: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            general: Duration::from_secs(DEFAULT_GENERAL_TTL_SECS),
            department: Duration::from_secs(DEFAULT_DEPARTMENT_TTL_SECS),
            user_management: Duration::from_secs(DEFAULT_USER_MANAGEMENT_TTL_SECS),
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub cache_ttls: CacheTtls,
    pub recent_activity_days: u32,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let cache_ttls = CacheTtls {
            general: Duration::from_secs(read_positive(
                "STATS_TTL_GENERAL_SECS",
                DEFAULT_GENERAL_TTL_SECS,
            )?),
            department: Duration::from_secs(read_positive(
                "STATS_TTL_DEPARTMENT_SECS",
                DEFAULT_DEPARTMENT_TTL_SECS,
            )?),
            user_management: Duration::from_secs(read_positive(
                "STATS_TTL_USER_MANAGEMENT_SECS",
                DEFAULT_USER_MANAGEMENT_TTL_SECS,
            )?),
        };
        let recent_activity_days = read_positive(
            "RECENT_ACTIVITY_DAYS",
            u64::from(DEFAULT_RECENT_ACTIVITY_DAYS),
        )?;
        let recent_activity_days = u32::try_from(recent_activity_days).map_err(|_| {
            ConfigError::InvalidNumber {
                key: "RECENT_ACTIVITY_DAYS",
                value: recent_activity_days.to_string(),
            }
        })?;

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            cache_ttls,
            recent_activity_days,
        })
    }
}

fn read_positive(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidNumber { key, value: raw }),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APP_ENV must be one of 'development', 'production', or 'test' (got {0})")]
    InvalidEnvironment(String),
    #[error("invalid APP_BIND_ADDR value: {0}")]
    BindAddress(std::net::AddrParseError),
    #[error("{key} must be a positive integer (got {value})")]
    InvalidNumber { key: &'static str, value: String },
}
