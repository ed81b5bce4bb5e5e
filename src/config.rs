use std::env;
use thiserror::Error;
use tracing::warn;

/// Work factors bcrypt accepts
const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub cookie_secure: bool,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                warn!(error = %e, "Failed to load .env file");
            }
        }

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        Ok(Self {
            server_port: parse_or(&lookup, "SERVER_PORT", 8080)?,
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret,
            token_ttl_hours: parse_or(&lookup, "TOKEN_TTL_HOURS", 24)?,
            bcrypt_cost: parse_bcrypt_cost(&lookup)?,
            cookie_secure: parse_or(&lookup, "COOKIE_SECURE", false)?,
        })
    }
}

fn parse_bcrypt_cost<F>(lookup: &F) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let cost = parse_or(lookup, "BCRYPT_COST", 10)?;
    if !BCRYPT_COST_RANGE.contains(&cost) {
        return Err(ConfigError::Invalid {
            name: "BCRYPT_COST",
            value: cost.to_string(),
        });
    }
    Ok(cost)
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
