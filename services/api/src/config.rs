//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono_tz::Tz;
use std::net::SocketAddr;
use std::time::Duration;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which browser origins may call the API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_max_lifetime: Duration,
    pub default_tz: Tz,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    pub invite_ttl: chrono::Duration,
    pub jwt_secret: String,
    pub cors_origins: CorsOrigins,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
    pub shutdown_grace: Duration,
    pub header_read_timeout: Duration,
    pub log_filter: String,
}

/// Reads a variable through `lookup`, treating blank values as unset.
fn var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match var(lookup, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}

fn positive(key: &str, value: i64) -> Result<i64, ConfigError> {
    if value <= 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{value}' must be positive"),
        ));
    }
    Ok(value)
}

impl CorsOrigins {
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsOrigins::Any
        } else {
            CorsOrigins::List(origins)
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server ---
        let bind_address = match var(&lookup, "BIND_ADDRESS") {
            Some(raw) => raw.parse::<SocketAddr>().map_err(|e| {
                ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
            })?,
            None => {
                let port: u16 = parsed(&lookup, "PORT", 8080)?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        // --- Database ---
        let database_url = var(&lookup, "DATABASE_URL")
            .or_else(|| var(&lookup, "DB_URL"))
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let db_max_connections: u32 = parsed(&lookup, "DB_MAX_CONNECTIONS", 10)?;
        let db_min_connections: u32 = parsed(&lookup, "DB_MIN_CONNECTIONS", 5)?;
        if db_min_connections > db_max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS".to_string(),
                format!("'{db_min_connections}' exceeds DB_MAX_CONNECTIONS"),
            ));
        }
        let lifetime_min = positive(
            "DB_MAX_LIFETIME_MIN",
            parsed(&lookup, "DB_MAX_LIFETIME_MIN", 30)?,
        )?;

        // --- Time and tokens ---
        let tz_name = var(&lookup, "DEFAULT_TZ").unwrap_or_else(|| "America/Santiago".to_string());
        let default_tz = tz_name.parse::<Tz>().map_err(|_| {
            ConfigError::InvalidValue(
                "DEFAULT_TZ".to_string(),
                format!("'{tz_name}' is not an IANA time zone"),
            )
        })?;
        let access_min = positive("ACCESS_TTL_MIN", parsed(&lookup, "ACCESS_TTL_MIN", 15)?)?;
        let refresh_h = positive("REFRESH_TTL_H", parsed(&lookup, "REFRESH_TTL_H", 168)?)?;
        let invite_h = positive("INVITE_TTL_H", parsed(&lookup, "INVITE_TTL_H", 72)?)?;
        let jwt_secret = var(&lookup, "JWT_SECRET")
            .ok_or_else(|| ConfigError::MissingVar("JWT_SECRET".to_string()))?;

        // --- HTTP edges ---
        let cors_origins =
            CorsOrigins::parse(&var(&lookup, "CORS_ORIGINS").unwrap_or_else(|| "*".to_string()));
        let rate_limit_rps: f64 = parsed(&lookup, "RATE_LIMIT_RPS", 3.0)?;
        if !(rate_limit_rps > 0.0) {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_RPS".to_string(),
                format!("'{rate_limit_rps}' must be positive"),
            ));
        }
        let rate_limit_burst: u32 = parsed(&lookup, "RATE_LIMIT_BURST", 5)?;
        if rate_limit_burst == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_BURST".to_string(),
                "'0' must be positive".to_string(),
            ));
        }
        let grace_secs: u64 = parsed(&lookup, "SHUTDOWN_GRACE_SECS", 10)?;
        let header_read_secs = positive(
            "HEADER_READ_TIMEOUT_SECS",
            parsed(&lookup, "HEADER_READ_TIMEOUT_SECS", 5)?,
        )?;
        let log_filter = var(&lookup, "RUST_LOG").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            db_min_connections,
            db_max_lifetime: Duration::from_secs(lifetime_min as u64 * 60),
            default_tz,
            access_ttl: chrono::Duration::minutes(access_min),
            refresh_ttl: chrono::Duration::hours(refresh_h),
            invite_ttl: chrono::Duration::hours(invite_h),
            jwt_secret,
            cors_origins,
            rate_limit_rps,
            rate_limit_burst,
            shutdown_grace: Duration::from_secs(grace_secs),
            header_read_timeout: Duration::from_secs(header_read_secs as u64),
            log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_only_required_vars() {
        let config = load(&[("DB_URL", "postgres://x"), ("JWT_SECRET", "s")]).unwrap();
        assert_eq!(config.database_url, "postgres://x");
        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.db_min_connections, 5);
        assert_eq!(config.default_tz, chrono_tz::America::Santiago);
        assert_eq!(config.access_ttl, chrono::Duration::minutes(15));
        assert_eq!(config.refresh_ttl, chrono::Duration::hours(168));
        assert_eq!(config.invite_ttl, chrono::Duration::hours(72));
        assert_eq!(config.cors_origins, CorsOrigins::Any);
        assert_eq!(config.rate_limit_burst, 5);
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.header_read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_and_invalid_values_fail() {
        assert!(matches!(
            load(&[("JWT_SECRET", "s")]),
            Err(ConfigError::MissingVar(v)) if v == "DATABASE_URL"
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "postgres://x")]),
            Err(ConfigError::MissingVar(v)) if v == "JWT_SECRET"
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "x"), ("JWT_SECRET", "s"), ("DEFAULT_TZ", "Mars/Base")]),
            Err(ConfigError::InvalidValue(v, _)) if v == "DEFAULT_TZ"
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "x"), ("JWT_SECRET", "s"), ("PORT", "http")]),
            Err(ConfigError::InvalidValue(v, _)) if v == "PORT"
        ));
        assert!(matches!(
            load(&[("DATABASE_URL", "x"), ("JWT_SECRET", "s"), ("HEADER_READ_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidValue(v, _)) if v == "HEADER_READ_TIMEOUT_SECS"
        ));
    }

    #[test]
    fn cors_origins_parse_lists() {
        assert_eq!(CorsOrigins::parse(" * "), CorsOrigins::Any);
        assert_eq!(
            CorsOrigins::parse("http://a.test, http://b.test,"),
            CorsOrigins::List(vec!["http://a.test".into(), "http://b.test".into()])
        );
    }
}
