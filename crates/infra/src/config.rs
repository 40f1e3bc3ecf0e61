//! Process configuration read from the environment at startup.

use std::net::SocketAddr;

use thiserror::Error;

use deskhive_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24 * 7;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_BCRYPT_COST: u32 = 10;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bcrypt_cost: u32,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("db_max_connections", &self.db_max_connections)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (empty values count as unset).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = match get("DESKHIVE_BIND_ADDR") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("DESKHIVE_BIND_ADDR", &raw, format!("{e}")))?,
            None => DEFAULT_BIND_ADDR
                .parse()
                .map_err(|e| ConfigError::invalid("DESKHIVE_BIND_ADDR", DEFAULT_BIND_ADDR, format!("{e}")))?,
        };

        // Logged by the binary once the subscriber is installed.
        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.to_string());

        let ttl_hours = match get("DESKHIVE_TOKEN_TTL_HOURS") {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(h) if h > 0 => h,
                _ => return Err(ConfigError::invalid("DESKHIVE_TOKEN_TTL_HOURS", &raw, "expected a positive integer")),
            },
            None => DEFAULT_TOKEN_TTL_HOURS,
        };

        let db_max_connections = match get("DESKHIVE_DB_MAX_CONNECTIONS") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::invalid(
                        "DESKHIVE_DB_MAX_CONNECTIONS",
                        &raw,
                        "expected a positive integer",
                    ));
                }
            },
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        let bcrypt_cost = match get("DESKHIVE_BCRYPT_COST") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(c) if (4..=31).contains(&c) => c,
                _ => return Err(ConfigError::invalid("DESKHIVE_BCRYPT_COST", &raw, "expected 4..=31")),
            },
            None => DEFAULT_BCRYPT_COST,
        };

        let log_format = match get("DESKHIVE_LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::invalid("DESKHIVE_LOG_FORMAT", &raw, format!("{e}")))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            token_ttl: chrono::Duration::hours(ttl_hours),
            database_url: get("DATABASE_URL"),
            db_max_connections,
            bcrypt_cost,
            log_format,
        })
    }
}
