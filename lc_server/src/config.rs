//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration.

use std::net::SocketAddr;
use thiserror::Error;

/// Complete server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address.
    pub bind: SocketAddr,
    /// Postgres connection string. When absent the server runs on the
    /// in-memory ledger and every balance dies with the process.
    pub database_url: Option<String>,
    /// Maximum database connections.
    pub db_max_connections: u32,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Seconds the baccarat betting window stays open.
    pub betting_window_secs: u64,
    /// Minutes a blackjack session may idle before eviction.
    pub session_idle_timeout_mins: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("missing required environment variable {0}")]
    MissingRequired(&'static str),
}

fn parse_env_or<T: std::str::FromStr>(
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from the environment. CLI overrides win over
    /// environment variables, which win over defaults.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_env_or("SERVER_BIND", "127.0.0.1:7171".parse().expect("valid default"))?,
        };
        let database_url = database_url_override.or_else(|| std::env::var("DATABASE_URL").ok());
        let jwt_secret =
            std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired("JWT_SECRET"))?;
        Ok(Self {
            bind,
            database_url,
            db_max_connections: parse_env_or("DB_MAX_CONNECTIONS", 20)?,
            jwt_secret,
            betting_window_secs: parse_env_or(
                "BETTING_WINDOW_SECS",
                live_casino::constants::BETTING_WINDOW_SECS,
            )?,
            session_idle_timeout_mins: parse_env_or(
                "SESSION_IDLE_TIMEOUT_MINS",
                live_casino::constants::SESSION_IDLE_TIMEOUT_MINS,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_defaults() {
        let bind: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        std::env::set_var("JWT_SECRET", "test-secret");
        let config = ServerConfig::from_env(Some(bind), Some("postgres://x".to_string())).unwrap();
        assert_eq!(config.bind, bind);
        assert_eq!(config.database_url.as_deref(), Some("postgres://x"));
        assert_eq!(config.jwt_secret, "test-secret");
    }
}
