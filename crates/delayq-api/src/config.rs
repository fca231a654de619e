//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use delayq_engine::application::engine::DEFAULT_PAYLOAD_TTL;
use delayq_store::schema::DEFAULT_PAYLOAD_COLLECTION;

use crate::error::AppError;

/// Settings the server needs at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Upper bound on pooled database connections.
    pub max_connections: u32,
    /// Table holding event payloads.
    pub payload_collection: String,
    /// TTL the payload collection is provisioned with.
    pub payload_ttl: Duration,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is unset or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".into())
        })?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 3000)?;
        let max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?;
        let payload_collection = lookup("PAYLOAD_COLLECTION")
            .unwrap_or_else(|| DEFAULT_PAYLOAD_COLLECTION.to_string());
        let payload_ttl = Duration::from_secs(parse_or(
            &lookup,
            "PAYLOAD_TTL_SECONDS",
            DEFAULT_PAYLOAD_TTL.as_secs(),
        )?);

        Ok(Self {
            database_url,
            host,
            port,
            max_connections,
            payload_collection,
            payload_ttl,
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/delayq")]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.payload_collection, "delayed_queue_payloads");
        assert_eq!(config.payload_ttl, Duration::from_secs(31_622_400));
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        let result = config_from(&[("PORT", "8080")]);

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db/delayq"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("PAYLOAD_COLLECTION", "payloads"),
            ("PAYLOAD_TTL_SECONDS", "60"),
        ])
        .unwrap();

        assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.payload_collection, "payloads");
        assert_eq!(config.payload_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_unparseable_port_is_a_config_error() {
        let result = config_from(&[("DATABASE_URL", "postgres://db"), ("PORT", "http")]);

        let Err(AppError::Config(message)) = result else {
            panic!("expected a config error");
        };
        assert!(message.starts_with("PORT"));
    }

    #[test]
    fn test_hostname_is_rejected_by_listen_addr() {
        let config = config_from(&[("DATABASE_URL", "postgres://db"), ("HOST", "localhost")])
            .unwrap();

        assert!(matches!(config.listen_addr(), Err(AppError::Config(_))));
    }
}
