//! Process configuration, loaded from the environment (§6, §4.10).
//!
//! Mirrors the teacher's `std::env::var` + typed-default style (see
//! `services/server/src/main.rs` in the reference corpus) rather than a
//! config-file layer: the environment is the sole source of truth here.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    /// `host:port` of the Signal gateway, no scheme.
    pub signal_endpoint: String,
    pub registered_account: String,
    pub webhook_url: String,
    pub auth_token: String,
    pub authorization_whitelist: Vec<String>,
    pub group_cache_size: usize,
    pub database: DatabaseConfig,
    pub archive: ArchiveConfig,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let signal_endpoint = required_var("SIGNAL_ENDPOINT")?;
        let registered_account = required_var("REGISTERED_ACCOUNT")?;
        let webhook_url = required_var("WEBHOOK_URL")?;
        let auth_token = required_var("AUTH_TOKEN")?;

        let authorization_whitelist = optional_var("AUTHORIZATION_WHITELIST", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();

        let group_cache_size = parse_optional("GROUP_CACHE_SIZE", 1000)?;

        let database = DatabaseConfig {
            host: optional_var("TIMESCALE_HOST", "localhost"),
            port: parse_optional("TIMESCALE_PORT", 5432)?,
            database: optional_var("TIMESCALE_DATABASE", "signalbus"),
            username: optional_var("TIMESCALE_USERNAME", "postgres"),
            password: required_var("TIMESCALE_PASSWORD")?,
        };

        let archive = ArchiveConfig {
            queue_capacity: parse_optional("ARCHIVE_QUEUE_CAPACITY", 10_000)?,
            batch_size: parse_optional("TIMESCALE_BATCH_SIZE", 100)?,
            batch_timeout: Duration::from_secs(parse_optional(
                "TIMESCALE_BATCH_TIMEOUT_SECONDS",
                5,
            )?),
            max_connections: parse_optional("ARCHIVE_MAX_CONNECTIONS", 5)?,
        };

        let log_level = optional_var("LOG_LEVEL", "info");

        Ok(Config {
            signal_endpoint,
            registered_account,
            webhook_url,
            auth_token,
            authorization_whitelist,
            group_cache_size,
            database,
            archive,
            log_level,
        })
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional_var(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn parse_optional<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}
