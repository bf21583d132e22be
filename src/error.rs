//! Per-component error types (§4.12).
//!
//! Each boundary gets its own `thiserror` enum; only the process-exit path in
//! `main` needs to reason about the union of all of them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no group descriptor for internal id {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum SignalClientError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Error)]
pub enum AssistantClientError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("SQL: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("migration: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("archive writer has shut down")]
    ShutDown,
}

/// Top-level process error. Only constructed at the `main` boundary, where
/// every fallible startup step is folded into one displayable type (§4.12).
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("schema initialization: {0}")]
    Schema(#[from] ArchiveError),
}
