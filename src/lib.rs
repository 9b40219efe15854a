//! Stat-Harvest: a resumable multi-source statistics loader
//!
//! This crate pulls structured statistics from many independent web sources and
//! upserts them into a SQLite store. Every (source, table, league, season) unit
//! of work is tracked in a load status table, so an interrupted run can be
//! restarted and will pick up exactly where it stopped.
//!
//! Fetches go through a [`fetch::FetchController`] that rate limits, circuit
//! breaks and retries against flaky remote services, and consults a
//! TTL-aware [`cache::CacheStore`] before touching the network.

pub mod adapter;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod orchestrator;
pub mod output;
pub mod record;
pub mod season;
pub mod storage;

use thiserror::Error;

/// Main error type for Stat-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Write error: {0}")]
    Write(#[from] storage::WriteError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] adapter::AdapterError),

    #[error("Season error: {0}")]
    Season(#[from] season::SeasonError),

    #[error("Unknown data source: {0}")]
    UnknownSource(String),

    #[error("Invalid run request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL template in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Stat-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Renders an error together with its chain of sources, separated by `: `
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

// Re-export commonly used types
pub use adapter::{AdapterRegistry, SourceAdapter, TableConfig};
pub use config::Config;
pub use orchestrator::{Orchestrator, RunRequest, RunSummary};
pub use record::{NormalizedRecord, Value};
