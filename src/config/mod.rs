//! Configuration module for Stat-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The resulting [`Config`] is built once at startup and handed to every
//! component that needs it.
//!
//! # Example
//!
//! ```no_run
//! use stat_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Retrying each fetch up to {} times", config.retry.max_attempts);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, CircuitBreakerConfig, Config, DatabaseConfig, EgressConfig, EgressStrategy,
    LeagueConfig, RateLimitConfig, RetryConfig, SourceConfig, SourceTableConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
