use crate::config::types::{
    CircuitBreakerConfig, Config, DatabaseConfig, EgressConfig, LeagueConfig, RateLimitConfig,
    RetryConfig, SourceConfig, SourceTableConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_database_config(&config.database)?;
    validate_retry_config(&config.retry)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_circuit_breaker_config(&config.circuit_breaker)?;
    validate_egress_config(&config.egress)?;
    validate_leagues(&config.leagues)?;
    validate_sources(&config.sources)?;
    Ok(())
}

fn validate_database_config(config: &DatabaseConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "database path cannot be empty".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    for (name, value) in [
        ("initial-delay", config.initial_delay),
        ("max-delay", config.max_delay),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be a non-negative number of seconds, got {}",
                name, value
            )));
        }
    }

    if !config.exponential_base.is_finite() || config.exponential_base < 1.0 {
        return Err(ConfigError::Validation(format!(
            "exponential-base must be >= 1, got {}",
            config.exponential_base
        )));
    }

    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.requests_per_minute < 1 {
        return Err(ConfigError::Validation(format!(
            "requests-per-minute must be >= 1, got {}",
            config.requests_per_minute
        )));
    }

    if !config.delay_between_requests.is_finite() || config.delay_between_requests < 0.0 {
        return Err(ConfigError::Validation(format!(
            "delay-between-requests must be >= 0, got {}",
            config.delay_between_requests
        )));
    }

    Ok(())
}

fn validate_circuit_breaker_config(config: &CircuitBreakerConfig) -> Result<(), ConfigError> {
    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "failure-threshold must be >= 1, got {}",
            config.failure_threshold
        )));
    }

    if !config.recovery_timeout.is_finite() || config.recovery_timeout < 0.0 {
        return Err(ConfigError::Validation(format!(
            "recovery-timeout must be >= 0, got {}",
            config.recovery_timeout
        )));
    }

    Ok(())
}

fn validate_egress_config(config: &EgressConfig) -> Result<(), ConfigError> {
    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty entries".to_string(),
        ));
    }

    for proxy in &config.proxies {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    if !config.timeout.is_finite() || config.timeout <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "egress timeout must be > 0, got {}",
            config.timeout
        )));
    }

    Ok(())
}

fn validate_leagues(leagues: &[LeagueConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for league in leagues {
        if league.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "league name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(league.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "league '{}' is configured more than once",
                league.name
            )));
        }

        if let Some(month) = league.season_end {
            if !(1..=12).contains(&month) {
                return Err(ConfigError::Validation(format!(
                    "season-end for league '{}' must be a month between 1 and 12, got {}",
                    league.name, month
                )));
            }
        }
    }

    Ok(())
}

fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in sources {
        if source.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(source.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "source '{}' is configured more than once",
                source.name
            )));
        }

        if source.tables.is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}' must declare at least one table",
                source.name
            )));
        }

        for table in &source.tables {
            validate_table(&source.name, table)?;
        }
    }

    Ok(())
}

fn validate_table(source: &str, table: &SourceTableConfig) -> Result<(), ConfigError> {
    if table.name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "source '{}' has a table with an empty name",
            source
        )));
    }

    if table.conflict_columns.is_empty() {
        return Err(ConfigError::Validation(format!(
            "table '{}' of source '{}' must declare conflict-columns",
            table.name, source
        )));
    }

    // Conflict columns are only guaranteed present when they are also required
    if let Some(column) = table
        .conflict_columns
        .iter()
        .find(|c| !table.required_fields.contains(c))
    {
        return Err(ConfigError::Validation(format!(
            "conflict column '{}' of table '{}' must also be a required field",
            column, table.name
        )));
    }

    let sample = table
        .url
        .replace("{league}", "league")
        .replace("{season}", "season");
    let url = Url::parse(&sample).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid URL template '{}' for table '{}': {}",
            table.url, table.name, e
        ))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "URL template '{}' for table '{}' must use http or https",
            table.url, table.name
        )));
    }

    if let Some(path) = &table.records_path {
        if !path.is_empty() && !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "records-path '{}' of table '{}' must be a JSON pointer starting with '/'",
                path, table.name
            )));
        }
    }

    Ok(())
}
