use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads a TOML configuration file and validates it
///
/// Fails with [`ConfigError::Io`] when the file cannot be read, and with a
/// parse or validation error otherwise.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be correlated with the configuration they used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EgressStrategy;
    use crate::season::SeasonCode;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn write_config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const FULL_CONFIG: &str = r#"
[database]
path = "./stats.db"
batch-size = 250

[cache]
directory = "./cache"
max-age = 86400

[retry]
max-attempts = 5
initial-delay = 1.5
max-delay = 30
exponential-base = 3

[rate-limit]
requests-per-minute = 10
delay-between-requests = 2

[circuit-breaker]
failure-threshold = 4
recovery-timeout = 120

[egress]
user-agents = ["AgentA/1.0", "AgentB/2.0"]
strategy = "round-robin"

[[league]]
name = "ENG-Premier League"
season-end = 5

[[league]]
name = "USA-MLS"
season-end = 11
season-code = "single-year"

[[source]]
name = "clubelo"
priority = 2

[[source.table]]
name = "clubelo_ratings"
url = "https://api.example.com/{league}/{season}.json"
conflict-columns = ["team", "season"]
required-fields = ["team", "season", "elo"]

[[source]]
name = "fbref"
priority = 1

[[source.table]]
name = "fbref_schedule"
url = "https://fbref.example.com/{league}/{season}/schedule.json"
conflict-columns = ["game"]
required-fields = ["game", "date"]
records-path = "/data/games"
"#;

    #[test]
    fn test_full_config_round_trips_sections() {
        let file = write_config_file(FULL_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.database.batch_size, 250);
        assert_eq!(config.cache.max_age(), Some(Duration::from_secs(86400)));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay(), Duration::from_millis(1500));
        assert_eq!(config.rate_limit.requests_per_minute, 10);
        assert_eq!(config.circuit_breaker.failure_threshold, 4);
        assert_eq!(config.egress.strategy, EgressStrategy::RoundRobin);
        assert_eq!(config.leagues.len(), 2);
        assert_eq!(config.leagues[1].season_code, SeasonCode::SingleYear);
        assert_eq!(
            config.sources[1].tables[0].records_path.as_deref(),
            Some("/data/games")
        );
    }

    #[test]
    fn test_defaults_apply_to_missing_sections() {
        let config = parse_config(
            r#"
[database]
path = "./stats.db"
"#,
        )
        .unwrap();

        assert_eq!(config.database.batch_size, 500);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay(), Duration::from_secs(2));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.requests_per_minute, 20);
        assert_eq!(
            config.rate_limit.delay_between_requests(),
            Duration::from_secs(3)
        );
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(
            config.circuit_breaker.recovery_timeout(),
            Duration::from_secs(60)
        );
        assert!(config.cache.directory.is_none());
        assert!(config.cache.max_age().is_none());
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_enabled_sources_ordered_by_priority() {
        let config = parse_config(FULL_CONFIG).unwrap();
        let names: Vec<_> = config
            .enabled_sources()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["fbref", "clubelo"]);
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let file = write_config_file("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result = parse_config(
            r#"
[database]
path = "./stats.db"

[egress]
strategy = "sticky"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_retry_attempts_fails_validation() {
        let result = parse_config(
            r#"
[database]
path = "./stats.db"

[retry]
max-attempts = 0
"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_config_hash_is_hex_sha256() {
        let file = write_config_file("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_config_hash_tracks_content() {
        let file1 = write_config_file("content 1");
        let file2 = write_config_file("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
