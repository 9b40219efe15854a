use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Stat-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(rename = "circuit-breaker", default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(rename = "league", default)]
    pub leagues: Vec<LeagueConfig>,
    #[serde(rename = "source", default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Returns the enabled sources ordered by priority (lowest first), then name
    pub fn enabled_sources(&self) -> Vec<&SourceConfig> {
        let mut sources: Vec<_> = self.sources.iter().filter(|s| s.enabled).collect();
        sources.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        sources
    }

    /// Returns the names of all enabled leagues in configuration order
    pub fn enabled_leagues(&self) -> Vec<String> {
        self.leagues
            .iter()
            .filter(|l| l.enabled)
            .map(|l| l.name.clone())
            .collect()
    }

    pub fn league(&self, name: &str) -> Option<&LeagueConfig> {
        self.leagues.iter().find(|l| l.name == name)
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

/// Relational store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,

    /// Optional SQL script creating the target tables, run at startup
    #[serde(default)]
    pub schema: Option<String>,

    /// Number of records committed per upsert transaction
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,
}

/// Payload cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Directory for cached payloads; the cache lives in memory when absent
    #[serde(default)]
    pub directory: Option<String>,

    /// Maximum age of a cached payload in seconds (no limit when absent)
    #[serde(rename = "max-age", default)]
    pub max_age: Option<f64>,

    /// Never serve cached payloads
    #[serde(rename = "no-cache", default)]
    pub no_cache: bool,

    /// Never write payloads to the cache
    #[serde(rename = "no-store", default)]
    pub no_store: bool,
}

impl CacheConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age.map(seconds)
    }
}

/// Retry-with-backoff configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in seconds
    #[serde(rename = "initial-delay", default = "default_initial_delay")]
    pub initial_delay: f64,

    /// Upper bound on any single backoff delay, in seconds
    #[serde(rename = "max-delay", default = "default_max_delay")]
    pub max_delay: f64,

    #[serde(rename = "exponential-base", default = "default_exponential_base")]
    pub exponential_base: f64,
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        seconds(self.initial_delay)
    }

    pub fn max_delay(&self) -> Duration {
        seconds(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            exponential_base: default_exponential_base(),
        }
    }
}

/// Request volume limits applied per data source
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(rename = "requests-per-minute", default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Minimum gap between two requests, in seconds
    #[serde(rename = "delay-between-requests", default = "default_delay_between_requests")]
    pub delay_between_requests: f64,
}

impl RateLimitConfig {
    pub fn delay_between_requests(&self) -> Duration {
        seconds(self.delay_between_requests)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            delay_between_requests: default_delay_between_requests(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(rename = "failure-threshold", default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Cooldown before a half-open trial call is allowed, in seconds
    #[serde(rename = "recovery-timeout", default = "default_recovery_timeout")]
    pub recovery_timeout: f64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        seconds(self.recovery_timeout)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout: default_recovery_timeout(),
        }
    }
}

/// How an egress identity is picked for each attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EgressStrategy {
    #[default]
    Random,
    RoundRobin,
}

/// Outbound identity pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// User-Agent header values to rotate through
    #[serde(rename = "user-agents", default)]
    pub user_agents: Vec<String>,

    /// Proxy URLs to rotate through (direct connection when empty)
    #[serde(default)]
    pub proxies: Vec<String>,

    #[serde(default)]
    pub strategy: EgressStrategy,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

impl EgressConfig {
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout)
    }
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            user_agents: Vec::new(),
            proxies: Vec::new(),
            strategy: EgressStrategy::default(),
            timeout: default_timeout(),
        }
    }
}

/// A competition the loader knows about
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,

    /// Month (1-12) in which the league's season ends
    #[serde(rename = "season-end", default)]
    pub season_end: Option<u32>,

    /// Season code format: "multi-year" (e.g. 2122) or "single-year" (e.g. 2021)
    #[serde(rename = "season-code", default)]
    pub season_code: crate::season::SeasonCode,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A data source and the tables it feeds
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower values are extracted first
    #[serde(default = "default_priority")]
    pub priority: u32,

    #[serde(rename = "table", default)]
    pub tables: Vec<SourceTableConfig>,
}

/// One target table of a data source
#[derive(Debug, Clone, Deserialize)]
pub struct SourceTableConfig {
    /// Target table name in the database
    pub name: String,

    /// URL template; `{league}` and `{season}` are substituted per task
    pub url: String,

    #[serde(rename = "conflict-columns")]
    pub conflict_columns: Vec<String>,

    #[serde(rename = "required-fields", default)]
    pub required_fields: Vec<String>,

    /// JSON pointer to the record array inside the payload (root when absent)
    #[serde(rename = "records-path", default)]
    pub records_path: Option<String>,

    /// Add `league` and `season` columns to every record
    #[serde(rename = "add-context-columns", default)]
    pub add_context_columns: bool,
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn default_batch_size() -> usize {
    500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> f64 {
    2.0
}

fn default_max_delay() -> f64 {
    60.0
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_requests_per_minute() -> u32 {
    20
}

fn default_delay_between_requests() -> f64 {
    3.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> f64 {
    60.0
}

fn default_timeout() -> f64 {
    30.0
}

fn default_priority() -> u32 {
    999
}

fn default_true() -> bool {
    true
}
