//! Stat-Harvest main entry point
//!
//! This is the command-line interface for the Stat-Harvest loader.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use stat_harvest::cache::CacheStore;
use stat_harvest::config::{load_config_with_hash, Config};
use stat_harvest::output::{print_load_statuses, print_plan, print_run_summary};
use stat_harvest::season::{season_range, CURRENT_SEASON};
use stat_harvest::storage::{Database, LoadStatusStore, SqliteStatusStore, UpsertWriter};
use stat_harvest::{AdapterRegistry, Orchestrator, RunRequest};
use tracing_subscriber::EnvFilter;

/// Stat-Harvest: a resumable multi-source statistics loader
///
/// Extracts every configured table for the selected leagues and seasons and
/// upserts the records into SQLite. Completed work is remembered, so an
/// interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "stat-harvest")]
#[command(version)]
#[command(about = "A resumable multi-source statistics loader", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Seasons to extract, e.g. 2223,2023-24
    #[arg(
        short,
        long,
        value_delimiter = ',',
        required_unless_present_any = ["status", "current_season", "from_year"],
        conflicts_with_all = ["current_season", "from_year"]
    )]
    seasons: Vec<String>,

    /// Refresh the season running today, re-extracting completed tasks
    #[arg(long, conflicts_with = "from_year")]
    current_season: bool,

    /// First season of a historical load, by starting year (e.g. 2015 for 2015-16)
    #[arg(long, requires = "to_year", value_name = "YEAR")]
    from_year: Option<i32>,

    /// Last season of a historical load, by starting year
    #[arg(long, requires = "from_year", value_name = "YEAR")]
    to_year: Option<i32>,

    /// Only run these data sources (default: all enabled, by priority)
    #[arg(long, value_delimiter = ',')]
    sources: Option<Vec<String>>,

    /// Only run these leagues (default: all enabled)
    #[arg(short, long, value_delimiter = ',')]
    leagues: Option<Vec<String>>,

    /// Re-extract tasks that already completed
    #[arg(long)]
    no_skip_completed: bool,

    /// Show the tasks that would run without extracting anything
    #[arg(long, conflicts_with = "status")]
    dry_run: bool,

    /// Show the load status table and exit
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("stat_harvest=info,warn"),
            1 => EnvFilter::new("stat_harvest=debug,info"),
            2 => EnvFilter::new("stat_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let db = open_database(&config, &cli.config)?;
    let status = Arc::new(SqliteStatusStore::new(db.clone()));

    if cli.status {
        let mut records = status
            .list_statuses(None, None)
            .context("Failed to read load status")?;
        if let Some(sources) = &cli.sources {
            records.retain(|r| sources.contains(&r.key.data_source));
        }
        print_load_statuses(&records);
        return Ok(ExitCode::SUCCESS);
    }

    let request = RunRequest {
        data_sources: cli.sources,
        leagues: cli.leagues,
        seasons: select_seasons(cli.seasons, cli.current_season, cli.from_year, cli.to_year)?,
        // The running season changes daily, so completed work is redone
        skip_completed: !cli.no_skip_completed && !cli.current_season,
    };

    let registry = AdapterRegistry::from_config(&config);
    let writer = Arc::new(UpsertWriter::new(db, config.database.batch_size));
    let cache = Arc::new(CacheStore::from_config(&config.cache));
    let orchestrator = Orchestrator::new(Arc::new(config), registry, status, writer, cache);

    if cli.dry_run {
        let tasks = orchestrator.plan(&request)?;
        print_plan(&tasks);
        return Ok(ExitCode::SUCCESS);
    }

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, stopping after the current task (Ctrl-C again to abort)");
        stop.cancel();

        // Second interrupt: abort, leaving the current task in_progress
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Aborting");
            std::process::exit(130);
        }
    });

    let summary = orchestrator.run(&request).await?;
    print_run_summary(&summary);

    Ok(ExitCode::from(summary.exit_code()))
}

/// Picks the run's seasons from an explicit list, the current season, or a year range
fn select_seasons(
    seasons: Vec<String>,
    current_season: bool,
    from_year: Option<i32>,
    to_year: Option<i32>,
) -> anyhow::Result<Vec<String>> {
    if current_season {
        return Ok(vec![CURRENT_SEASON.to_string()]);
    }
    match (from_year, to_year) {
        (Some(from), Some(to)) => {
            let seasons = season_range(from, to)?;
            tracing::info!("Historical load of {} seasons ({} to {})", seasons.len(), from, to);
            Ok(seasons)
        }
        _ => Ok(seasons),
    }
}

/// Opens the database and applies the target table schema script, if any
fn open_database(config: &Config, config_path: &Path) -> anyhow::Result<Database> {
    let db = if config.database.path == ":memory:" {
        Database::open_in_memory()?
    } else {
        Database::open(Path::new(&config.database.path))
            .with_context(|| format!("Failed to open database {}", config.database.path))?
    };

    if let Some(schema) = &config.database.schema {
        // Relative schema paths are resolved against the config file
        let path = match config_path.parent() {
            Some(dir) if Path::new(schema).is_relative() => dir.join(schema),
            _ => PathBuf::from(schema),
        };
        let sql = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read schema {}", path.display()))?;
        db.execute_script(&sql)
            .with_context(|| format!("Failed to apply schema {}", path.display()))?;
        tracing::info!("Applied schema from {}", path.display());
    }

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(["stat-harvest", "harvest.toml"].iter().chain(args))
    }

    fn seasons_of(cli: Cli) -> Vec<String> {
        select_seasons(cli.seasons, cli.current_season, cli.from_year, cli.to_year).unwrap()
    }

    #[test]
    fn test_explicit_seasons() {
        let cli = parse(&["--seasons", "2122,2023-24"]).unwrap();
        assert_eq!(seasons_of(cli), vec!["2122", "2023-24"]);
    }

    #[test]
    fn test_current_season_mode() {
        let cli = parse(&["--current-season"]).unwrap();
        assert!(cli.current_season);
        assert_eq!(seasons_of(cli), vec![CURRENT_SEASON]);
    }

    #[test]
    fn test_historical_range_mode() {
        let cli = parse(&["--from-year", "2019", "--to-year", "2021"]).unwrap();
        assert_eq!(seasons_of(cli), vec!["2019-2020", "2020-2021", "2021-2022"]);
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let cli = parse(&["--from-year", "2021", "--to-year", "2019"]).unwrap();
        assert!(select_seasons(cli.seasons, false, cli.from_year, cli.to_year).is_err());
    }

    #[test]
    fn test_season_modes_are_exclusive() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--from-year", "2019"]).is_err());
        assert!(parse(&["--seasons", "2122", "--current-season"]).is_err());
        assert!(parse(&["--current-season", "--from-year", "2019", "--to-year", "2020"]).is_err());
        assert!(parse(&["--status"]).is_ok());
    }
}
