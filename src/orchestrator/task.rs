use crate::adapter::TableConfig;
use crate::storage::TaskKey;
use std::fmt;
use std::time::Duration;

/// One (data source, table, league, season) unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionTask {
    pub data_source: String,
    pub table: TableConfig,
    pub league: String,
    pub season: String,
}

impl ExtractionTask {
    pub fn key(&self) -> TaskKey {
        TaskKey::new(
            self.data_source.clone(),
            self.table.table_name.clone(),
            self.league.clone(),
            self.season.clone(),
        )
    }
}

impl fmt::Display for ExtractionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} [{} {}]",
            self.data_source, self.table.table_name, self.league, self.season
        )
    }
}

/// Leagues selected for a run, each with its normalised seasons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeagueSelection {
    pub league: String,
    pub seasons: Vec<String>,
    /// Month the league's season ends, if configured
    pub season_end: Option<u32>,
}

/// Expands tables × leagues × seasons for one data source
///
/// Tasks are grouped by table, then league, then season.
pub fn enumerate_tasks(
    data_source: &str,
    tables: &[TableConfig],
    selection: &[LeagueSelection],
) -> Vec<ExtractionTask> {
    tables
        .iter()
        .flat_map(|table| {
            selection.iter().flat_map(move |league| {
                league.seasons.iter().map(move |season| ExtractionTask {
                    data_source: data_source.to_string(),
                    table: table.clone(),
                    league: league.league.clone(),
                    season: season.clone(),
                })
            })
        })
        .collect()
}

/// Final state of a task within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Failed,
    Skipped,
}

/// What happened to one task
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub key: TaskKey,
    pub status: TaskStatus,
    /// Valid records written
    pub rows: u64,
    /// Records dropped by required-field validation
    pub invalid_records: usize,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl TaskOutcome {
    pub fn skipped(key: TaskKey) -> Self {
        Self {
            key,
            status: TaskStatus::Skipped,
            rows: 0,
            invalid_records: 0,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn failed(key: TaskKey, error: String, elapsed: Duration) -> Self {
        Self {
            key,
            status: TaskStatus::Failed,
            rows: 0,
            invalid_records: 0,
            error: Some(error),
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_is_cartesian_product() {
        let tables = vec![
            TableConfig::new("schedule", &["game"], &["game"]),
            TableConfig::new("lineups", &["game", "player"], &["game", "player"]),
        ];
        let selection = vec![
            LeagueSelection {
                league: "ENG".to_string(),
                seasons: vec!["2122".to_string(), "2223".to_string()],
                season_end: Some(5),
            },
            LeagueSelection {
                league: "ESP".to_string(),
                seasons: vec!["2223".to_string()],
                season_end: None,
            },
        ];

        let tasks = enumerate_tasks("fbref", &tables, &selection);

        assert_eq!(tasks.len(), 6);
        assert_eq!(tasks[0].to_string(), "fbref/schedule [ENG 2122]");
        assert_eq!(tasks[2].to_string(), "fbref/schedule [ESP 2223]");
        assert_eq!(tasks[3].key(), TaskKey::new("fbref", "lineups", "ENG", "2122"));
    }

    #[test]
    fn test_enumerate_without_tables_is_empty() {
        assert!(enumerate_tasks("fbref", &[], &[]).is_empty());
    }
}
