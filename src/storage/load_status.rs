//! Load status state machine
//!
//! Each (data source, table, league, season) unit of work has at most one row
//! in `data_load_status`. A missing row means `pending`; the orchestrator then
//! moves the row through `in_progress` to `completed` or `failed`. A later
//! forced run may move a completed row back to `in_progress`.
//!
//! Every transition is a single `INSERT ... ON CONFLICT DO UPDATE`, so writers
//! touching different keys never conflict.

use crate::storage::{Database, StorageError, StorageResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use std::fmt;

/// Status of one extraction task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl LoadStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Identifies one unit of work in the status table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub data_source: String,
    pub table_name: String,
    pub league: String,
    pub season: String,
}

impl TaskKey {
    pub fn new(
        data_source: impl Into<String>,
        table_name: impl Into<String>,
        league: impl Into<String>,
        season: impl Into<String>,
    ) -> Self {
        Self {
            data_source: data_source.into(),
            table_name: table_name.into(),
            league: league.into(),
            season: season.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} [{} {}]",
            self.data_source, self.table_name, self.league, self.season
        )
    }
}

/// One row of `data_load_status`
#[derive(Debug, Clone, PartialEq)]
pub struct LoadStatusRecord {
    pub key: TaskKey,
    pub status: LoadStatus,
    pub rows_processed: u64,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

/// Durable per-task progress tracking
pub trait LoadStatusStore: Send + Sync {
    fn get_status(&self, key: &TaskKey) -> StorageResult<Option<LoadStatusRecord>>;

    /// Rows ordered by most recently updated first, optionally filtered
    fn list_statuses(
        &self,
        data_source: Option<&str>,
        table_name: Option<&str>,
    ) -> StorageResult<Vec<LoadStatusRecord>>;

    /// Records the start of an execution, overwriting any terminal status
    fn mark_in_progress(&self, key: &TaskKey) -> StorageResult<()>;

    fn mark_completed(&self, key: &TaskKey, rows_processed: u64) -> StorageResult<()>;

    /// Records a failure; `completed_at` is cleared
    fn mark_failed(&self, key: &TaskKey, error: &str) -> StorageResult<()>;

    /// True iff the task already completed and re-extraction was not forced
    fn should_skip(&self, key: &TaskKey, force_reextract: bool) -> StorageResult<bool> {
        if force_reextract {
            return Ok(false);
        }
        Ok(matches!(
            self.get_status(key)?,
            Some(LoadStatusRecord {
                status: LoadStatus::Completed,
                ..
            })
        ))
    }
}

/// [`LoadStatusStore`] backed by the `data_load_status` table
#[derive(Debug, Clone)]
pub struct SqliteStatusStore {
    db: Database,
}

const UPSERT_STATUS_SQL: &str = "
    INSERT INTO data_load_status
        (data_source, table_name, league, season, status, rows_processed,
         error_message, started_at, completed_at, last_updated)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(data_source, table_name, league, season) DO UPDATE SET
        status = excluded.status,
        rows_processed = excluded.rows_processed,
        error_message = excluded.error_message,
        started_at = COALESCE(excluded.started_at, data_load_status.started_at),
        completed_at = excluded.completed_at,
        last_updated = excluded.last_updated";

const SELECT_COLUMNS: &str = "
    SELECT data_source, table_name, league, season, status, rows_processed,
           error_message, started_at, completed_at, last_updated
    FROM data_load_status";

impl SqliteStatusStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn upsert(
        &self,
        key: &TaskKey,
        status: LoadStatus,
        rows_processed: u64,
        error_message: Option<&str>,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let now = Utc::now();
        let rows = i64::try_from(rows_processed).unwrap_or(i64::MAX);

        self.db.with_connection(|conn| {
            conn.execute(
                UPSERT_STATUS_SQL,
                params![
                    key.data_source,
                    key.table_name,
                    key.league,
                    key.season,
                    status.to_db_string(),
                    rows,
                    error_message,
                    started_at.map(format_timestamp),
                    completed_at.map(format_timestamp),
                    format_timestamp(now),
                ],
            )?;
            Ok(())
        })
    }
}

impl LoadStatusStore for SqliteStatusStore {
    fn get_status(&self, key: &TaskKey) -> StorageResult<Option<LoadStatusRecord>> {
        self.db.with_connection(|conn| {
            let sql = format!(
                "{} WHERE data_source = ?1 AND table_name = ?2 AND league = ?3 AND season = ?4",
                SELECT_COLUMNS
            );
            let record = conn
                .query_row(
                    &sql,
                    params![key.data_source, key.table_name, key.league, key.season],
                    row_to_record,
                )
                .optional()?;
            Ok(record)
        })
    }

    fn list_statuses(
        &self,
        data_source: Option<&str>,
        table_name: Option<&str>,
    ) -> StorageResult<Vec<LoadStatusRecord>> {
        self.db.with_connection(|conn| {
            let sql = format!(
                "{} WHERE (?1 IS NULL OR data_source = ?1) AND (?2 IS NULL OR table_name = ?2)
                 ORDER BY last_updated DESC, data_source, table_name, league, season",
                SELECT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![data_source, table_name], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    fn mark_in_progress(&self, key: &TaskKey) -> StorageResult<()> {
        self.upsert(key, LoadStatus::InProgress, 0, None, Some(Utc::now()), None)
    }

    fn mark_completed(&self, key: &TaskKey, rows_processed: u64) -> StorageResult<()> {
        self.upsert(
            key,
            LoadStatus::Completed,
            rows_processed,
            None,
            None,
            Some(Utc::now()),
        )
    }

    fn mark_failed(&self, key: &TaskKey, error: &str) -> StorageResult<()> {
        self.upsert(key, LoadStatus::Failed, 0, Some(error), None, None)
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<LoadStatusRecord> {
    let status: String = row.get(4)?;
    let status = LoadStatus::from_db_string(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            Box::new(StorageError::InvalidStatus(status.clone())),
        )
    })?;

    let rows_processed: i64 = row.get(5)?;
    let started_at: Option<String> = row.get(7)?;
    let completed_at: Option<String> = row.get(8)?;
    let last_updated: String = row.get(9)?;

    Ok(LoadStatusRecord {
        key: TaskKey {
            data_source: row.get(0)?,
            table_name: row.get(1)?,
            league: row.get(2)?,
            season: row.get(3)?,
        },
        status,
        rows_processed: u64::try_from(rows_processed).unwrap_or(0),
        error_message: row.get(6)?,
        started_at: started_at.map(|s| parse_timestamp(7, &s)).transpose()?,
        completed_at: completed_at.map(|s| parse_timestamp(8, &s)).transpose()?,
        last_updated: parse_timestamp(9, &last_updated)?,
    })
}
