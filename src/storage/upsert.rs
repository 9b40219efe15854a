//! Idempotent bulk writes
//!
//! Records are written with `INSERT ... ON CONFLICT (conflict columns) DO
//! UPDATE`, so replaying a write never duplicates rows. Large batches are split
//! into chunks, each committed in its own transaction; a failing chunk is
//! rolled back while earlier chunks stay committed.

use crate::record::{NormalizedRecord, Value};
use crate::storage::{Database, WriteError};
use rusqlite::{params_from_iter, Connection};
use std::collections::HashSet;
use tracing::debug;

/// Column never overwritten on conflict
const CREATED_AT: &str = "created_at";

/// Column stamped with the current time on conflict when records omit it
const UPDATED_AT: &str = "updated_at";

static NULL: Value = Value::Null;

/// Writes normalized records into a target table
pub trait RecordWriter: Send + Sync {
    /// Upserts `records`, returning the number of rows inserted or updated
    ///
    /// All records must share one column set that includes every conflict column.
    fn write(
        &self,
        table: &str,
        records: &[NormalizedRecord],
        conflict_columns: &[String],
    ) -> Result<u64, WriteError>;
}

/// SQLite [`RecordWriter`]
#[derive(Debug, Clone)]
pub struct UpsertWriter {
    db: Database,
    batch_size: usize,
}

impl UpsertWriter {
    pub fn new(db: Database, batch_size: usize) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
        }
    }
}

impl RecordWriter for UpsertWriter {
    fn write(
        &self,
        table: &str,
        records: &[NormalizedRecord],
        conflict_columns: &[String],
    ) -> Result<u64, WriteError> {
        let Some(first) = records.first() else {
            return Ok(0);
        };

        check_identifier(table)?;
        if conflict_columns.is_empty() {
            return Err(WriteError::NoConflictColumns(table.to_string()));
        }

        let columns: Vec<&str> = first.keys().map(String::as_str).collect();
        if columns.is_empty() {
            return Err(WriteError::EmptyColumns);
        }
        for column in &columns {
            check_identifier(column)?;
        }

        for (index, record) in records.iter().enumerate().skip(1) {
            if !record.keys().map(String::as_str).eq(columns.iter().copied()) {
                return Err(WriteError::ColumnMismatch {
                    index,
                    expected: columns.join(", "),
                    found: record.keys().cloned().collect::<Vec<_>>().join(", "),
                });
            }
        }

        for column in conflict_columns {
            if !columns.contains(&column.as_str()) {
                return Err(WriteError::ConflictColumnMissing(column.clone()));
            }
        }

        self.db.with_connection(|conn| {
            let table_columns = table_columns(conn, table)?;
            if table_columns.is_empty() {
                return Err(WriteError::UnknownTable(table.to_string()));
            }
            if let Some(column) = columns.iter().find(|c| !table_columns.contains(**c)) {
                return Err(WriteError::UnknownColumn {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }

            let stamp_updated_at =
                table_columns.contains(UPDATED_AT) && !columns.contains(&UPDATED_AT);
            let sql = build_upsert_sql(table, &columns, conflict_columns, stamp_updated_at);

            let mut affected = 0u64;
            for (chunk, batch) in records.chunks(self.batch_size).enumerate() {
                let written = write_chunk(conn, &sql, &columns, batch).map_err(|source| {
                    WriteError::Chunk {
                        table: table.to_string(),
                        chunk,
                        source,
                    }
                })?;
                debug!(
                    "Upserted chunk {} ({} records) into {}",
                    chunk,
                    batch.len(),
                    table
                );
                affected += written;
            }

            Ok(affected)
        })
    }
}

/// Writes one chunk inside its own transaction
fn write_chunk(
    conn: &mut Connection,
    sql: &str,
    columns: &[&str],
    batch: &[NormalizedRecord],
) -> rusqlite::Result<u64> {
    let tx = conn.transaction()?;
    let mut affected = 0u64;
    {
        let mut stmt = tx.prepare_cached(sql)?;
        for record in batch {
            let values = columns.iter().map(|c| record.get(*c).unwrap_or(&NULL));
            affected += stmt.execute(params_from_iter(values))? as u64;
        }
    }
    tx.commit()?;
    Ok(affected)
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(columns)
}

fn build_upsert_sql(
    table: &str,
    columns: &[&str],
    conflict_columns: &[String],
    stamp_updated_at: bool,
) -> String {
    let column_list = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let conflict_list = conflict_columns
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut assignments: Vec<String> = columns
        .iter()
        .filter(|c| !conflict_columns.iter().any(|k| k == *c) && **c != CREATED_AT)
        .map(|c| format!("{0} = excluded.{0}", quote(c)))
        .collect();
    if stamp_updated_at {
        assignments.push(format!("{} = CURRENT_TIMESTAMP", quote(UPDATED_AT)));
    }

    let action = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        quote(table),
        column_list,
        placeholders,
        conflict_list,
        action
    )
}

fn check_identifier(name: &str) -> Result<(), WriteError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(WriteError::InvalidIdentifier(name.to_string()))
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
