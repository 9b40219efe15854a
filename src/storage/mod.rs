//! Storage module for load tracking and record persistence
//!
//! This module handles all database operations of the loader, including:
//! - SQLite database initialization and schema management
//! - The per-task load status state machine
//! - Chunked, idempotent upserts of normalized records

mod database;
mod load_status;
mod schema;
mod upsert;

pub use database::Database;
pub use load_status::{
    LoadStatus, LoadStatusRecord, LoadStatusStore, SqliteStatusStore, TaskKey,
};
pub use schema::{initialize_schema, SCHEMA_SQL};
pub use upsert::{RecordWriter, UpsertWriter};

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Invalid load status in database: {0}")]
    InvalidStatus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised while upserting records into a target table
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Records have no columns")]
    EmptyColumns,

    #[error("Record {index} has columns [{found}], expected [{expected}]")]
    ColumnMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("No conflict columns given for table '{0}'")]
    NoConflictColumns(String),

    #[error("Conflict column '{0}' is not present in the records")]
    ConflictColumnMissing(String),

    #[error("Table '{0}' does not exist")]
    UnknownTable(String),

    #[error("Column '{column}' does not exist in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Chunk {chunk} of table '{table}' failed")]
    Chunk {
        table: String,
        chunk: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for WriteError {
    fn from(e: rusqlite::Error) -> Self {
        WriteError::Storage(StorageError::Sqlite(e))
    }
}
