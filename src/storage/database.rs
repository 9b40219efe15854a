//! Shared SQLite handle

use crate::storage::schema::initialize_schema;
use crate::storage::StorageError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A cloneable handle to one SQLite connection
///
/// The load status store and the upsert writer share a handle, so all writes
/// of a run go through a single connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database file and initializes the status table
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs a batch of SQL statements, e.g. the target table schema script
    pub fn execute_script(&self, sql: &str) -> Result<(), StorageError> {
        self.with_connection(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Runs `f` while holding the connection lock
    pub fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| E::from(StorageError::LockPoisoned))?;
        f(&mut conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
