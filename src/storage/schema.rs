//! Database schema definitions
//!
//! Only the load status table is owned by the loader. Target tables are
//! created by the optional schema script named in the configuration.

/// SQL schema for the load status table
pub const SCHEMA_SQL: &str = r#"
-- One row per (data source, table, league, season) unit of work
CREATE TABLE IF NOT EXISTS data_load_status (
    data_source TEXT NOT NULL,
    table_name TEXT NOT NULL,
    league TEXT NOT NULL,
    season TEXT NOT NULL,
    status TEXT NOT NULL,
    rows_processed INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    started_at TEXT,
    completed_at TEXT,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (data_source, table_name, league, season)
);

CREATE INDEX IF NOT EXISTS idx_load_status_updated ON data_load_status(last_updated);
CREATE INDEX IF NOT EXISTS idx_load_status_status ON data_load_status(status);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
