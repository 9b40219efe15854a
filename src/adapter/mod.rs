//! Source adapters
//!
//! A [`SourceAdapter`] turns one data provider's responses into
//! [`NormalizedRecord`]s. The orchestrator never looks inside payloads; it only
//! asks an adapter which tables it feeds and to extract one table for one
//! league and season.
//!
//! Adapters are built per run by an [`AdapterRegistry`], which hands each
//! factory the data source's [`FetchController`](crate::fetch::FetchController).

mod json_api;
mod registry;
mod table;

pub use json_api::{json_api_adapter, records_from_payload, render_url};
pub use registry::{AdapterFactory, AdapterRegistry, SourceContext};
pub use table::TableAdapter;

use crate::fetch::FetchError;
use crate::record::NormalizedRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Describes one target table fed by an adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_name: String,
    /// Columns identifying a row for upserts
    pub conflict_columns: Vec<String>,
    /// Fields every record must carry with a non-null value
    pub required_fields: Vec<String>,
}

impl TableConfig {
    pub fn new(
        table_name: impl Into<String>,
        conflict_columns: &[&str],
        required_fields: &[&str],
    ) -> Self {
        Self {
            table_name: table_name.into(),
            conflict_columns: conflict_columns.iter().map(|s| s.to_string()).collect(),
            required_fields: required_fields.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Parameters of one extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub league: String,
    pub season: String,
    /// Set when the season is still running; cached payloads must not be used
    pub force_refresh: bool,
}

/// Errors raised by adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The source has nothing for this league and season; not a failure
    #[error("No data available: {0}")]
    NoData(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to parse payload: {0}")]
    Parse(String),

    #[error("Failed to construct adapter '{source_name}': {message}")]
    Construction {
        source_name: String,
        message: String,
    },

    #[error("Adapter '{source_name}' has no table '{table}'")]
    UnknownTable { source_name: String, table: String },
}

/// A data provider able to extract records for its tables
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn list_tables(&self) -> Vec<TableConfig>;

    /// Extracts every record of `table` for the request's league and season
    ///
    /// Returns [`AdapterError::NoData`] when the source has nothing to offer,
    /// which the orchestrator records as zero rows rather than a failure.
    async fn extract(
        &self,
        table: &TableConfig,
        request: &ExtractRequest,
    ) -> Result<Vec<NormalizedRecord>, AdapterError>;
}
