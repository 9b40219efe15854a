use crate::adapter::{AdapterError, ExtractRequest, SourceAdapter, TableConfig};
use crate::record::NormalizedRecord;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;

type ExtractFn = Box<
    dyn Fn(ExtractRequest) -> BoxFuture<'static, Result<Vec<NormalizedRecord>, AdapterError>>
        + Send
        + Sync,
>;

/// An adapter assembled from one extraction function per table
///
/// ```
/// use stat_harvest::adapter::{TableAdapter, TableConfig};
/// use stat_harvest::record::{NormalizedRecord, Value};
///
/// let adapter = TableAdapter::new("static").table(
///     TableConfig::new("teams", &["team"], &["team"]),
///     |request| async move {
///         let mut record = NormalizedRecord::new();
///         record.insert("team".into(), Value::from(request.league));
///         Ok(vec![record])
///     },
/// );
/// ```
pub struct TableAdapter {
    name: String,
    tables: Vec<(TableConfig, ExtractFn)>,
}

impl TableAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    /// Registers the extraction function for a table
    pub fn table<F, Fut>(mut self, config: TableConfig, extract: F) -> Self
    where
        F: Fn(ExtractRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<NormalizedRecord>, AdapterError>> + Send + 'static,
    {
        self.tables
            .push((config, Box::new(move |request| extract(request).boxed())));
        self
    }
}

#[async_trait]
impl SourceAdapter for TableAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_tables(&self) -> Vec<TableConfig> {
        self.tables.iter().map(|(config, _)| config.clone()).collect()
    }

    async fn extract(
        &self,
        table: &TableConfig,
        request: &ExtractRequest,
    ) -> Result<Vec<NormalizedRecord>, AdapterError> {
        let (_, extract) = self
            .tables
            .iter()
            .find(|(config, _)| config.table_name == table.table_name)
            .ok_or_else(|| AdapterError::UnknownTable {
                source_name: self.name.clone(),
                table: table.table_name.clone(),
            })?;

        extract(request.clone()).await
    }
}
