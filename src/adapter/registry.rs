use crate::adapter::{json_api_adapter, AdapterError, SourceAdapter};
use crate::config::Config;
use crate::fetch::FetchController;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a factory receives when the orchestrator starts a data source
pub struct SourceContext<'a> {
    pub name: &'a str,
    pub config: &'a Config,
    /// Shared by every task of the source
    pub fetcher: Arc<FetchController>,
}

/// Builds an adapter for one run
pub type AdapterFactory = Box<
    dyn Fn(&SourceContext<'_>) -> Result<Arc<dyn SourceAdapter>, AdapterError> + Send + Sync,
>;

/// Maps data source names to adapter factories
#[derive(Default)]
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a JSON API adapter for every source declared in the configuration
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for source in &config.sources {
            let source = source.clone();
            registry.register(source.name.clone(), move |ctx: &SourceContext<'_>| {
                let adapter = json_api_adapter(&source, ctx.fetcher.clone())?;
                Ok(Arc::new(adapter) as Arc<dyn SourceAdapter>)
            });
        }
        registry
    }

    /// Registers (or replaces) the factory for `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&SourceContext<'_>) -> Result<Arc<dyn SourceAdapter>, AdapterError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds the adapter for `ctx.name`
    pub fn build(&self, ctx: &SourceContext<'_>) -> Result<Arc<dyn SourceAdapter>, AdapterError> {
        let factory = self
            .factories
            .get(ctx.name)
            .ok_or_else(|| AdapterError::Construction {
                source_name: ctx.name.to_string(),
                message: "no adapter registered".to_string(),
            })?;
        factory(ctx)
    }
}
