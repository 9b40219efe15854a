use crate::cache::{CacheBackend, CacheEntry, CacheError, ResourceKey};
use std::collections::HashMap;
use std::sync::RwLock;

/// Process-local cache backend
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<ResourceKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryCache {
    fn load(&self, key: &ResourceKey) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }
}
