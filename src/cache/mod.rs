//! Payload cache with TTL semantics
//!
//! [`CacheStore`] decides whether a previously fetched payload may be reused.
//! It is a pure TTL mechanism: callers that must never see stale data for an
//! unfinished season pass `force_refresh` themselves.
//!
//! Entries live in a [`CacheBackend`]; [`MemoryCache`] keeps them in a map and
//! [`FileCache`] keeps one file per key on disk.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use crate::config::CacheConfig;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised by cache backends
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Identifies a cacheable fetch
///
/// Two fetches with the same key are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Builds a key from a URL, ignoring the fragment and the order of query parameters
    pub fn from_url(url: &Url) -> Self {
        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        pairs.sort();

        let mut normalized = url.clone();
        normalized.set_fragment(None);
        if pairs.is_empty() {
            normalized.set_query(None);
        } else {
            normalized.query_pairs_mut().clear().extend_pairs(pairs.iter());
        }

        Self(normalized.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 hex digest of the key, used as the on-disk file name
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: ResourceKey,
    pub payload: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry at `now`; entries stamped in the future have age zero
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Storage for cache entries
///
/// `save` must replace any previous entry for the key atomically.
pub trait CacheBackend: Send + Sync {
    fn load(&self, key: &ResourceKey) -> Result<Option<CacheEntry>, CacheError>;

    fn save(&self, entry: &CacheEntry) -> Result<(), CacheError>;
}

impl<T: CacheBackend + ?Sized> CacheBackend for std::sync::Arc<T> {
    fn load(&self, key: &ResourceKey) -> Result<Option<CacheEntry>, CacheError> {
        (**self).load(key)
    }

    fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        (**self).save(entry)
    }
}

/// Why a lookup did not produce a usable entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Absent,
    Expired,
    Forced,
    Disabled,
}

/// Outcome of [`CacheStore::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Hit(CacheEntry),
    Miss(MissReason),
}

impl Resolution {
    pub fn use_cache(&self) -> bool {
        matches!(self, Resolution::Hit(_))
    }

    pub fn into_entry(self) -> Option<CacheEntry> {
        match self {
            Resolution::Hit(entry) => Some(entry),
            Resolution::Miss(_) => None,
        }
    }
}

/// TTL-aware cache in front of a [`CacheBackend`]
pub struct CacheStore {
    backend: Box<dyn CacheBackend>,
    /// Never serve cached entries
    no_cache: bool,
    /// Never write entries; lookups always miss
    no_store: bool,
}

impl CacheStore {
    pub fn new(backend: Box<dyn CacheBackend>, no_cache: bool, no_store: bool) -> Self {
        Self {
            backend,
            no_cache,
            no_store,
        }
    }

    /// An in-memory cache with caching fully enabled
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryCache::new()), false, false)
    }

    /// Builds the store described by the `[cache]` section
    pub fn from_config(config: &CacheConfig) -> Self {
        let backend: Box<dyn CacheBackend> = match &config.directory {
            Some(dir) => Box::new(FileCache::new(PathBuf::from(dir))),
            None => Box::new(MemoryCache::new()),
        };
        Self::new(backend, config.no_cache, config.no_store)
    }

    /// Looks up `key`, reusing the entry only if it is no older than `max_age`
    pub fn resolve(
        &self,
        key: &ResourceKey,
        max_age: Option<Duration>,
        force_refresh: bool,
    ) -> Result<Resolution, CacheError> {
        self.resolve_at(key, max_age, force_refresh, Utc::now())
    }

    /// [`resolve`](Self::resolve) evaluated at a fixed instant
    pub fn resolve_at(
        &self,
        key: &ResourceKey,
        max_age: Option<Duration>,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<Resolution, CacheError> {
        if self.no_cache || self.no_store {
            return Ok(Resolution::Miss(MissReason::Disabled));
        }
        if force_refresh {
            return Ok(Resolution::Miss(MissReason::Forced));
        }

        let Some(entry) = self.backend.load(key)? else {
            return Ok(Resolution::Miss(MissReason::Absent));
        };

        match max_age {
            Some(max_age) if entry.age_at(now) > max_age => {
                Ok(Resolution::Miss(MissReason::Expired))
            }
            _ => Ok(Resolution::Hit(entry)),
        }
    }

    /// Persists a freshly fetched payload, replacing any previous entry
    pub fn store(&self, key: &ResourceKey, payload: &[u8]) -> Result<(), CacheError> {
        if self.no_store {
            return Ok(());
        }

        let entry = CacheEntry {
            key: key.clone(),
            payload: payload.to_vec(),
            stored_at: Utc::now(),
        };
        self.backend.save(&entry)
    }
}
