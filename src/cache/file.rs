//! On-disk cache backend
//!
//! Each entry is one file named after the SHA-256 digest of its key. The
//! file's modification time records when the payload was stored, so a cache
//! directory survives restarts without any index.

use crate::cache::{CacheBackend, CacheEntry, CacheError, ResourceKey};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::SystemTime;
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, key: &ResourceKey) -> PathBuf {
        self.directory.join(key.digest())
    }
}

impl CacheBackend for FileCache {
    fn load(&self, key: &ResourceKey) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);

        let payload = match fs::read(&path) {
            Ok(payload) => payload,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified = fs::metadata(&path)?.modified()?;

        Ok(Some(CacheEntry {
            key: key.clone(),
            payload,
            stored_at: DateTime::<Utc>::from(modified),
        }))
    }

    fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(&self.directory)?;

        // Written beside the target and renamed over it, so readers never see
        // a partially written payload
        let mut file = NamedTempFile::new_in(&self.directory)?;
        file.write_all(&entry.payload)?;
        file.as_file().sync_all()?;
        file.as_file()
            .set_modified(SystemTime::from(entry.stored_at))?;

        file.persist(self.path_for(&entry.key))
            .map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        assert!(cache.load(&ResourceKey::new("absent")).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_preserves_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nested"));
        let stored_at = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let entry = CacheEntry {
            key: ResourceKey::new("https://x.example/a"),
            payload: b"[1,2,3]".to_vec(),
            stored_at,
        };

        cache.save(&entry).unwrap();
        let loaded = cache.load(&entry.key).unwrap().unwrap();

        assert_eq!(loaded.payload, entry.payload);
        assert_eq!(loaded.stored_at, stored_at);
    }

    #[test]
    fn test_save_replaces_previous_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = ResourceKey::new("k");

        for payload in [&b"first"[..], &b"second"[..]] {
            cache
                .save(&CacheEntry {
                    key: key.clone(),
                    payload: payload.to_vec(),
                    stored_at: Utc::now(),
                })
                .unwrap();
        }

        assert_eq!(cache.load(&key).unwrap().unwrap().payload, b"second".to_vec());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
