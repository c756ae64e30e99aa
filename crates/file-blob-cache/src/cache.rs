//! Name-addressed blob storage backed by the disk cache

use crate::error::Result;
use crate::types::CacheStats;
use disk_lru_cache::{DiskCacheConfig, DiskLruCache};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, warn};

/// A blob cache that stores one byte array per logical name
pub struct BlobCache {
    disk: DiskLruCache,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl BlobCache {
    /// Wrap an open disk cache. Only value slot 0 is used.
    pub fn new(disk: DiskLruCache) -> Self {
        Self {
            disk,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Open a disk cache for `config` and wrap it
    pub fn open(config: DiskCacheConfig) -> Result<Self> {
        let disk = DiskLruCache::open(config.with_value_count(1))?;
        Ok(Self::new(disk))
    }

    /// Generate a cache key from a logical name
    pub fn cache_key(name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Path of the cached file for `name`, if present.
    ///
    /// The path is only guaranteed to exist until the entry is next evicted or
    /// replaced.
    pub fn path(&self, name: &str) -> Option<PathBuf> {
        let key = Self::cache_key(name);
        match self.disk.get(&key) {
            Ok(Some(snapshot)) => Some(snapshot.file(0).to_path_buf()),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    /// Store `data` under `name`. Returns the committed file's path, or `None`
    /// when the entry is busy and the write was skipped.
    pub async fn save(&self, name: &str, data: &[u8]) -> Result<Option<PathBuf>> {
        let key = Self::cache_key(name);
        let Some(mut editor) = self.disk.edit(&key)? else {
            debug!(key = %key, "Entry busy, skipping cache write");
            return Ok(None);
        };

        let path = editor.file(0)?;
        if let Err(e) = fs::write(&path, data).await {
            editor.abort();
            return Err(e.into());
        }

        let snapshot = editor.commit_and_open_snapshot()?;
        debug!(key = %key, size = data.len(), "Cached blob");
        Ok(snapshot.map(|s| s.file(0).to_path_buf()))
    }

    /// Read the bytes stored under `name`
    pub async fn load(&self, name: &str) -> Option<Vec<u8>> {
        let key = Self::cache_key(name);
        let snapshot = match self.disk.get(&key) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed");
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        // The snapshot keeps the file alive while it is read.
        match fs::read(snapshot.file(0)).await {
            Ok(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache hit");
                Some(data)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cached file, removing entry");
                drop(snapshot);
                let _ = self.disk.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Remove the blob stored under `name`
    pub fn remove(&self, name: &str) -> Result<bool> {
        Ok(self.disk.remove(&Self::cache_key(name))?)
    }

    /// Remove every blob
    pub fn clear(&self) -> Result<()> {
        Ok(self.disk.evict_all()?)
    }

    pub fn flush(&self) -> Result<()> {
        Ok(self.disk.flush()?)
    }

    pub fn close(&self) -> Result<()> {
        Ok(self.disk.close()?)
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.disk.entry_count(),
            total_size: self.disk.size(),
            max_size: self.disk.max_size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn disk(&self) -> &DiskLruCache {
        &self.disk
    }
}
