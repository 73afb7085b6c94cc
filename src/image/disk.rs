//! Disk cache of raw image bytes.
//!
//! Files are named by the sanitized URL key and written with unconditional
//! overwrite. A stored file is authoritative forever: there is no TTL, no
//! staleness check and no revalidation against the network resource.
//! Entries persist until explicitly deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use super::key::ImageKey;
use super::CacheError;

/// Statistics for the disk cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

/// Persistent cache tier: raw image bytes on disk.
pub struct DiskCache {
    cache_dir: PathBuf,
    stats: Mutex<DiskCacheStats>,
}

impl DiskCache {
    /// Create a disk cache rooted at the given directory, creating it if
    /// needed.
    pub fn new(cache_dir: PathBuf) -> Result<Self, CacheError> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
            info!(dir = %cache_dir.display(), "Created image cache directory");
        }

        Ok(Self {
            cache_dir,
            stats: Mutex::new(DiskCacheStats::default()),
        })
    }

    /// Read the cached bytes for a key, if present.
    pub fn get(&self, key: &ImageKey) -> Option<Vec<u8>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => {
                self.stats.lock().unwrap().hits += 1;
                Some(bytes)
            }
            Err(_) => {
                self.stats.lock().unwrap().misses += 1;
                None
            }
        }
    }

    /// Write bytes for a key, overwriting any existing file.
    pub fn put(&self, key: &ImageKey, bytes: &[u8]) -> Result<(), CacheError> {
        fs::write(self.path_for(key), bytes)?;
        self.stats.lock().unwrap().writes += 1;
        Ok(())
    }

    /// Whether a file exists for the key.
    pub fn contains(&self, key: &ImageKey) -> bool {
        self.path_for(key).exists()
    }

    /// Delete the cached file for a key.
    ///
    /// Missing files are logged, not errors.
    pub fn delete(&self, key: &ImageKey) {
        let path = self.path_for(key);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(key = %key, error = %e, "Failed to delete cached image");
            }
        } else {
            warn!(key = %key, "No cached image to delete");
        }
    }

    /// Snapshot of the cache statistics.
    pub fn stats(&self) -> DiskCacheStats {
        *self.stats.lock().unwrap()
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn path_for(&self, key: &ImageKey) -> PathBuf {
        self.cache_dir.join(key.as_str())
    }
}
