//! In-memory cache of decoded images with LRU eviction.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use tracing::debug;

use super::key::ImageKey;
use super::DecodedImage;

/// Entry in the memory cache.
struct CacheEntry {
    /// Cached decoded image
    image: DecodedImage,
    /// Raw pixel size in bytes, used for the cache bound
    size_bytes: usize,
    /// Last access time for LRU eviction
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(image: DecodedImage) -> Self {
        let size_bytes = image.as_bytes().len();
        Self {
            image,
            size_bytes,
            last_accessed: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// Statistics for the memory cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Fastest cache tier: decoded images keyed by sanitized URL.
///
/// Byte-bounded; least-recently-used entries are evicted when an insert
/// would exceed the bound. Lives for the process lifetime.
pub struct MemoryCache {
    entries: Mutex<HashMap<ImageKey, CacheEntry>>,
    max_size_bytes: usize,
    current_size_bytes: Mutex<usize>,
    stats: Mutex<MemoryCacheStats>,
}

impl MemoryCache {
    /// Create a new memory cache with the given byte bound.
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_size_bytes,
            current_size_bytes: Mutex::new(0),
            stats: Mutex::new(MemoryCacheStats::default()),
        }
    }

    /// Get a cached image, refreshing its LRU position on hit.
    pub fn get(&self, key: &ImageKey) -> Option<DecodedImage> {
        let mut entries = self.entries.lock().unwrap();

        if let Some(entry) = entries.get_mut(key) {
            entry.touch();
            self.stats.lock().unwrap().hits += 1;
            Some(DecodedImage::clone(&entry.image))
        } else {
            self.stats.lock().unwrap().misses += 1;
            None
        }
    }

    /// Insert an image, evicting LRU entries first if the bound would be
    /// exceeded. Replaces any existing entry for the key.
    pub fn put(&self, key: ImageKey, image: DecodedImage) {
        let entry = CacheEntry::new(image);
        let new_size = entry.size_bytes;

        let mut entries = self.entries.lock().unwrap();
        let mut current = self.current_size_bytes.lock().unwrap();

        if let Some(old) = entries.remove(&key) {
            *current = current.saturating_sub(old.size_bytes);
        }

        if *current + new_size > self.max_size_bytes {
            let target = self.max_size_bytes.saturating_sub(new_size);
            let evicted = Self::evict_until(&mut entries, &mut current, target);
            if evicted > 0 {
                self.stats.lock().unwrap().evictions += evicted;
                debug!(evicted, size = *current, "Memory cache evicted LRU entries");
            }
        }

        *current += new_size;
        entries.insert(key, entry);
    }

    /// Whether the key is currently cached.
    pub fn contains(&self, key: &ImageKey) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    /// Number of cached entries.
    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Current size of the cache in bytes.
    pub fn size_bytes(&self) -> usize {
        *self.current_size_bytes.lock().unwrap()
    }

    /// Maximum size of the cache in bytes.
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Snapshot of the cache statistics.
    pub fn stats(&self) -> MemoryCacheStats {
        *self.stats.lock().unwrap()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        *self.current_size_bytes.lock().unwrap() = 0;
    }

    /// Evict oldest entries until `current <= target`. Returns the number
    /// of entries evicted.
    fn evict_until(
        entries: &mut HashMap<ImageKey, CacheEntry>,
        current: &mut usize,
        target: usize,
    ) -> u64 {
        let mut by_age: Vec<(ImageKey, Instant, usize)> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.last_accessed, v.size_bytes))
            .collect();
        by_age.sort_by_key(|(_, accessed, _)| *accessed);

        let mut evicted = 0;
        for (key, _, size) in by_age {
            if *current <= target {
                break;
            }
            entries.remove(&key);
            *current = current.saturating_sub(size);
            evicted += 1;
        }
        evicted
    }
}
