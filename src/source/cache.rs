//! Cache of PDFs produced by earlier tool calls
//!
//! pdftk only reads from the filesystem, so each entry is a temporary file.
//! Entries are handed out as `Arc`s: an evicted entry stays readable until
//! the last in-flight operation using it drops its handle.

use crate::error::Result;
use lru::LruCache;
use parking_lot::Mutex;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// A cached PDF backed by a temporary file
#[derive(Debug)]
pub struct CachedPdf {
    file: NamedTempFile,
    len: usize,
}

impl CachedPdf {
    /// Write `data` to a new temporary file
    pub fn write(data: &[u8]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("pdftk-cache-")
            .suffix(".pdf")
            .tempfile()?;
        file.write_all(data)?;
        file.flush()?;
        Ok(Self {
            file,
            len: data.len(),
        })
    }

    /// Location pdftk can read the entry from
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

struct CacheInner {
    lru: LruCache<String, Arc<CachedPdf>>,
    total_bytes: usize,
}

/// Cache manager with entry count and byte budget limits
pub struct CacheManager {
    inner: Mutex<CacheInner>,
    max_bytes: usize,
}

impl CacheManager {
    /// Create a new cache manager with the specified entry capacity and byte budget
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Whether an entry of `bytes` fits within the byte budget at all
    pub fn accepts(&self, bytes: usize) -> bool {
        bytes <= self.max_bytes
    }

    /// Store PDF bytes under `key`.
    ///
    /// Returns `Ok(false)` without writing anything when `data` alone exceeds
    /// the byte budget.
    pub fn put(&self, key: String, data: &[u8]) -> Result<bool> {
        if !self.accepts(data.len()) {
            tracing::debug!(bytes = data.len(), "output too large to cache");
            return Ok(false);
        }
        Ok(self.insert(key, CachedPdf::write(data)?))
    }

    /// Store an already written entry under `key`.
    ///
    /// Least recently used entries are evicted until the new entry fits.
    /// Returns `false` and drops the entry when it exceeds the byte budget.
    pub fn insert(&self, key: String, entry: CachedPdf) -> bool {
        if !self.accepts(entry.len()) {
            tracing::debug!(bytes = entry.len(), "output too large to cache");
            return false;
        }

        let entry = Arc::new(entry);
        let mut inner = self.inner.lock();

        if let Some(old) = inner.lru.pop(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.len());
        }

        while inner.total_bytes + entry.len() > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((evicted_key, evicted)) => {
                    tracing::debug!(key = %evicted_key, "evicting cached pdf");
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.len());
                }
                None => break,
            }
        }

        inner.total_bytes += entry.len();
        if let Some((_, evicted)) = inner.lru.push(key, entry) {
            // Capacity eviction
            inner.total_bytes = inner.total_bytes.saturating_sub(evicted.len());
        }
        true
    }

    /// Get a cached PDF, marking it as recently used
    pub fn get(&self, key: &str) -> Option<Arc<CachedPdf>> {
        self.inner.lock().lru.get(key).cloned()
    }

    /// Check if a key exists in the cache
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().lru.contains(key)
    }

    /// Remove an entry from the cache
    pub fn remove(&self, key: &str) -> Option<Arc<CachedPdf>> {
        let mut inner = self.inner.lock();
        let entry = inner.lru.pop(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(entry.len());
        Some(entry)
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    /// Get total bytes currently stored in cache
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    /// Generate a cache key that does not collide with existing keys
    pub fn generate_unique_key(&self) -> String {
        let inner = self.inner.lock();
        loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !inner.lru.contains(&key) {
                return key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_writes_readable_file() {
        let cache = CacheManager::new(10, 1024);

        assert!(cache.put("a".to_string(), b"%PDF-1.4").unwrap());
        let entry = cache.get("a").unwrap();
        assert_eq!(std::fs::read(entry.path()).unwrap(), b"%PDF-1.4");
        assert_eq!(entry.len(), 8);
        assert_eq!(cache.total_bytes(), 8);
    }

    #[test]
    fn test_capacity_eviction() {
        let cache = CacheManager::new(2, 1024);

        cache.put("a".to_string(), &[1]).unwrap();
        cache.put("b".to_string(), &[2]).unwrap();
        cache.put("c".to_string(), &[3]).unwrap();

        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.total_bytes(), 2);
    }

    #[test]
    fn test_byte_budget_eviction() {
        let cache = CacheManager::new(10, 100);

        cache.put("a".to_string(), &[0u8; 40]).unwrap();
        cache.put("b".to_string(), &[0u8; 40]).unwrap();
        // Touch "a" so "b" becomes least recently used
        assert!(cache.get("a").is_some());
        cache.put("c".to_string(), &[0u8; 40]).unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.total_bytes(), 80);
    }

    #[test]
    fn test_oversized_entry_rejected() {
        let cache = CacheManager::new(10, 50);

        assert!(!cache.put("huge".to_string(), &[0u8; 100]).unwrap());
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_replacing_key_updates_bytes() {
        let cache = CacheManager::new(10, 1024);

        cache.put("a".to_string(), &[0u8; 50]).unwrap();
        cache.put("a".to_string(), &[0u8; 30]).unwrap();
        assert_eq!(cache.total_bytes(), 30);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicted_entry_outlives_cache_slot() {
        let cache = CacheManager::new(1, 1024);

        cache.put("a".to_string(), b"first").unwrap();
        let held = cache.get("a").unwrap();
        cache.put("b".to_string(), b"second").unwrap();

        assert!(!cache.contains("a"));
        assert_eq!(std::fs::read(held.path()).unwrap(), b"first");

        let path = held.path().to_path_buf();
        drop(held);
        assert!(!path.exists());
    }

    #[test]
    fn test_insert_prewritten_entry() {
        let cache = CacheManager::new(10, 16);

        let entry = CachedPdf::write(b"%PDF-1.7").unwrap();
        let path = entry.path().to_path_buf();
        assert!(cache.insert("a".to_string(), entry));
        assert_eq!(cache.get("a").unwrap().path(), path.as_path());

        let big = CachedPdf::write(&[0u8; 32]).unwrap();
        let big_path = big.path().to_path_buf();
        assert!(!cache.accepts(big.len()));
        assert!(!cache.insert("big".to_string(), big));
        assert!(!big_path.exists());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove() {
        let cache = CacheManager::new(10, 1024);
        cache.put("a".to_string(), &[1, 2, 3]).unwrap();

        let removed = cache.remove("a").unwrap();
        assert_eq!(removed.len(), 3);
        assert!(cache.remove("a").is_none());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_unique_keys() {
        let cache = CacheManager::new(10, 1024);
        let key1 = cache.generate_unique_key();
        let key2 = cache.generate_unique_key();
        assert_ne!(key1, key2);
        assert_eq!(key1.len(), 36);
    }
}
