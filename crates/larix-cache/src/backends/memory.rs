//! In-memory cache backend with LRU eviction

use crate::{parse_counter, CacheBackend, CacheConfig, CacheResult, CacheStats};
use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| Instant::now() >= exp)
    }

    fn size(&self) -> usize {
        self.data.len() + std::mem::size_of::<Self>()
    }
}

/// In-memory cache backend with LRU eviction
pub struct MemoryBackend {
    entries: DashMap<String, CacheEntry>,
    // recency order only; never locked while an `entries` guard is held
    recency: Mutex<LruCache<String, ()>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl MemoryBackend {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            recency: Mutex::new(LruCache::unbounded()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn memory_usage(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().size()).sum()
    }

    fn over_limits(&self, incoming: usize) -> bool {
        if let Some(max_entries) = self.config.max_entries {
            if self.entries.len() + incoming > max_entries {
                return true;
            }
        }
        if let Some(max_memory) = self.config.max_memory {
            if self.memory_usage() > max_memory {
                return true;
            }
        }
        false
    }

    fn touch(&self, key: &str) {
        self.recency.lock().put(key.to_string(), ());
    }

    fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.recency.lock().pop(key);
        removed
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Make room for `incoming` new entries
    fn evict(&self, incoming: usize) {
        self.cleanup_expired();
        while self.over_limits(incoming) {
            let oldest = self.recency.lock().pop_lru();
            match oldest {
                Some((key, ())) => {
                    tracing::debug!(key = %key, "Evicting least recently used cache entry");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let found = self.entries.get(key).map(|entry| {
            if entry.is_expired() {
                None
            } else {
                Some(entry.data.clone())
            }
        });

        match found {
            Some(Some(data)) => {
                self.touch(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(data))
            }
            Some(None) => {
                self.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        if !self.entries.contains_key(key) {
            self.evict(1);
        }
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        self.touch(key);
        Ok(())
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        Ok(self.remove(key))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(false),
        };
        if expired {
            self.remove(key);
        }
        Ok(!expired)
    }

    async fn flush(&self) -> CacheResult<()> {
        self.entries.clear();
        self.recency.lock().clear();
        Ok(())
    }

    /// Keeps the entry's expiry, unlike the generic read-modify-write
    async fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        let result = {
            let mut entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| CacheEntry::new(b"0".to_vec(), None));
            if entry.is_expired() {
                *entry = CacheEntry::new(b"0".to_vec(), None);
            }
            let next = parse_counter(key, &entry.data)? + by;
            entry.data = serde_json::to_vec(&next)?;
            next
        };
        self.touch(key);
        Ok(result)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            total_keys: self.entries.len() as u64,
            memory_usage: self.memory_usage() as u64,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
