//! LRU cache of compiled template sources
//!
//! Entries are keyed by view name plus the blake3 hash of the raw source, so
//! editing a template on disk never serves stale output.

use crate::ViewResult;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct TemplateCache {
    entries: Mutex<LruCache<String, Arc<str>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TemplateCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn key(name: &str, source: &str) -> String {
        format!("{}:{}", name, blake3::hash(source.as_bytes()).to_hex())
    }

    /// Return the compiled form of `source`, compiling on a miss
    pub fn get_or_compile<F>(&self, name: &str, source: &str, compile: F) -> ViewResult<Arc<str>>
    where
        F: FnOnce() -> ViewResult<String>,
    {
        let key = Self::key(name, source);
        if let Some(compiled) = self.entries.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(compiled);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled: Arc<str> = compile()?.into();
        self.entries.lock().put(key, compiled.clone());
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// `(hits, misses)` since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}
