//! # larix-cache
//!
//! Multi-backend caching for the larix framework.
//!
//! ## Features
//!
//! - **Backends**: memory (with LRU eviction), file, database, null and Redis
//! - **TTL support**: per entry, a default per store, or forever
//! - **Typed facade**: values go through `serde_json`
//! - **Manager**: named stores built from the `cache` config section
//!
//! ## Quick Start
//!
//! ```rust
//! use larix_cache::{Cache, CacheConfig, MemoryBackend};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache = Cache::new(MemoryBackend::new(CacheConfig::default()));
//!
//! cache.put("user:123", &"Ada".to_string(), Duration::from_secs(3600)).await.unwrap();
//! let user: Option<String> = cache.get("user:123").await.unwrap();
//! assert_eq!(user, Some("Ada".to_string()));
//!
//! let report = cache
//!     .remember("report", Duration::from_secs(60), || async { vec![1, 2, 3] })
//!     .await
//!     .unwrap();
//! assert_eq!(report, vec![1, 2, 3]);
//! # });
//! ```

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod backends;
pub mod config;
pub mod manager;

pub use backends::*;
pub use config::{CacheConfig, CacheSettings, StoreConfig};
pub use manager::CacheManager;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cache configuration error: {0}")]
    Configuration(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache database error: {0}")]
    Database(#[from] larix_orm::ModelError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout error")]
    Timeout,
}

impl CacheError {
    pub fn backend<T: Into<String>>(message: T) -> Self {
        CacheError::Backend(message.into())
    }

    pub fn config<T: Into<String>>(message: T) -> Self {
        CacheError::Configuration(message.into())
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Storage contract every cache backend implements; values are opaque bytes
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value`; `None` keeps it until forgotten
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    async fn forget(&self, key: &str) -> CacheResult<bool>;

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn flush(&self) -> CacheResult<()>;

    async fn get_many(&self, keys: &[&str]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    async fn put_many(&self, entries: &[(&str, Vec<u8>, Option<Duration>)]) -> CacheResult<()> {
        for (key, value, ttl) in entries {
            self.put(key, value.clone(), *ttl).await?;
        }
        Ok(())
    }

    async fn forget_many(&self, keys: &[&str]) -> CacheResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.forget(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Add `by` to an integer entry, starting from 0 when the key is missing.
    ///
    /// The default read-modify-write stores the result without expiry;
    /// backends that can do better override it.
    async fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        let current = match self.get(key).await? {
            Some(bytes) => parse_counter(key, &bytes)?,
            None => 0,
        };
        let next = current + by;
        self.put(key, serde_json::to_vec(&next)?, None).await?;
        Ok(next)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats::default())
    }

    fn name(&self) -> &'static str {
        "cache"
    }
}

pub(crate) fn parse_counter(key: &str, bytes: &[u8]) -> CacheResult<i64> {
    serde_json::from_slice::<i64>(bytes)
        .map_err(|_| CacheError::backend(format!("Cache entry '{}' is not an integer", key)))
}

#[async_trait]
impl<B: CacheBackend + ?Sized> CacheBackend for Arc<B> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        (**self).put(key, value, ttl).await
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        (**self).forget(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        (**self).exists(key).await
    }

    async fn flush(&self) -> CacheResult<()> {
        (**self).flush().await
    }

    async fn get_many(&self, keys: &[&str]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        (**self).get_many(keys).await
    }

    async fn put_many(&self, entries: &[(&str, Vec<u8>, Option<Duration>)]) -> CacheResult<()> {
        (**self).put_many(entries).await
    }

    async fn forget_many(&self, keys: &[&str]) -> CacheResult<usize> {
        (**self).forget_many(keys).await
    }

    async fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        (**self).increment(key, by).await
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        (**self).stats().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_keys: u64,
    pub memory_usage: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// Typed cache over a backend, with an optional key prefix and default TTL
#[derive(Clone)]
pub struct Cache<B: CacheBackend> {
    backend: B,
    prefix: String,
    default_ttl: Option<Duration>,
}

impl<B: CacheBackend> std::fmt::Debug for Cache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.name())
            .field("prefix", &self.prefix)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl<B: CacheBackend> Cache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            prefix: String::new(),
            default_ttl: None,
        }
    }

    pub fn with_default_ttl(backend: B, ttl: Duration) -> Self {
        Self::new(backend).default_ttl(Some(ttl))
    }

    /// Prepend `prefix` to every key
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn key_prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.backend.get(&self.key(key)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Typed value or `default` when the key is missing
    pub async fn get_or<T>(&self, key: &str, default: T) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    pub async fn many<T>(&self, keys: &[&str]) -> CacheResult<Vec<Option<T>>>
    where
        T: DeserializeOwned,
    {
        let prefixed: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        let refs: Vec<&str> = prefixed.iter().map(String::as_str).collect();
        self.backend
            .get_many(&refs)
            .await?
            .into_iter()
            .map(|bytes| match bytes {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None),
            })
            .collect()
    }

    pub async fn put<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(&self.key(key), bytes, Some(ttl)).await
    }

    /// Store with the default TTL, or forever when none is configured
    pub async fn put_default<T>(&self, key: &str, value: &T) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(&self.key(key), bytes, self.default_ttl).await
    }

    pub async fn put_many<T>(&self, entries: &[(&str, T)], ttl: Option<Duration>) -> CacheResult<()>
    where
        T: Serialize,
    {
        let mut prepared = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            prepared.push((self.key(key), serde_json::to_vec(value)?));
        }
        let refs: Vec<(&str, Vec<u8>, Option<Duration>)> = prepared
            .iter()
            .map(|(key, bytes)| (key.as_str(), bytes.clone(), ttl))
            .collect();
        self.backend.put_many(&refs).await
    }

    pub async fn forever<T>(&self, key: &str, value: &T) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(&self.key(key), bytes, None).await
    }

    /// Store only when the key is absent; returns whether it was stored
    pub async fn add<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<bool>
    where
        T: Serialize + ?Sized,
    {
        if self.has(key).await? {
            return Ok(false);
        }
        self.put(key, value, ttl).await?;
        Ok(true)
    }

    /// Get and remove
    pub async fn pull<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let value = self.get(key).await?;
        if value.is_some() {
            self.forget(key).await?;
        }
        Ok(value)
    }

    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        self.backend.exists(&self.key(key)).await
    }

    pub async fn missing(&self, key: &str) -> CacheResult<bool> {
        Ok(!self.has(key).await?)
    }

    pub async fn forget(&self, key: &str) -> CacheResult<bool> {
        self.backend.forget(&self.key(key)).await
    }

    pub async fn flush(&self) -> CacheResult<()> {
        self.backend.flush().await
    }

    /// Get from the cache or compute, store and return
    pub async fn remember<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(cached) = self.get(key).await? {
            return Ok(cached);
        }
        let value = compute().await;
        self.put(key, &value, ttl).await?;
        Ok(value)
    }

    pub async fn remember_forever<T, F, Fut>(&self, key: &str, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(cached) = self.get(key).await? {
            return Ok(cached);
        }
        let value = compute().await;
        self.forever(key, &value).await?;
        Ok(value)
    }

    pub async fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        self.backend.increment(&self.key(key), by).await
    }

    pub async fn decrement(&self, key: &str, by: i64) -> CacheResult<i64> {
        self.backend.increment(&self.key(key), -by).await
    }

    pub async fn stats(&self) -> CacheResult<CacheStats> {
        self.backend.stats().await
    }
}
