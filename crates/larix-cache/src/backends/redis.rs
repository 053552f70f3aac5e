//! Redis cache backend over a multiplexed connection manager

use crate::{CacheBackend, CacheError, CacheResult, CacheStats};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub command_timeout: Duration,
    /// Scopes keys so `flush` only removes this cache's entries
    pub key_prefix: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: crate::config::DEFAULT_REDIS_URL.to_string(),
            command_timeout: Duration::from_secs(1),
            key_prefix: Some("larix_cache:".to_string()),
        }
    }
}

impl RedisConfig {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn key_prefix(mut self, prefix: Option<String>) -> Self {
        self.key_prefix = prefix;
        self
    }
}

fn redis_error(e: redis::RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_refusal() {
        CacheError::Network(e.to_string())
    } else {
        CacheError::Backend(format!("Redis operation failed: {}", e))
    }
}

pub struct RedisBackend {
    connection: ConnectionManager,
    config: RedisConfig,
    stats: Mutex<CacheStats>,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").field("config", &self.config).finish()
    }
}

impl RedisBackend {
    /// Connect and verify the server answers
    pub async fn new(config: RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::config(format!("Invalid Redis URL '{}': {}", config.url, e)))?;
        let mut connection = ConnectionManager::new(client).await.map_err(redis_error)?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await
            .map_err(redis_error)?;
        tracing::debug!(url = %config.url, "Redis cache connected");

        Ok(Self {
            connection,
            config,
            stats: Mutex::new(CacheStats::default()),
        })
    }

    pub async fn from_url(url: impl Into<String>) -> CacheResult<Self> {
        Self::new(RedisConfig::default().url(url)).await
    }

    fn format_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }

    async fn run<F, Fut, R>(&self, operation: F) -> CacheResult<R>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<R>>,
    {
        tokio::time::timeout(self.config.command_timeout, operation(self.connection.clone()))
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(redis_error)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let key = self.format_key(key);
        let value: Option<Vec<u8>> = self.run(|mut conn| async move { conn.get(key).await }).await?;
        let mut stats = self.stats.lock();
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        let key = self.format_key(key);
        self.run(|mut conn| async move {
            match ttl {
                // SETEX rejects 0, so the shortest TTL is one second
                Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1) as usize).await,
                None => conn.set(key, value).await,
            }
        })
        .await
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        let key = self.format_key(key);
        let removed: i64 = self.run(|mut conn| async move { conn.del(key).await }).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let key = self.format_key(key);
        self.run(|mut conn| async move { conn.exists(key).await }).await
    }

    async fn flush(&self) -> CacheResult<()> {
        match self.config.key_prefix.clone() {
            Some(prefix) => {
                self.run(|mut conn| async move {
                    let keys: Vec<String> = conn.keys(format!("{}*", prefix)).await?;
                    if !keys.is_empty() {
                        conn.del::<_, ()>(keys).await?;
                    }
                    Ok(())
                })
                .await
            }
            None => {
                tracing::warn!("Flushing the whole Redis database; no key prefix configured");
                self.run(|mut conn| async move { redis::cmd("FLUSHDB").query_async(&mut conn).await })
                    .await
            }
        }
    }

    async fn get_many(&self, keys: &[&str]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = keys.iter().map(|k| self.format_key(k)).collect();
        // MGET with a single key replies with a bare value, so always ask for a list
        self.run(|mut conn| async move {
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await
        })
        .await
    }

    /// INCRBY keeps the key's TTL
    async fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        let key = self.format_key(key);
        self.run(|mut conn| async move { conn.incr(key, by).await }).await
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(self.stats.lock().clone())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
