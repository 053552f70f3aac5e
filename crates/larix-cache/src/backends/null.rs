//! Backend that stores nothing, for disabling the cache

use crate::{CacheBackend, CacheResult};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheBackend for NullBackend {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> CacheResult<()> {
        Ok(())
    }

    async fn forget(&self, _key: &str) -> CacheResult<bool> {
        Ok(false)
    }

    async fn exists(&self, _key: &str) -> CacheResult<bool> {
        Ok(false)
    }

    async fn flush(&self) -> CacheResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cache;

    #[tokio::test]
    async fn test_nothing_is_kept() {
        let cache = Cache::new(NullBackend::new());
        cache.forever("key", &1).await.unwrap();
        assert_eq!(cache.get::<i32>("key").await.unwrap(), None);
        assert!(!cache.has("key").await.unwrap());
        assert!(!cache.forget("key").await.unwrap());

        // remember always recomputes
        let value = cache.remember_forever("key", || async { 2 }).await.unwrap();
        assert_eq!(value, 2);
        assert_eq!(cache.increment("n", 4).await.unwrap(), 4);
        assert_eq!(cache.increment("n", 4).await.unwrap(), 4);
    }
}
