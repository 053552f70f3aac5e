//! Cache configuration
//!
//! `CacheConfig` tunes the memory backend. `CacheSettings` is the `cache`
//! section of the application config:
//!
//! ```yaml
//! cache:
//!   default: file
//!   prefix: "larix_cache:"
//!   ttl: 3600
//!   stores:
//!     memory: { driver: memory, max_entries: 10000 }
//!     file: { driver: file, path: storage/framework/cache }
//!     database: { driver: database, table: cache }
//!     null: { driver: "null" }
//!     redis: { driver: redis, url: "redis://127.0.0.1:6379" }
//! ```

use crate::{CacheError, CacheResult};
use larix_core::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_CACHE_PATH: &str = "storage/framework/cache";
pub const DEFAULT_CACHE_TABLE: &str = "cache";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Limits for the memory backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction
    pub max_entries: Option<usize>,

    /// Memory limit in bytes
    pub max_memory: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: Some(10_000),
            max_memory: Some(100 * 1024 * 1024),
        }
    }
}

impl CacheConfig {
    pub fn max_entries_limit(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn unlimited_entries(mut self) -> Self {
        self.max_entries = None;
        self
    }

    pub fn max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    pub fn unlimited_memory(mut self) -> Self {
        self.max_memory = None;
        self
    }
}

fn default_path() -> String {
    DEFAULT_CACHE_PATH.to_string()
}

fn default_table() -> String {
    DEFAULT_CACHE_TABLE.to_string()
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

/// One named store under `cache.stores`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory {
        #[serde(default)]
        max_entries: Option<usize>,
    },
    File {
        #[serde(default = "default_path")]
        path: String,
    },
    Database {
        #[serde(default = "default_table")]
        table: String,
    },
    Null,
    Redis {
        #[serde(default = "default_redis_url")]
        url: String,
    },
}

impl StoreConfig {
    pub fn driver(&self) -> &'static str {
        match self {
            StoreConfig::Memory { .. } => "memory",
            StoreConfig::File { .. } => "file",
            StoreConfig::Database { .. } => "database",
            StoreConfig::Null => "null",
            StoreConfig::Redis { .. } => "redis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub default: String,
    pub prefix: String,
    /// Default TTL in seconds for `put_default`; 0 means forever
    pub ttl: u64,
    pub stores: HashMap<String, StoreConfig>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let stores = HashMap::from([
            ("memory".to_string(), StoreConfig::Memory { max_entries: None }),
            ("file".to_string(), StoreConfig::File { path: default_path() }),
            ("database".to_string(), StoreConfig::Database { table: default_table() }),
            ("null".to_string(), StoreConfig::Null),
        ]);
        Self {
            default: "file".to_string(),
            prefix: String::new(),
            ttl: 3600,
            stores,
        }
    }
}

impl CacheSettings {
    /// Read the `cache` section, falling back to defaults when absent
    pub fn from_config(config: &Config) -> CacheResult<Self> {
        let settings = match config.get("cache") {
            Some(value) => serde_json::from_value::<CacheSettings>(value.clone())
                .map_err(|e| CacheError::config(format!("Invalid cache configuration: {}", e)))?,
            None => CacheSettings::default(),
        };
        if !settings.stores.contains_key(&settings.default) {
            return Err(CacheError::config(format!(
                "Default cache store '{}' is not defined",
                settings.default
            )));
        }
        Ok(settings)
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        (self.ttl > 0).then(|| Duration::from_secs(self.ttl))
    }

    pub fn store(&self, name: &str) -> CacheResult<&StoreConfig> {
        self.stores
            .get(name)
            .ok_or_else(|| CacheError::config(format!("Cache store [{}] is not defined", name)))
    }
}
