//! Named cache stores built from configuration

use crate::backends::{DatabaseBackend, FileBackend, MemoryBackend, NullBackend};
use crate::config::{CacheSettings, StoreConfig};
use crate::{Cache, CacheBackend, CacheConfig, CacheError, CacheResult};
use larix_core::Config;
use larix_orm::Database;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type SharedBackend = Arc<dyn CacheBackend>;

/// Resolves stores lazily and keeps one backend per store name, so a
/// memory store is shared by every caller
pub struct CacheManager {
    settings: CacheSettings,
    database: Option<Database>,
    resolved: RwLock<HashMap<String, SharedBackend>>,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut resolved: Vec<String> = self.resolved.read().keys().cloned().collect();
        resolved.sort();
        f.debug_struct("CacheManager")
            .field("default", &self.settings.default)
            .field("stores", &self.store_names())
            .field("resolved", &resolved)
            .finish()
    }
}

impl CacheManager {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            database: None,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> CacheResult<Self> {
        Ok(Self::new(CacheSettings::from_config(config)?))
    }

    /// Connection used by `database` stores
    pub fn with_database(mut self, db: Database) -> Self {
        self.database = Some(db);
        self
    }

    /// Register a backend under `name`, replacing any configured store
    pub fn extend(&self, name: &str, backend: SharedBackend) {
        self.resolved.write().insert(name.to_string(), backend);
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn default_store_name(&self) -> &str {
        &self.settings.default
    }

    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.settings.stores.keys().cloned().collect();
        for name in self.resolved.read().keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    pub async fn store(&self, name: &str) -> CacheResult<Cache<SharedBackend>> {
        let backend = self.backend(name).await?;
        Ok(Cache::new(backend)
            .prefix(self.settings.prefix.clone())
            .default_ttl(self.settings.default_ttl()))
    }

    pub async fn default_store(&self) -> CacheResult<Cache<SharedBackend>> {
        self.store(&self.settings.default).await
    }

    async fn backend(&self, name: &str) -> CacheResult<SharedBackend> {
        if let Some(backend) = self.resolved.read().get(name).cloned() {
            return Ok(backend);
        }
        let config = self.settings.store(name)?.clone();
        let backend = self.build(name, &config).await?;
        tracing::debug!(store = %name, driver = config.driver(), "Cache store resolved");

        // a concurrent caller may have won the race; keep the first backend
        let mut resolved = self.resolved.write();
        Ok(resolved.entry(name.to_string()).or_insert(backend).clone())
    }

    async fn build(&self, name: &str, config: &StoreConfig) -> CacheResult<SharedBackend> {
        let backend: SharedBackend = match config {
            StoreConfig::Memory { max_entries } => {
                let mut memory = CacheConfig::default();
                if let Some(max) = max_entries {
                    memory = memory.max_entries_limit(*max);
                }
                Arc::new(MemoryBackend::new(memory))
            }
            StoreConfig::File { path } => Arc::new(FileBackend::new(path)),
            StoreConfig::Database { table } => {
                let db = self.database.clone().ok_or_else(|| {
                    CacheError::config(format!(
                        "Cache store [{}] uses the database driver but no database connection was given",
                        name
                    ))
                })?;
                Arc::new(DatabaseBackend::new(db, table.clone()))
            }
            StoreConfig::Null => Arc::new(NullBackend::new()),
            StoreConfig::Redis { url } => self.redis(name, url).await?,
        };
        Ok(backend)
    }

    #[cfg(feature = "redis-backend")]
    async fn redis(&self, _name: &str, url: &str) -> CacheResult<SharedBackend> {
        let backend = crate::backends::RedisBackend::from_url(url).await?;
        Ok(Arc::new(backend))
    }

    #[cfg(not(feature = "redis-backend"))]
    async fn redis(&self, name: &str, _url: &str) -> CacheResult<SharedBackend> {
        Err(CacheError::config(format!(
            "Cache store [{}] needs the redis-backend feature of larix-cache",
            name
        )))
    }
}
