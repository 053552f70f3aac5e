//! Database cache backend
//!
//! Entries live in a `cache(key, value, expiration)` table that is created
//! the first time the backend is used. Values are stored base64 encoded and
//! `expiration` is a unix timestamp, `NULL` for entries kept forever.

use crate::{CacheBackend, CacheError, CacheResult, CacheStats};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use larix_orm::{Database, Row};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::OnceCell;

#[derive(Debug)]
pub struct DatabaseBackend {
    db: Database,
    table: String,
    ready: OnceCell<()>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl DatabaseBackend {
    pub fn new(db: Database, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
            ready: OnceCell::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn ensure_table(&self) -> CacheResult<()> {
        self.ready
            .get_or_try_init(|| async {
                if !self.db.has_table(&self.table).await? {
                    let mut schema = self.db.schema();
                    schema.create(&self.table, |t| {
                        t.string("key", 255).primary();
                        t.text("value");
                        t.big_integer("expiration").nullable();
                    })?;
                    self.db.run_schema(schema).await?;
                    tracing::info!(table = %self.table, "Created cache table");
                }
                Ok::<(), CacheError>(())
            })
            .await?;
        Ok(())
    }

    async fn fetch(&self, key: &str) -> CacheResult<Option<Row>> {
        self.ensure_table().await?;
        Ok(self
            .db
            .table(&self.table)
            .where_eq("key", key)
            .first(&self.db)
            .await?)
    }

    /// Delete every expired row, returning how many were removed
    pub async fn cleanup_expired(&self) -> CacheResult<u64> {
        self.ensure_table().await?;
        Ok(self
            .db
            .table(&self.table)
            .where_("expiration", "<=", now())
            .delete(&self.db)
            .await?)
    }
}

fn is_expired(row: &Row) -> bool {
    row.get("expiration")
        .and_then(Value::as_i64)
        .map_or(false, |at| now() >= at)
}

#[async_trait]
impl CacheBackend for DatabaseBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let Some(row) = self.fetch(key).await? else {
            return Ok(None);
        };
        if is_expired(&row) {
            self.forget(key).await?;
            return Ok(None);
        }
        let encoded = row.get("value").and_then(Value::as_str).unwrap_or_default();
        STANDARD
            .decode(encoded)
            .map(Some)
            .map_err(|e| CacheError::backend(format!("Corrupt cache entry '{}': {}", key, e)))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        self.ensure_table().await?;
        let mut row = Map::new();
        row.insert("key".to_string(), Value::from(key));
        row.insert("value".to_string(), Value::from(STANDARD.encode(value)));
        if let Some(ttl) = ttl {
            row.insert("expiration".to_string(), Value::from(now() + ttl.as_secs() as i64));
        }

        let tx = self.db.begin().await?;
        tx.table(&self.table).where_eq("key", key).delete(&tx).await?;
        tx.table(&self.table).insert(&tx, row).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        self.ensure_table().await?;
        let removed = self
            .db
            .table(&self.table)
            .where_eq("key", key)
            .delete(&self.db)
            .await?;
        Ok(removed > 0)
    }

    async fn flush(&self) -> CacheResult<()> {
        self.ensure_table().await?;
        self.db.table(&self.table).delete(&self.db).await?;
        Ok(())
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        self.ensure_table().await?;
        let total_keys = self.db.table(&self.table).count(&self.db).await?;
        Ok(CacheStats {
            total_keys,
            ..CacheStats::default()
        })
    }

    fn name(&self) -> &'static str {
        "database"
    }
}
