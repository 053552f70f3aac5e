use super::value::{bind_params, decode_row, value_as_i64, Row};
use super::Driver;
use crate::error::{ModelError, ModelResult};
use crate::grammar::{grammar_for, Grammar};
use crate::query::QueryBuilder;
use crate::schema::Schema;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::{Any, AnyPool, Transaction};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;

/// Connection pool settings
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn is_sqlite_memory(&self) -> bool {
        self.url.starts_with("sqlite:") && self.url.contains(":memory:")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Statement execution shared by pools and transactions
#[async_trait]
pub trait Executor: Send + Sync {
    fn driver(&self) -> Driver;

    fn grammar(&self) -> &'static dyn Grammar {
        grammar_for(self.driver())
    }

    /// Run a statement and return the number of affected rows
    async fn execute(&self, sql: &str, params: &[Value]) -> ModelResult<u64>;

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> ModelResult<Vec<Row>>;

    async fn fetch_optional(&self, sql: &str, params: &[Value]) -> ModelResult<Option<Row>>;

    /// Run an insert and return the generated key
    async fn insert_get_id(&self, sql: &str, params: &[Value]) -> ModelResult<i64>;
}

/// A pooled connection to one database
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    driver: Driver,
}

impl Database {
    pub async fn connect(url: &str) -> ModelResult<Self> {
        Self::connect_with(DatabaseConfig::new(url)).await
    }

    pub async fn connect_with(config: DatabaseConfig) -> ModelResult<Self> {
        install_default_drivers();
        let driver = Driver::from_url(&config.url)?;

        let mut url = config.url.clone();
        let mut options = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout);

        if driver == Driver::Sqlite {
            if config.is_sqlite_memory() {
                // Every connection to :memory: is a separate database
                options = options
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None);
            } else {
                url = prepare_sqlite_file(&url)?;
            }
        }

        let pool = options
            .connect(&url)
            .await
            .map_err(|e| ModelError::Connection(format!("failed to connect to {}: {}", driver, e)))?;

        tracing::debug!(driver = %driver, "database connected");
        Ok(Self { pool, driver })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn grammar(&self) -> &'static dyn Grammar {
        grammar_for(self.driver)
    }

    /// Query builder for `table`
    pub fn table(&self, name: &str) -> QueryBuilder {
        QueryBuilder::table(name).with_driver(self.driver)
    }

    /// Empty schema for this connection's dialect
    pub fn schema(&self) -> Schema {
        Schema::new(self.driver)
    }

    /// Run the statements collected by a schema, in order
    pub async fn run_schema(&self, schema: Schema) -> ModelResult<()> {
        for statement in schema.into_statements()? {
            tracing::debug!(sql = %statement, "schema statement");
            self.execute(&statement, &[]).await?;
        }
        Ok(())
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> ModelResult<u64> {
        let result = bind_params(self.driver, sql, params)?
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(&self, sql: &str, params: &[Value]) -> ModelResult<Vec<Row>> {
        let rows = bind_params(self.driver, sql, params)?
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    pub async fn fetch_optional(&self, sql: &str, params: &[Value]) -> ModelResult<Option<Row>> {
        let row = bind_params(self.driver, sql, params)?
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(decode_row))
    }

    pub async fn insert_get_id(&self, sql: &str, params: &[Value]) -> ModelResult<i64> {
        let Some(id_query) = self.driver.last_insert_id_query() else {
            let row = self.fetch_optional(sql, params).await?;
            return returned_id(row);
        };
        // the generated id is per connection, so both statements share one
        let mut conn = self.pool.acquire().await?;
        bind_params(self.driver, sql, params)?
            .execute(&mut *conn)
            .await?;
        let row = sqlx::query(id_query).fetch_optional(&mut *conn).await?;
        returned_id(row.as_ref().map(decode_row))
    }

    /// Start a transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> ModelResult<DbTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ModelError::Transaction(e.to_string()))?;
        Ok(DbTransaction {
            tx: Mutex::new(Some(tx)),
            driver: self.driver,
        })
    }

    pub async fn table_names(&self) -> ModelResult<Vec<String>> {
        let sql = self.grammar().compile_table_listing();
        let rows = self.fetch_all(&sql, &[]).await?;
        Ok(names(rows))
    }

    pub async fn has_table(&self, table: &str) -> ModelResult<bool> {
        let (sql, params) = self.grammar().compile_table_exists(table);
        let row = self.fetch_optional(&sql, &params).await?;
        Ok(row
            .and_then(|r| r.get("aggregate").and_then(value_as_i64))
            .unwrap_or(0)
            > 0)
    }

    pub async fn column_names(&self, table: &str) -> ModelResult<Vec<String>> {
        let (sql, params) = self.grammar().compile_column_listing(table);
        let rows = self.fetch_all(&sql, &params).await?;
        Ok(names(rows))
    }

    pub async fn column_listing(&self, table: &str) -> ModelResult<Vec<String>> {
        self.column_names(table).await
    }

    pub async fn has_column(&self, table: &str, column: &str) -> ModelResult<bool> {
        let columns = self.column_names(table).await?;
        Ok(columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }

    pub async fn has_columns(&self, table: &str, columns: &[&str]) -> ModelResult<bool> {
        let existing = self.column_names(table).await?;
        Ok(columns
            .iter()
            .all(|wanted| existing.iter().any(|c| c.eq_ignore_ascii_case(wanted))))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Executor for Database {
    fn driver(&self) -> Driver {
        self.driver
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> ModelResult<u64> {
        Database::execute(self, sql, params).await
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> ModelResult<Vec<Row>> {
        Database::fetch_all(self, sql, params).await
    }

    async fn fetch_optional(&self, sql: &str, params: &[Value]) -> ModelResult<Option<Row>> {
        Database::fetch_optional(self, sql, params).await
    }

    async fn insert_get_id(&self, sql: &str, params: &[Value]) -> ModelResult<i64> {
        Database::insert_get_id(self, sql, params).await
    }
}

/// An open transaction.
///
/// Statements run on the transaction's connection until `commit` or
/// `rollback` consumes it.
pub struct DbTransaction {
    tx: Mutex<Option<Transaction<'static, Any>>>,
    driver: Driver,
}

impl std::fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbTransaction")
            .field("driver", &self.driver)
            .finish()
    }
}

fn finished() -> ModelError {
    ModelError::Transaction("transaction already finished".to_string())
}

impl DbTransaction {
    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn table(&self, name: &str) -> QueryBuilder {
        QueryBuilder::table(name).with_driver(self.driver)
    }

    pub async fn run_schema(&self, schema: Schema) -> ModelResult<()> {
        for statement in schema.into_statements()? {
            self.execute(&statement, &[]).await?;
        }
        Ok(())
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> ModelResult<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let result = bind_params(self.driver, sql, params)?
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(&self, sql: &str, params: &[Value]) -> ModelResult<Vec<Row>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let rows = bind_params(self.driver, sql, params)?
            .fetch_all(&mut **tx)
            .await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    pub async fn fetch_optional(&self, sql: &str, params: &[Value]) -> ModelResult<Option<Row>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        let row = bind_params(self.driver, sql, params)?
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.as_ref().map(decode_row))
    }

    pub async fn insert_get_id(&self, sql: &str, params: &[Value]) -> ModelResult<i64> {
        let Some(id_query) = self.driver.last_insert_id_query() else {
            let row = self.fetch_optional(sql, params).await?;
            return returned_id(row);
        };
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        bind_params(self.driver, sql, params)?
            .execute(&mut **tx)
            .await?;
        let row = sqlx::query(id_query).fetch_optional(&mut **tx).await?;
        returned_id(row.as_ref().map(decode_row))
    }

    pub async fn commit(self) -> ModelResult<()> {
        let tx = self.tx.into_inner().ok_or_else(finished)?;
        tx.commit()
            .await
            .map_err(|e| ModelError::Transaction(e.to_string()))
    }

    pub async fn rollback(self) -> ModelResult<()> {
        let tx = self.tx.into_inner().ok_or_else(finished)?;
        tx.rollback()
            .await
            .map_err(|e| ModelError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl Executor for DbTransaction {
    fn driver(&self) -> Driver {
        self.driver
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> ModelResult<u64> {
        DbTransaction::execute(self, sql, params).await
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> ModelResult<Vec<Row>> {
        DbTransaction::fetch_all(self, sql, params).await
    }

    async fn fetch_optional(&self, sql: &str, params: &[Value]) -> ModelResult<Option<Row>> {
        DbTransaction::fetch_optional(self, sql, params).await
    }

    async fn insert_get_id(&self, sql: &str, params: &[Value]) -> ModelResult<i64> {
        DbTransaction::insert_get_id(self, sql, params).await
    }
}

fn returned_id(row: Option<Row>) -> ModelResult<i64> {
    row.and_then(|r| r.values().next().and_then(value_as_i64))
        .ok_or(ModelError::MissingPrimaryKey)
}

fn names(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| {
            row.get("name")
                .or_else(|| row.values().next())
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}

/// Make sure a sqlite file database can be created on first connect
fn prepare_sqlite_file(url: &str) -> ModelResult<String> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ModelError::Connection(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
    }

    if url.contains("mode=") {
        Ok(url.to_string())
    } else if url.contains('?') {
        Ok(format!("{}&mode=rwc", url))
    } else {
        Ok(format!("{}?mode=rwc", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_fetch() {
        let db = memory().await;
        db.execute(
            "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, price REAL, data BLOB)",
            &[],
        )
        .await
        .unwrap();

        let id = db
            .insert_get_id("INSERT INTO items (name, price) VALUES (?, ?)", &[json!("pen"), json!(1.5)])
            .await
            .unwrap();
        assert_eq!(id, 1);

        let rows = db.fetch_all("SELECT * FROM items", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("pen"));
        assert_eq!(rows[0]["price"], json!(1.5));
        assert_eq!(rows[0]["data"], Value::Null);

        let missing = db
            .fetch_optional("SELECT * FROM items WHERE id = ?", &[json!(99)])
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_transactions_commit_and_rollback() {
        let db = memory().await;
        db.execute("CREATE TABLE logs (message TEXT)", &[]).await.unwrap();

        let tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO logs (message) VALUES (?)", &[json!("kept")]).await.unwrap();
        tx.commit().await.unwrap();

        let tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO logs (message) VALUES (?)", &[json!("dropped")]).await.unwrap();
        tx.rollback().await.unwrap();

        let rows = db.fetch_all("SELECT message FROM logs", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["message"], json!("kept"));
    }

    #[tokio::test]
    async fn test_insert_get_id_is_per_connection() {
        let db = memory().await;
        db.execute("CREATE TABLE tags (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)", &[])
            .await
            .unwrap();

        let first = db
            .insert_get_id("INSERT INTO tags (name) VALUES (?)", &[json!("rust")])
            .await
            .unwrap();
        let second = db
            .insert_get_id("INSERT INTO tags (name) VALUES (?)", &[json!("sql")])
            .await
            .unwrap();
        assert_eq!((first, second), (1, 2));

        let tx = db.begin().await.unwrap();
        let third = tx
            .insert_get_id("INSERT INTO tags (name) VALUES (?)", &[json!("web")])
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(third, 3);
    }

    #[tokio::test]
    async fn test_introspection() {
        let db = memory().await;
        db.execute("CREATE TABLE users (id INTEGER, email TEXT)", &[]).await.unwrap();

        assert!(db.has_table("users").await.unwrap());
        assert!(!db.has_table("posts").await.unwrap());
        assert_eq!(db.table_names().await.unwrap(), vec!["users".to_string()]);
        assert_eq!(db.column_names("users").await.unwrap(), vec!["id", "email"]);
        assert!(db.has_column("users", "EMAIL").await.unwrap());
        assert!(db.has_columns("users", &["id", "email"]).await.unwrap());
        assert!(!db.has_columns("users", &["id", "name"]).await.unwrap());
    }

    #[test]
    fn test_prepare_sqlite_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/nested/app.sqlite", dir.path().display());
        let prepared = prepare_sqlite_file(&url).unwrap();
        assert!(prepared.ends_with("?mode=rwc"));
        assert!(dir.path().join("nested").exists());
    }
}
