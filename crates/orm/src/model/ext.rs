use async_trait::async_trait;
use serde_json::Value;

use super::{is_fillable, Model, Record};
use crate::connection::{Executor, Row};
use crate::error::{ModelError, ModelResult};
use crate::query::QueryBuilder;

/// Static query helpers available on every [`Model`]
#[async_trait]
pub trait ModelExt: Model {
    /// Builder over the model's table, trashed rows excluded
    fn query(db: &dyn Executor) -> QueryBuilder<Self> {
        let query = Self::with_trashed(db);
        if Self::uses_soft_deletes() {
            query.where_null(&qualified_deleted_at::<Self>())
        } else {
            query
        }
    }

    fn with_trashed(db: &dyn Executor) -> QueryBuilder<Self> {
        QueryBuilder::<Self>::table(&Self::table_name()).with_driver(db.driver())
    }

    fn only_trashed(db: &dyn Executor) -> QueryBuilder<Self> {
        Self::with_trashed(db).where_not_null(&qualified_deleted_at::<Self>())
    }

    async fn all(db: &dyn Executor) -> ModelResult<Vec<Record<Self>>> {
        Self::query(db).get(db).await
    }

    async fn find<K>(db: &dyn Executor, id: K) -> ModelResult<Option<Record<Self>>>
    where
        K: Into<Value> + Send,
    {
        Self::query(db)
            .where_eq(Self::primary_key(), id)
            .first(db)
            .await
    }

    async fn find_or_fail<K>(db: &dyn Executor, id: K) -> ModelResult<Record<Self>>
    where
        K: Into<Value> + Send,
    {
        Self::find(db, id)
            .await?
            .ok_or_else(|| ModelError::NotFound(Self::table_name()))
    }

    /// Mass-assign and insert
    async fn create(db: &dyn Executor, attributes: Row) -> ModelResult<Record<Self>> {
        let attributes: Row = attributes
            .into_iter()
            .filter(|(column, _)| is_fillable::<Self>(column))
            .collect();
        let model = super::hydrate_model::<Self>(attributes)?;
        let mut record = Record::new(model);
        record.save(db).await?;
        Ok(record)
    }

    /// Delete by key through each record, so hooks and soft deletes apply
    async fn destroy(db: &dyn Executor, ids: Vec<Value>) -> ModelResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut deleted = 0;
        for mut record in Self::query(db).where_in(Self::primary_key(), ids).get(db).await? {
            record.delete(db).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

impl<M: Model> ModelExt for M {}

fn qualified_deleted_at<M: Model>() -> String {
    format!("{}.{}", M::table_name(), M::deleted_at_column())
}
