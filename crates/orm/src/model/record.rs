//! `Record<M>`: a model instance with persistence state

use std::ops::{Deref, DerefMut};

use chrono::Utc;
use serde::{Serialize, Serializer};
use serde_json::Value;

use super::{attributes_of, hydrate_model, is_fillable, Model, ModelExt, CREATED_AT, UPDATED_AT};
use crate::connection::{Executor, Row};
use crate::error::{ModelError, ModelResult};
use crate::query::QueryBuilder;

pub(crate) fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug, Clone)]
pub struct Record<M: Model> {
    model: M,
    original: Row,
    exists: bool,
}

impl<M: Model> Record<M> {
    /// Wrap an unsaved model
    pub fn new(model: M) -> Self {
        Self {
            model,
            original: Row::new(),
            exists: false,
        }
    }

    /// Hydrate a fetched row
    pub fn from_row(row: Row) -> ModelResult<Self> {
        let model = hydrate_model::<M>(row)?;
        let original = attributes_of(&model)?;
        Ok(Self {
            model,
            original,
            exists: true,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_inner(self) -> M {
        self.model
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn attributes(&self) -> ModelResult<Row> {
        attributes_of(&self.model)
    }

    pub fn original(&self) -> &Row {
        &self.original
    }

    /// Primary key value, if the record has one
    pub fn key(&self) -> ModelResult<Value> {
        self.attributes()?
            .remove(M::primary_key())
            .filter(|v| !v.is_null())
            .ok_or(ModelError::MissingPrimaryKey)
    }

    /// Attributes that differ from what was last loaded or saved
    pub fn get_dirty(&self) -> ModelResult<Row> {
        Ok(self
            .attributes()?
            .into_iter()
            .filter(|(column, value)| self.original.get(column) != Some(value))
            .collect())
    }

    pub fn is_dirty(&self, column: Option<&str>) -> ModelResult<bool> {
        let dirty = self.get_dirty()?;
        Ok(match column {
            Some(column) => dirty.contains_key(column),
            None => !dirty.is_empty(),
        })
    }

    pub fn is_clean(&self, column: Option<&str>) -> ModelResult<bool> {
        Ok(!self.is_dirty(column)?)
    }

    /// Mass-assign attributes. Keys that are not fillable are skipped.
    pub fn fill(&mut self, values: Row) -> ModelResult<&mut Self> {
        let mut attributes = self.attributes()?;
        for (column, value) in values {
            if is_fillable::<M>(&column) {
                attributes.insert(column, value);
            }
        }
        self.model = hydrate_model(attributes)?;
        Ok(self)
    }

    fn sync(&mut self, attributes: Row) -> ModelResult<()> {
        self.model = hydrate_model(attributes)?;
        self.original = self.attributes()?;
        Ok(())
    }

    fn key_query(&self, db: &dyn Executor) -> ModelResult<QueryBuilder<M>> {
        Ok(M::with_trashed(db).where_eq(M::primary_key(), self.key()?))
    }

    /// Insert a new record or update the dirty columns of an existing one
    pub async fn save(&mut self, db: &dyn Executor) -> ModelResult<()> {
        if self.exists {
            self.perform_update(db).await
        } else {
            self.perform_insert(db).await
        }
    }

    async fn perform_insert(&mut self, db: &dyn Executor) -> ModelResult<()> {
        self.model.creating()?;

        let mut attributes = self.attributes()?;
        let key = M::primary_key();
        if attributes.get(key).is_some_and(Value::is_null) {
            attributes.remove(key);
        }
        if M::uses_timestamps() {
            let now = Value::String(now_timestamp());
            for column in [CREATED_AT, UPDATED_AT] {
                if attributes.get(column).map_or(true, Value::is_null) {
                    attributes.insert(column.to_string(), now.clone());
                }
            }
        }

        let query = M::with_trashed(db);
        if attributes.contains_key(key) {
            query.insert(db, attributes.clone()).await?;
        } else {
            let id = query.insert_get_id_as(db, attributes.clone(), key).await?;
            attributes.insert(key.to_string(), Value::from(id));
        }

        self.exists = true;
        self.sync(attributes)?;
        tracing::debug!(table = %M::table_name(), "Created record");
        self.model.created();
        Ok(())
    }

    async fn perform_update(&mut self, db: &dyn Executor) -> ModelResult<()> {
        self.model.updating()?;

        let mut dirty = self.get_dirty()?;
        dirty.remove(M::primary_key());
        if dirty.is_empty() {
            return Ok(());
        }
        if M::uses_timestamps() {
            dirty.insert(UPDATED_AT.to_string(), Value::String(now_timestamp()));
        }

        self.key_query(db)?.update(db, dirty.clone()).await?;

        let mut attributes = self.attributes()?;
        attributes.extend(dirty);
        self.sync(attributes)?;
        self.model.updated();
        Ok(())
    }

    /// Soft delete when the model supports it, otherwise remove the row
    pub async fn delete(&mut self, db: &dyn Executor) -> ModelResult<()> {
        if !M::uses_soft_deletes() {
            return self.force_delete(db).await;
        }

        self.model.deleting()?;
        let now = Value::String(now_timestamp());
        let mut values = Row::new();
        values.insert(M::deleted_at_column().to_string(), now);
        self.key_query(db)?.update(db, values.clone()).await?;

        let mut attributes = self.attributes()?;
        attributes.extend(values);
        self.sync(attributes)?;
        self.model.deleted();
        Ok(())
    }

    pub async fn force_delete(&mut self, db: &dyn Executor) -> ModelResult<()> {
        self.model.deleting()?;
        self.key_query(db)?.delete(db).await?;
        self.exists = false;
        self.model.deleted();
        Ok(())
    }

    /// Clear the soft-delete marker
    pub async fn restore(&mut self, db: &dyn Executor) -> ModelResult<()> {
        if !M::uses_soft_deletes() {
            return Ok(());
        }
        let mut values = Row::new();
        values.insert(M::deleted_at_column().to_string(), Value::Null);
        self.key_query(db)?.update(db, values.clone()).await?;

        let mut attributes = self.attributes()?;
        attributes.extend(values);
        self.sync(attributes)
    }

    pub fn trashed(&self) -> bool {
        M::uses_soft_deletes()
            && self
                .attributes()
                .ok()
                .and_then(|a| a.get(M::deleted_at_column()).cloned())
                .is_some_and(|v| !v.is_null())
    }

    /// Reload attributes from the database
    pub async fn refresh(&mut self, db: &dyn Executor) -> ModelResult<()> {
        let fresh = self
            .key_query(db)?
            .first(db)
            .await?
            .ok_or_else(|| ModelError::NotFound(M::table_name()))?;
        self.model = fresh.model;
        self.original = fresh.original;
        Ok(())
    }

    /// Attributes without the hidden ones
    pub fn to_json(&self) -> ModelResult<Value> {
        let mut attributes = self.attributes()?;
        for hidden in M::hidden() {
            attributes.remove(hidden);
        }
        Ok(Value::Object(attributes))
    }
}

impl<M: Model> Deref for Record<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.model
    }
}

impl<M: Model> DerefMut for Record<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.model
    }
}

impl<M: Model> Serialize for Record<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}
