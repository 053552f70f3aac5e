//! Model factories: generate attribute maps, models and persisted records

mod fake;

pub use fake::Fake;

use std::collections::HashMap;

use crate::connection::{Executor, Row};
use crate::error::{ModelError, ModelResult};
use crate::model::{hydrate_model, Model, Record};

type Definition = Box<dyn Fn(&mut Fake) -> Row + Send + Sync>;
type StateFn = Box<dyn Fn(&mut Row, &mut Fake) + Send + Sync>;
type AfterMaking<M> = Box<dyn Fn(&mut M) + Send + Sync>;
type AfterCreating<M> = Box<dyn Fn(&Record<M>) + Send + Sync>;

pub struct Factory<M: Model> {
    definition: Definition,
    states: HashMap<String, StateFn>,
    applied: Vec<String>,
    count: usize,
    overrides: Row,
    after_making: Vec<AfterMaking<M>>,
    after_creating: Vec<AfterCreating<M>>,
    fake: Fake,
}

impl<M: Model> Factory<M> {
    pub fn new<F>(definition: F) -> Self
    where
        F: Fn(&mut Fake) -> Row + Send + Sync + 'static,
    {
        Self {
            definition: Box::new(definition),
            states: HashMap::new(),
            applied: Vec::new(),
            count: 1,
            overrides: Row::new(),
            after_making: Vec::new(),
            after_creating: Vec::new(),
            fake: Fake::new(),
        }
    }

    /// Reproducible output
    pub fn seed(mut self, seed: u64) -> Self {
        self.fake = Fake::seeded(seed);
        self
    }

    /// Register a named state
    pub fn define_state<F>(mut self, name: &str, state: F) -> Self
    where
        F: Fn(&mut Row, &mut Fake) + Send + Sync + 'static,
    {
        self.states.insert(name.to_string(), Box::new(state));
        self
    }

    /// Apply a registered state to everything this factory builds
    pub fn state(mut self, name: &str) -> Self {
        self.applied.push(name.to_string());
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Attributes that win over the definition and states
    pub fn with(mut self, overrides: Row) -> Self {
        self.overrides.extend(overrides);
        self
    }

    pub fn after_making<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut M) + Send + Sync + 'static,
    {
        self.after_making.push(Box::new(callback));
        self
    }

    pub fn after_creating<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Record<M>) + Send + Sync + 'static,
    {
        self.after_creating.push(Box::new(callback));
        self
    }

    fn raw_one(&mut self) -> ModelResult<Row> {
        let mut row = (self.definition)(&mut self.fake);
        for name in &self.applied {
            let state = self.states.get(name).ok_or_else(|| {
                ModelError::Factory(format!("unknown factory state '{}'", name))
            })?;
            state(&mut row, &mut self.fake);
        }
        row.extend(self.overrides.clone());
        Ok(row)
    }

    pub fn raw(&mut self) -> ModelResult<Vec<Row>> {
        (0..self.count).map(|_| self.raw_one()).collect()
    }

    /// Build models without saving them
    pub fn make(&mut self) -> ModelResult<Vec<M>> {
        self.raw()?
            .into_iter()
            .map(|row| {
                let mut model = hydrate_model::<M>(row)?;
                for callback in &self.after_making {
                    callback(&mut model);
                }
                Ok(model)
            })
            .collect()
    }

    pub fn make_one(&mut self) -> ModelResult<M> {
        let row = self.raw_one()?;
        let mut model = hydrate_model::<M>(row)?;
        for callback in &self.after_making {
            callback(&mut model);
        }
        Ok(model)
    }

    pub async fn create(&mut self, db: &dyn Executor) -> ModelResult<Vec<Record<M>>> {
        let mut records = Vec::with_capacity(self.count);
        for model in self.make()? {
            records.push(self.persist(db, model).await?);
        }
        tracing::debug!(table = %M::table_name(), count = records.len(), "Factory created records");
        Ok(records)
    }

    pub async fn create_one(&mut self, db: &dyn Executor) -> ModelResult<Record<M>> {
        let model = self.make_one()?;
        self.persist(db, model).await
    }

    async fn persist(&self, db: &dyn Executor, model: M) -> ModelResult<Record<M>> {
        let mut record = Record::new(model);
        record.save(db).await?;
        for callback in &self.after_creating {
            callback(&record);
        }
        Ok(record)
    }
}
