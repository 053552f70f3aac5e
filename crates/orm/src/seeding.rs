//! Database seeders

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::Database;
use crate::error::{ModelError, ModelResult};
use crate::support::short_type_name;

#[async_trait]
pub trait Seeder: Send + Sync {
    fn name(&self) -> String {
        short_type_name::<Self>().to_string()
    }

    /// Nested seeders run through `runner.call`
    async fn run(&self, db: &Database, runner: &SeederRunner) -> ModelResult<()>;
}

/// Seeders by name, in registration order
#[derive(Default, Clone)]
pub struct SeederRunner {
    seeders: Vec<(String, Arc<dyn Seeder>)>,
}

impl SeederRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a seeder. A seeder with the same name is replaced in place.
    pub fn register(&mut self, seeder: impl Seeder + 'static) -> &mut Self {
        let seeder: Arc<dyn Seeder> = Arc::new(seeder);
        let name = seeder.name();
        match self.seeders.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = seeder,
            None => self.seeders.push((name, seeder)),
        }
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.seeders.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.seeders.iter().map(|(n, _)| n.clone()).collect()
    }

    pub async fn run(&self, db: &Database, name: &str) -> ModelResult<()> {
        let seeder = self
            .seeders
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| ModelError::Seeder(format!("seeder not found: {}", name)))?;

        let started = std::time::Instant::now();
        seeder.run(db, self).await?;
        tracing::info!(
            seeder = %name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Seeded"
        );
        Ok(())
    }

    /// Run every seeder in registration order
    pub async fn run_all(&self, db: &Database) -> ModelResult<Vec<String>> {
        let names = self.names();
        for name in &names {
            self.run(db, name).await?;
        }
        Ok(names)
    }

    /// Run another seeder from inside a seeder
    pub async fn call(&self, db: &Database, name: &str) -> ModelResult<()> {
        self.run(db, name).await
    }
}
