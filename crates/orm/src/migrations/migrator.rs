//! Migrator - runs migrations in batches and records them in the tracking table

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use super::definitions::*;
use super::manager::MigrationManager;
use crate::connection::{value_as_i64, Database, DbTransaction, Row};
use crate::error::{ModelError, ModelResult};

/// One row of the tracking table
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationRecord {
    pub migration: String,
    pub batch: i64,
    pub executed_at: Option<String>,
}

enum Bookkeeping {
    Record(i64),
    Forget,
}

pub struct Migrator {
    db: Database,
    table: String,
    migrations: Vec<Arc<dyn Migration>>,
}

impl Migrator {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            table: MigrationConfig::default().table,
            migrations: Vec::new(),
        }
    }

    /// Track migrations in a different table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Register a migration. A later migration with the same name replaces the earlier one.
    pub fn add(&mut self, migration: impl Migration + 'static) -> &mut Self {
        let migration: Arc<dyn Migration> = Arc::new(migration);
        let name = migration.name();
        self.migrations.retain(|m| m.name() != name);
        self.migrations.push(migration);
        self
    }

    /// Register every `.sql` migration in a directory
    pub fn load_directory(&mut self, dir: impl AsRef<Path>) -> ModelResult<usize> {
        let migrations = MigrationManager::new(dir.as_ref()).load_migrations()?;
        let count = migrations.len();
        for migration in migrations {
            self.add(migration);
        }
        Ok(count)
    }

    /// Registered migrations in name order
    pub fn migrations(&self) -> Vec<Arc<dyn Migration>> {
        let mut migrations = self.migrations.clone();
        migrations.sort_by_key(|m| m.name());
        migrations
    }

    fn find(&self, name: &str) -> Option<Arc<dyn Migration>> {
        self.migrations.iter().find(|m| m.name() == name).cloned()
    }

    /// Create the tracking table when missing
    pub async fn install(&self) -> ModelResult<()> {
        if self.db.has_table(&self.table).await? {
            return Ok(());
        }

        let mut schema = self.db.schema();
        schema.create_if_not_exists(&self.table, |t| {
            t.id();
            t.string("migration", 255).unique();
            t.integer("batch");
            t.string("executed_at", 32).nullable();
        })?;
        self.db.run_schema(schema).await
    }

    pub async fn records(&self) -> ModelResult<Vec<MigrationRecord>> {
        let rows = self
            .db
            .table(&self.table)
            .order_by("batch", "asc")
            .order_by("migration", "asc")
            .get(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| MigrationRecord {
                migration: row
                    .get("migration")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                batch: row.get("batch").and_then(value_as_i64).unwrap_or(0),
                executed_at: row
                    .get("executed_at")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
            .collect())
    }

    pub async fn last_batch(&self) -> ModelResult<i64> {
        let max = self.db.table(&self.table).max(&self.db, "batch").await?;
        Ok(max.as_ref().and_then(value_as_i64).unwrap_or(0))
    }

    /// Run pending migrations as one new batch
    pub async fn run(&self, options: MigrateOptions) -> ModelResult<MigrationRunResult> {
        self.install().await?;

        let executed: HashSet<String> = self
            .records()
            .await?
            .into_iter()
            .map(|r| r.migration)
            .collect();
        let mut pending: Vec<Arc<dyn Migration>> = self
            .migrations()
            .into_iter()
            .filter(|m| !executed.contains(&m.name()))
            .collect();
        if let Some(step) = options.step {
            pending.truncate(step);
        }

        let last_batch = self.last_batch().await?;
        if pending.is_empty() {
            tracing::info!("Nothing to migrate");
            return Ok(MigrationRunResult {
                batch: last_batch,
                ..MigrationRunResult::default()
            });
        }

        let batch = last_batch + 1;
        let mut result = MigrationRunResult {
            batch,
            ..MigrationRunResult::default()
        };

        for migration in pending {
            let name = migration.name();
            let mut schema = self.db.schema();
            migration.up(&mut schema)?;
            let statements = schema.into_statements()?;

            if options.pretend {
                result.sql.push((name, statements));
                continue;
            }

            self.apply(&name, &statements, Bookkeeping::Record(batch)).await?;
            tracing::info!(migration = %name, batch, "Migrated");
            result.applied.push(name);
        }

        Ok(result)
    }

    /// Undo the last `step` batches, newest migration first
    pub async fn rollback(&self, options: RollbackOptions) -> ModelResult<RollbackResult> {
        self.install().await?;

        let mut records = self.records().await?;
        records.sort_by(|a, b| {
            b.batch
                .cmp(&a.batch)
                .then_with(|| b.migration.cmp(&a.migration))
        });

        let batches: Vec<i64> = records
            .iter()
            .map(|r| r.batch)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .rev()
            .take(options.step.max(1))
            .collect();

        let selected: Vec<(MigrationRecord, Arc<dyn Migration>)> = records
            .into_iter()
            .filter(|r| batches.contains(&r.batch))
            .map(|r| match self.find(&r.migration) {
                Some(migration) => Ok((r, migration)),
                None => Err(ModelError::Migration(format!(
                    "migration not found: {}",
                    r.migration
                ))),
            })
            .collect::<ModelResult<_>>()?;

        let mut result = RollbackResult {
            batches,
            ..RollbackResult::default()
        };
        if selected.is_empty() {
            tracing::info!("Nothing to rollback");
            return Ok(result);
        }

        for (record, migration) in selected {
            let mut schema = self.db.schema();
            migration.down(&mut schema)?;
            let statements = schema.into_statements()?;

            if options.pretend {
                result.sql.push((record.migration, statements));
                continue;
            }

            self.apply(&record.migration, &statements, Bookkeeping::Forget)
                .await?;
            tracing::info!(migration = %record.migration, batch = record.batch, "Rolled back");
            result.rolled_back.push(record.migration);
        }

        Ok(result)
    }

    /// Roll back every batch
    pub async fn reset(&self) -> ModelResult<RollbackResult> {
        self.rollback(RollbackOptions {
            step: usize::MAX,
            pretend: false,
        })
        .await
    }

    pub async fn refresh(&self) -> ModelResult<(RollbackResult, MigrationRunResult)> {
        let rolled_back = self.reset().await?;
        let ran = self.run(MigrateOptions::default()).await?;
        Ok((rolled_back, ran))
    }

    /// Drop every table, the tracking table included, then migrate from scratch
    pub async fn fresh(&self) -> ModelResult<MigrationRunResult> {
        let tables = self.db.table_names().await?;
        if !tables.is_empty() {
            for statement in self.db.grammar().compile_drop_all_tables(&tables) {
                self.db.execute(&statement, &[]).await?;
            }
            tracing::info!(tables = tables.len(), "Dropped all tables");
        }
        self.run(MigrateOptions::default()).await
    }

    pub async fn status(&self, filter: StatusFilter) -> ModelResult<MigrationStatus> {
        self.install().await?;

        let records: HashMap<String, MigrationRecord> = self
            .records()
            .await?
            .into_iter()
            .map(|r| (r.migration.clone(), r))
            .collect();

        let mut names: BTreeSet<String> = self.migrations.iter().map(|m| m.name()).collect();
        names.extend(records.keys().cloned());

        let entries: Vec<MigrationStatusEntry> = names
            .into_iter()
            .map(|name| {
                let record = records.get(&name);
                MigrationStatusEntry {
                    batch: record.map(|r| r.batch),
                    executed_at: record.and_then(|r| r.executed_at.clone()),
                    name,
                }
            })
            .collect();

        let total = entries.len();
        let executed = entries.iter().filter(|e| e.is_executed()).count();
        let entries = entries
            .into_iter()
            .filter(|e| !(filter.pending_only && e.is_executed()))
            .filter(|e| !(filter.executed_only && !e.is_executed()))
            .collect();

        Ok(MigrationStatus {
            entries,
            total,
            executed,
            pending: total - executed,
        })
    }

    async fn apply(&self, name: &str, statements: &[String], bookkeeping: Bookkeeping) -> ModelResult<()> {
        let tx = self.db.begin().await?;
        match self.apply_in(&tx, name, statements, bookkeeping).await {
            Ok(()) => tx.commit().await,
            Err(error) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(migration = %name, error = %rollback, "Rollback after failed migration failed");
                }
                Err(ModelError::Migration(format!("{}: {}", name, error)))
            }
        }
    }

    async fn apply_in(
        &self,
        tx: &DbTransaction,
        name: &str,
        statements: &[String],
        bookkeeping: Bookkeeping,
    ) -> ModelResult<()> {
        for statement in statements {
            tx.execute(statement, &[]).await?;
        }

        let tracking = tx.table(&self.table);
        match bookkeeping {
            Bookkeeping::Record(batch) => {
                let mut row = Row::new();
                row.insert("migration".into(), json!(name));
                row.insert("batch".into(), json!(batch));
                row.insert(
                    "executed_at".into(),
                    json!(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
                );
                tracking.insert(tx, row).await?;
            }
            Bookkeeping::Forget => {
                tracking.where_eq("migration", name).delete(tx).await?;
            }
        }
        Ok(())
    }
}
