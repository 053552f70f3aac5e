//! Migration Definitions - the `Migration` trait and the types the migrator reports

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::schema::Schema;

/// A reversible schema change
pub trait Migration: Send + Sync {
    /// Unique name, ordered lexically (timestamp-prefixed)
    fn name(&self) -> String;

    fn up(&self, schema: &mut Schema) -> ModelResult<()>;

    fn down(&self, schema: &mut Schema) -> ModelResult<()>;
}

/// A migration read from a `.sql` file with `-- UP` and `-- DOWN` sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    name: String,
    up: Vec<String>,
    down: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Up,
    Down,
}

impl SqlMigration {
    /// Parse migration text. Anything before the first marker belongs to UP.
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let mut up = String::new();
        let mut down = String::new();
        let mut section = Section::Up;

        for line in content.lines() {
            let trimmed = line.trim();
            let lowered = trimmed.to_lowercase();
            if let Some(marker) = lowered.strip_prefix("--") {
                match marker.trim() {
                    "up" => section = Section::Up,
                    "down" => section = Section::Down,
                    _ => {}
                }
                continue;
            }
            if trimmed.is_empty() {
                continue;
            }

            let target = if section == Section::Up { &mut up } else { &mut down };
            target.push_str(line);
            target.push('\n');
        }

        Self {
            name: name.into(),
            up: split_statements(&up),
            down: split_statements(&down),
        }
    }

    pub fn from_file(path: &Path) -> ModelResult<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ModelError::Migration(format!("invalid migration filename: {}", path.display()))
            })?;
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(name, &content))
    }

    pub fn up_statements(&self) -> &[String] {
        &self.up
    }

    pub fn down_statements(&self) -> &[String] {
        &self.down
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn up(&self, schema: &mut Schema) -> ModelResult<()> {
        self.up.iter().for_each(|statement| schema.raw(statement.as_str()));
        Ok(())
    }

    fn down(&self, schema: &mut Schema) -> ModelResult<()> {
        self.down.iter().for_each(|statement| schema.raw(statement.as_str()));
        Ok(())
    }
}

/// Split on `;` at the end of a line
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
        if line.trim_end().ends_with(';') {
            let statement = current.trim().trim_end_matches(';').trim().to_string();
            if !statement.is_empty() {
                statements.push(statement);
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }
    statements
}

/// Where migration files live and which table tracks them
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub migrations_dir: PathBuf,
    pub table: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("database/migrations"),
            table: "migrations".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Run at most this many pending migrations
    pub step: Option<usize>,
    /// Collect the SQL without executing it
    pub pretend: bool,
}

#[derive(Debug, Clone)]
pub struct RollbackOptions {
    /// Number of batches to undo
    pub step: usize,
    pub pretend: bool,
}

impl Default for RollbackOptions {
    fn default() -> Self {
        Self {
            step: 1,
            pretend: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusFilter {
    pub pending_only: bool,
    pub executed_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationRunResult {
    pub applied: Vec<String>,
    pub batch: i64,
    /// Statements per migration, filled in pretend mode
    pub sql: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub rolled_back: Vec<String>,
    pub batches: Vec<i64>,
    pub sql: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatusEntry {
    pub name: String,
    pub batch: Option<i64>,
    pub executed_at: Option<String>,
}

impl MigrationStatusEntry {
    pub fn is_executed(&self) -> bool {
        self.batch.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub entries: Vec<MigrationStatusEntry>,
    pub total: usize,
    pub executed: usize,
    pub pending: usize,
}
