//! Migration Manager - creating and loading `.sql` migration files

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::definitions::{MigrationConfig, SqlMigration};
use crate::connection::Driver;
use crate::error::{ModelError, ModelResult};
use crate::schema::Schema;
use crate::support::snake_case;

/// File-system side of migrations
#[derive(Debug, Clone, Default)]
pub struct MigrationManager {
    config: MigrationConfig,
    driver: Driver,
}

impl MigrationManager {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(MigrationConfig {
            migrations_dir: migrations_dir.into(),
            ..MigrationConfig::default()
        })
    }

    pub fn with_config(config: MigrationConfig) -> Self {
        Self {
            config,
            driver: Driver::default(),
        }
    }

    /// Dialect used for generated create-table stubs
    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.driver = driver;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.config.migrations_dir
    }

    /// Write a new timestamped migration file and return its path
    pub fn create_migration(&self, name: &str, create_table: Option<&str>) -> ModelResult<PathBuf> {
        let name = snake_case(name.trim());
        if name.is_empty() {
            return Err(ModelError::Migration("migration name is empty".to_string()));
        }

        fs::create_dir_all(&self.config.migrations_dir)?;

        let stem = format!("{}_{}", Utc::now().format("%Y_%m_%d_%H%M%S"), name);
        let path = self.config.migrations_dir.join(format!("{}.sql", stem));
        if path.exists() {
            return Err(ModelError::Migration(format!(
                "migration {} already exists",
                path.display()
            )));
        }

        let template = match create_table {
            Some(table) => self.create_table_template(&stem, table)?,
            None => format!(
                "-- Migration: {}\n-- Created: {}\n\n-- UP\n\n\n-- DOWN\n\n",
                stem,
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ),
        };
        fs::write(&path, template)?;

        tracing::info!(migration = %stem, "Created migration");
        Ok(path)
    }

    fn create_table_template(&self, stem: &str, table: &str) -> ModelResult<String> {
        let mut up = Schema::new(self.driver);
        up.create(table, |t| {
            t.id();
            t.timestamps();
        })?;

        let mut down = Schema::new(self.driver);
        down.drop_if_exists(table);

        let join = |schema: Schema| -> ModelResult<String> {
            Ok(schema
                .into_statements()?
                .into_iter()
                .map(|s| format!("{};", s))
                .collect::<Vec<_>>()
                .join("\n"))
        };

        Ok(format!(
            "-- Migration: {}\n\n-- UP\n{}\n\n-- DOWN\n{}\n",
            stem,
            join(up)?,
            join(down)?
        ))
    }

    /// Every `.sql` file in the directory, sorted by name
    pub fn load_migrations(&self) -> ModelResult<Vec<SqlMigration>> {
        let dir = &self.config.migrations_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        paths.iter().map(|path| SqlMigration::from_file(path)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::Migration;

    #[test]
    fn test_create_plain_migration() {
        let dir = tempfile::tempdir().unwrap();
        let manager = MigrationManager::new(dir.path());

        let path = manager.create_migration("AddVotesToPosts", None).unwrap();
        let file = path.file_name().unwrap().to_str().unwrap();
        assert!(file.ends_with("_add_votes_to_posts.sql"));
        assert_eq!(file.len(), "2024_01_01_000000_add_votes_to_posts.sql".len());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("-- UP"));
        assert!(content.contains("-- DOWN"));
    }

    #[test]
    fn test_create_table_stub() {
        let dir = tempfile::tempdir().unwrap();
        let manager = MigrationManager::new(dir.path());
        manager.create_migration("create_flights_table", Some("flights")).unwrap();

        let migrations = manager.load_migrations().unwrap();
        assert_eq!(migrations.len(), 1);
        let up = migrations[0].up_statements();
        assert!(up[0].starts_with("CREATE TABLE \"flights\""));
        assert!(up[0].contains("\"created_at\""));
        assert_eq!(migrations[0].down_statements(), ["DROP TABLE IF EXISTS \"flights\""]);
    }

    #[test]
    fn test_load_sorted_and_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2024_02_01_000000_b.sql"), "-- UP\nSELECT 2;").unwrap();
        fs::write(dir.path().join("2024_01_01_000000_a.sql"), "-- UP\nSELECT 1;").unwrap();
        fs::write(dir.path().join("README.md"), "notes").unwrap();

        let names: Vec<String> = MigrationManager::new(dir.path())
            .load_migrations()
            .unwrap()
            .iter()
            .map(|m| m.name())
            .collect();
        assert_eq!(names, ["2024_01_01_000000_a", "2024_02_01_000000_b"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let manager = MigrationManager::new("/nonexistent/larix/migrations");
        assert!(manager.load_migrations().unwrap().is_empty());
    }
}
