//! Schema building: `Schema` collects DDL statements from blueprints

mod blueprint;
mod column;
mod foreign;

pub use blueprint::{Blueprint, BlueprintCommand, IndexDefinition, IndexKind};
pub use column::{ColumnDefault, ColumnDefinition, ColumnType, ForeignAction};
pub use foreign::ForeignKeyBuilder;

use crate::connection::Driver;
use crate::error::ModelResult;
use crate::grammar::{grammar_for, Grammar};

/// Ordered list of DDL statements for one dialect
#[derive(Debug, Clone)]
pub struct Schema {
    driver: Driver,
    statements: Vec<String>,
}

impl Schema {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            statements: Vec::new(),
        }
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    fn grammar(&self) -> &'static dyn Grammar {
        grammar_for(self.driver)
    }

    pub fn create<F>(&mut self, table: &str, build: F) -> ModelResult<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        let mut blueprint = Blueprint::new(table);
        build(&mut blueprint);
        let statements = self.grammar().compile_create(&blueprint)?;
        self.statements.extend(statements);
        Ok(())
    }

    pub fn create_if_not_exists<F>(&mut self, table: &str, build: F) -> ModelResult<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        self.create(table, |blueprint| {
            blueprint.if_not_exists = true;
            build(blueprint);
        })
    }

    /// Alter an existing table
    pub fn table<F>(&mut self, table: &str, build: F) -> ModelResult<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        let mut blueprint = Blueprint::new(table);
        build(&mut blueprint);
        let statements = self.grammar().compile_alter(&blueprint)?;
        self.statements.extend(statements);
        Ok(())
    }

    pub fn drop(&mut self, table: &str) {
        let sql = self.grammar().compile_drop(table);
        self.statements.push(sql);
    }

    pub fn drop_if_exists(&mut self, table: &str) {
        let sql = self.grammar().compile_drop_if_exists(table);
        self.statements.push(sql);
    }

    pub fn rename(&mut self, from: &str, to: &str) {
        let sql = self.grammar().compile_rename(from, to);
        self.statements.push(sql);
    }

    pub fn raw(&mut self, sql: impl Into<String>) {
        self.statements.push(sql.into());
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn into_statements(self) -> ModelResult<Vec<String>> {
        Ok(self.statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    #[test]
    fn test_schema_collects_statements() {
        let mut schema = Schema::new(Driver::Sqlite);
        schema
            .create("users", |t| {
                t.id();
                t.string("email", 255).unique();
                t.timestamps();
            })
            .unwrap();
        schema.rename("users", "members");
        schema.drop_if_exists("legacy");
        schema.raw("CREATE VIEW active AS SELECT 1");

        let statements = schema.statements();
        assert_eq!(statements.len(), 4);
        assert!(statements[0].starts_with("CREATE TABLE \"users\""));
        assert!(statements[0].contains("\"email\" VARCHAR(255) NOT NULL UNIQUE"));
        assert!(statements[0].contains("\"created_at\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP"));
        assert_eq!(statements[1], "ALTER TABLE \"users\" RENAME TO \"members\"");
        assert_eq!(statements[2], "DROP TABLE IF EXISTS \"legacy\"");
    }

    #[tokio::test]
    async fn test_schema_runs_against_sqlite() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let mut schema = db.schema();
        schema
            .create("posts", |t| {
                t.id();
                t.string("title", 200);
                t.text("body").nullable();
                t.boolean("published").default(false);
                t.json("meta").nullable();
                t.timestamps();
                t.soft_deletes();
                t.index(&["title"], None);
            })
            .unwrap();
        db.run_schema(schema).await.unwrap();

        assert!(db.has_table("posts").await.unwrap());
        assert!(db.has_columns("posts", &["id", "title", "deleted_at"]).await.unwrap());

        let mut alter = db.schema();
        alter
            .table("posts", |t| {
                t.integer("views").default(0);
                t.rename_column("body", "content");
            })
            .unwrap();
        db.run_schema(alter).await.unwrap();
        assert!(db.has_column("posts", "views").await.unwrap());
        assert!(db.has_column("posts", "content").await.unwrap());
        assert!(!db.has_column("posts", "body").await.unwrap());
    }
}
