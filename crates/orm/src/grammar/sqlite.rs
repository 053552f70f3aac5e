use super::{common_column_type, Grammar};
use crate::connection::Driver;
use crate::error::{ModelError, ModelResult};
use crate::schema::{ColumnDefinition, ColumnType, ForeignKeyBuilder};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGrammar;

impl Grammar for SqliteGrammar {
    fn driver(&self) -> Driver {
        Driver::Sqlite
    }

    fn compile_truncate(&self, table: &str) -> Vec<String> {
        vec![format!("DELETE FROM {}", self.wrap(table))]
    }

    fn column_type(&self, column: &ColumnDefinition) -> String {
        if let Some(common) = common_column_type(&column.column_type) {
            return common;
        }
        match column.column_type {
            ColumnType::Id | ColumnType::BigId => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
            ColumnType::Json => "TEXT".to_string(),
            ColumnType::Uuid => "VARCHAR(36)".to_string(),
            _ => "TEXT".to_string(),
        }
    }

    fn compile_add_primary(&self, table: &str, _columns: &[String]) -> ModelResult<String> {
        Err(ModelError::Schema(format!(
            "sqlite cannot add a primary key to existing table '{}'",
            table
        )))
    }

    fn compile_add_foreign_key(&self, table: &str, key: &ForeignKeyBuilder) -> ModelResult<String> {
        Err(ModelError::Schema(format!(
            "sqlite cannot add foreign key '{}' to existing table '{}'",
            key.column, table
        )))
    }

    fn compile_drop_all_tables(&self, tables: &[String]) -> Vec<String> {
        let mut statements = vec!["PRAGMA foreign_keys = OFF".to_string()];
        statements.extend(tables.iter().map(|t| self.compile_drop_if_exists(t)));
        statements.push("PRAGMA foreign_keys = ON".to_string());
        statements
    }

    fn compile_table_exists(&self, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT COUNT(*) AS aggregate FROM sqlite_master WHERE type = 'table' AND name = ?"
                .to_string(),
            vec![Value::String(table.to_string())],
        )
    }

    fn compile_column_listing(&self, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT name FROM pragma_table_info(?) ORDER BY cid".to_string(),
            vec![Value::String(table.to_string())],
        )
    }

    fn compile_table_listing(&self) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            .to_string()
    }
}
