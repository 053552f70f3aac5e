use super::{common_column_type, Grammar};
use crate::connection::Driver;
use crate::schema::{ColumnDefinition, ColumnType};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlGrammar;

impl Grammar for MySqlGrammar {
    fn driver(&self) -> Driver {
        Driver::MySql
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn compile_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, Some(offset)) => format!(" LIMIT 18446744073709551615 OFFSET {}", offset),
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (None, None) => String::new(),
        }
    }

    fn compile_aggregate(&self, function: &str, column: &str) -> String {
        let function = function.to_uppercase();
        let column = if column == "*" { "*".to_string() } else { self.wrap(column) };
        match function.as_str() {
            "SUM" | "AVG" => format!("CAST({}({}) AS DOUBLE) AS aggregate", function, column),
            _ => format!("{}({}) AS aggregate", function, column),
        }
    }

    fn compile_truncate(&self, table: &str) -> Vec<String> {
        vec![format!("TRUNCATE TABLE {}", self.wrap(table))]
    }

    fn column_type(&self, column: &ColumnDefinition) -> String {
        let base = match &column.column_type {
            ColumnType::Id => return "INT AUTO_INCREMENT PRIMARY KEY".to_string(),
            ColumnType::BigId => return "BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY".to_string(),
            ColumnType::Integer => "INT".to_string(),
            ColumnType::Boolean => "TINYINT(1)".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Float => "DOUBLE".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
            ColumnType::Json => "LONGTEXT".to_string(),
            ColumnType::Uuid => "CHAR(36)".to_string(),
            other => common_column_type(other).unwrap_or_else(|| "TEXT".to_string()),
        };
        if column.unsigned {
            format!("{} UNSIGNED", base)
        } else {
            base
        }
    }

    fn column_comment(&self, comment: &str) -> String {
        format!(" COMMENT '{}'", comment.replace('\'', "''"))
    }

    fn compile_drop_index(&self, table: &str, name: &str) -> String {
        format!("DROP INDEX {} ON {}", self.wrap_segment(name), self.wrap(table))
    }

    fn compile_rename(&self, from: &str, to: &str) -> String {
        format!("RENAME TABLE {} TO {}", self.wrap(from), self.wrap(to))
    }

    fn compile_drop_all_tables(&self, tables: &[String]) -> Vec<String> {
        let mut statements = vec!["SET FOREIGN_KEY_CHECKS = 0".to_string()];
        statements.extend(tables.iter().map(|t| self.compile_drop_if_exists(t)));
        statements.push("SET FOREIGN_KEY_CHECKS = 1".to_string());
        statements
    }

    fn compile_table_exists(&self, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT COUNT(*) AS aggregate FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?"
                .to_string(),
            vec![Value::String(table.to_string())],
        )
    }

    fn compile_column_listing(&self, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT column_name AS name FROM information_schema.columns WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
                .to_string(),
            vec![Value::String(table.to_string())],
        )
    }

    fn compile_table_listing(&self) -> String {
        "SELECT table_name AS name FROM information_schema.tables WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name"
            .to_string()
    }
}
