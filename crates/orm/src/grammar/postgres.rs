use super::{common_column_type, Grammar};
use crate::connection::Driver;
use crate::error::ModelResult;
use crate::schema::{ColumnDefinition, ColumnType};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl Grammar for PostgresGrammar {
    fn driver(&self) -> Driver {
        Driver::Postgres
    }

    fn operator_sql(&self, operator: &str) -> String {
        operator.to_uppercase()
    }

    fn compile_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    // NUMERIC results cannot be decoded through the Any driver
    fn compile_aggregate(&self, function: &str, column: &str) -> String {
        let function = function.to_uppercase();
        let column = if column == "*" { "*".to_string() } else { self.wrap(column) };
        match function.as_str() {
            "SUM" | "AVG" => format!("CAST({}({}) AS DOUBLE PRECISION) AS aggregate", function, column),
            _ => format!("{}({}) AS aggregate", function, column),
        }
    }

    fn compile_insert_get_id(
        &self,
        table: &str,
        columns: &[String],
        values: &[Value],
        key: &str,
    ) -> ModelResult<(String, Vec<Value>)> {
        let (sql, bindings) = self.compile_insert(table, columns, &[values.to_vec()])?;
        Ok((format!("{} RETURNING {}", sql, self.wrap(key)), bindings))
    }

    fn compile_truncate(&self, table: &str) -> Vec<String> {
        vec![format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", self.wrap(table))]
    }

    fn column_type(&self, column: &ColumnDefinition) -> String {
        if let Some(common) = common_column_type(&column.column_type) {
            return common;
        }
        match column.column_type {
            ColumnType::Id => "SERIAL PRIMARY KEY".to_string(),
            ColumnType::BigId => "BIGSERIAL PRIMARY KEY".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::DateTime => "TIMESTAMP".to_string(),
            ColumnType::Float => "DOUBLE PRECISION".to_string(),
            ColumnType::Binary => "BYTEA".to_string(),
            ColumnType::Json => "TEXT".to_string(),
            ColumnType::Uuid => "VARCHAR(36)".to_string(),
            _ => "TEXT".to_string(),
        }
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "TRUE".to_string() } else { "FALSE".to_string() }
    }

    fn compile_drop_all_tables(&self, tables: &[String]) -> Vec<String> {
        if tables.is_empty() {
            return Vec::new();
        }
        vec![format!(
            "DROP TABLE IF EXISTS {} CASCADE",
            self.wrap_columns(tables)
        )]
    }

    fn compile_table_exists(&self, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT COUNT(*) AS aggregate FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1"
                .to_string(),
            vec![Value::String(table.to_string())],
        )
    }

    fn compile_column_listing(&self, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT column_name::text AS name FROM information_schema.columns WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position"
                .to_string(),
            vec![Value::String(table.to_string())],
        )
    }

    fn compile_table_listing(&self) -> String {
        "SELECT table_name::text AS name FROM information_schema.tables WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' ORDER BY table_name"
            .to_string()
    }
}
