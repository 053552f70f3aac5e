//! SQL dialects
//!
//! A [`Grammar`] turns query components and blueprints into SQL text for one
//! backend. Most of the compilation lives in default methods; each dialect
//! overrides quoting, placeholders, column types and catalogue queries.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;
pub use sqlite::SqliteGrammar;

use crate::connection::Driver;
use crate::error::{ModelError, ModelResult};
use crate::query::types::{QueryComponents, UpdateValue, WhereClause};
use crate::schema::{
    Blueprint, BlueprintCommand, ColumnDefault, ColumnDefinition, ColumnType, ForeignKeyBuilder,
    IndexDefinition, IndexKind,
};
use serde_json::Value;
use std::fmt::Debug;

static SQLITE: SqliteGrammar = SqliteGrammar;
static POSTGRES: PostgresGrammar = PostgresGrammar;
static MYSQL: MySqlGrammar = MySqlGrammar;

/// Grammar for a driver
pub fn grammar_for(driver: Driver) -> &'static dyn Grammar {
    match driver {
        Driver::Sqlite => &SQLITE,
        Driver::Postgres => &POSTGRES,
        Driver::MySql => &MYSQL,
    }
}

/// Placeholder for the `index`-th binding, starting at 1
pub fn placeholder_for(driver: Driver, index: usize) -> String {
    match driver {
        Driver::Postgres => format!("${}", index),
        Driver::Sqlite | Driver::MySql => "?".to_string(),
    }
}

/// Collects bound values while a statement is compiled
#[derive(Debug)]
pub struct Bindings {
    driver: Driver,
    values: Vec<Value>,
}

impl Bindings {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            values: Vec::new(),
        }
    }

    /// Placeholder for `value`, or an inline `NULL`
    pub fn push(&mut self, value: &Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.values.push(value.clone());
        placeholder_for(self.driver, self.values.len())
    }

    /// Renumber the `?` markers of a raw fragment
    pub fn raw(&mut self, sql: &str, bindings: &[Value]) -> ModelResult<String> {
        let mut out = String::with_capacity(sql.len());
        let mut values = bindings.iter();
        for c in sql.chars() {
            if c == '?' {
                let value = values.next().ok_or_else(|| {
                    ModelError::Query(format!("not enough bindings for raw fragment '{}'", sql))
                })?;
                out.push_str(&self.push(value));
            } else {
                out.push(c);
            }
        }
        if values.next().is_some() {
            return Err(ModelError::Query(format!(
                "too many bindings for raw fragment '{}'",
                sql
            )));
        }
        Ok(out)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

pub trait Grammar: Send + Sync + Debug {
    fn driver(&self) -> Driver;

    fn quote_char(&self) -> char {
        '"'
    }

    /// Placeholder for the `index`-th binding, starting at 1
    fn placeholder(&self, index: usize) -> String {
        placeholder_for(self.driver(), index)
    }

    fn wrap_segment(&self, segment: &str) -> String {
        if segment == "*" {
            return segment.to_string();
        }
        let q = self.quote_char();
        let escaped = segment.replace(q, &format!("{}{}", q, q));
        format!("{}{}{}", q, escaped, q)
    }

    /// Quote an identifier. Handles `table.column`, `*`, `x as y` and
    /// leaves expressions containing parentheses untouched.
    fn wrap(&self, value: &str) -> String {
        let value = value.trim();
        if value.contains('(') {
            return value.to_string();
        }
        // ascii lowering keeps byte offsets valid for slicing `value`
        let lower = value.to_ascii_lowercase();
        if let Some(idx) = lower.find(" as ") {
            let (left, right) = (&value[..idx], &value[idx + 4..]);
            return format!("{} AS {}", self.wrap(left), self.wrap_segment(right.trim()));
        }
        value
            .split('.')
            .map(|segment| self.wrap_segment(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn wrap_columns(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.wrap(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// SQL spelling of a validated operator
    fn operator_sql(&self, operator: &str) -> String {
        match operator {
            "ilike" => "LIKE".to_string(),
            other => other.to_uppercase(),
        }
    }

    fn compile_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET {}", offset),
            (None, None) => String::new(),
        }
    }

    /// `FUNC(column) AS aggregate`
    fn compile_aggregate(&self, function: &str, column: &str) -> String {
        let column = if column == "*" { "*".to_string() } else { self.wrap(column) };
        format!("{}({}) AS aggregate", function.to_uppercase(), column)
    }

    fn compile_wheres(
        &self,
        wheres: &[WhereClause],
        bindings: &mut Bindings,
    ) -> ModelResult<String> {
        if wheres.is_empty() {
            return Ok(String::new());
        }

        let mut sql = String::from(" WHERE ");
        for (i, clause) in wheres.iter().enumerate() {
            if i > 0 {
                sql.push(' ');
                sql.push_str(clause.boolean().as_sql());
                sql.push(' ');
            }
            let fragment = match clause {
                WhereClause::Basic {
                    column,
                    operator,
                    value,
                    ..
                } => match (operator.as_str(), value.is_null()) {
                    ("=", true) => format!("{} IS NULL", self.wrap(column)),
                    ("!=" | "<>", true) => format!("{} IS NOT NULL", self.wrap(column)),
                    _ => format!(
                        "{} {} {}",
                        self.wrap(column),
                        self.operator_sql(operator),
                        bindings.push(value)
                    ),
                },
                WhereClause::In {
                    column,
                    values,
                    negated,
                    ..
                } => {
                    if values.is_empty() {
                        if *negated { "1 = 1".to_string() } else { "0 = 1".to_string() }
                    } else {
                        let placeholders = values
                            .iter()
                            .map(|v| bindings.push(v))
                            .collect::<Vec<_>>()
                            .join(", ");
                        format!(
                            "{} {}IN ({})",
                            self.wrap(column),
                            if *negated { "NOT " } else { "" },
                            placeholders
                        )
                    }
                }
                WhereClause::Null {
                    column, negated, ..
                } => format!(
                    "{} IS {}NULL",
                    self.wrap(column),
                    if *negated { "NOT " } else { "" }
                ),
                WhereClause::Between {
                    column,
                    low,
                    high,
                    negated,
                    ..
                } => format!(
                    "{} {}BETWEEN {} AND {}",
                    self.wrap(column),
                    if *negated { "NOT " } else { "" },
                    bindings.push(low),
                    bindings.push(high)
                ),
                WhereClause::Raw {
                    sql: raw, bindings: raw_bindings, ..
                } => format!("({})", bindings.raw(raw, raw_bindings)?),
            };
            sql.push_str(&fragment);
        }
        Ok(sql)
    }

    fn compile_select(&self, query: &QueryComponents) -> ModelResult<(String, Vec<Value>)> {
        if query.table.trim().is_empty() {
            return Err(ModelError::Query("no table selected".to_string()));
        }

        let mut bindings = Bindings::new(self.driver());
        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        if query.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.wrap_columns(&query.columns));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.wrap(&query.table));

        for join in &query.joins {
            sql.push(' ');
            sql.push_str(join.join_type.as_sql());
            sql.push(' ');
            sql.push_str(&self.wrap(&join.table));
            if join.join_type != crate::query::types::JoinType::Cross {
                sql.push_str(&format!(
                    " ON {} {} {}",
                    self.wrap(&join.first),
                    join.operator,
                    self.wrap(&join.second)
                ));
            }
        }

        sql.push_str(&self.compile_wheres(&query.wheres, &mut bindings)?);

        if !query.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.wrap_columns(&query.groups));
        }

        if !query.havings.is_empty() {
            let havings = query
                .havings
                .iter()
                .map(|h| {
                    format!(
                        "{} {} {}",
                        self.wrap(&h.column),
                        self.operator_sql(&h.operator),
                        bindings.push(&h.value)
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(" HAVING ");
            sql.push_str(&havings);
        }

        if !query.orders.is_empty() {
            let orders = query
                .orders
                .iter()
                .map(|(column, direction)| format!("{} {}", self.wrap(column), direction.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders);
        }

        sql.push_str(&self.compile_limit_offset(query.limit, query.offset));
        Ok((sql, bindings.into_values()))
    }

    /// Multi-row insert. Rows must already be aligned with `columns`.
    fn compile_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> ModelResult<(String, Vec<Value>)> {
        if columns.is_empty() || rows.is_empty() {
            return Err(ModelError::Query(format!("nothing to insert into '{}'", table)));
        }

        let mut bindings = Bindings::new(self.driver());
        let values = rows
            .iter()
            .map(|row| {
                let placeholders = row
                    .iter()
                    .map(|v| bindings.push(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", placeholders)
            })
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.wrap(table),
            self.wrap_columns(columns),
            values
        );
        Ok((sql, bindings.into_values()))
    }

    fn compile_insert_get_id(
        &self,
        table: &str,
        columns: &[String],
        values: &[Value],
        key: &str,
    ) -> ModelResult<(String, Vec<Value>)> {
        let _ = key;
        self.compile_insert(table, columns, &[values.to_vec()])
    }

    fn compile_update(
        &self,
        query: &QueryComponents,
        values: &[(String, UpdateValue)],
    ) -> ModelResult<(String, Vec<Value>)> {
        if values.is_empty() {
            return Err(ModelError::Query("update without columns".to_string()));
        }

        let mut bindings = Bindings::new(self.driver());
        let sets = values
            .iter()
            .map(|(column, value)| match value {
                UpdateValue::Value(value) => {
                    format!("{} = {}", self.wrap(column), bindings.push(value))
                }
                UpdateValue::Increment(amount) => format!(
                    "{} = {} + {}",
                    self.wrap(column),
                    self.wrap(column),
                    bindings.push(amount)
                ),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let wheres = self.compile_wheres(&query.wheres, &mut bindings)?;
        let sql = format!("UPDATE {} SET {}{}", self.wrap(&query.table), sets, wheres);
        Ok((sql, bindings.into_values()))
    }

    fn compile_delete(&self, query: &QueryComponents) -> ModelResult<(String, Vec<Value>)> {
        let mut bindings = Bindings::new(self.driver());
        let wheres = self.compile_wheres(&query.wheres, &mut bindings)?;
        let sql = format!("DELETE FROM {}{}", self.wrap(&query.table), wheres);
        Ok((sql, bindings.into_values()))
    }

    fn compile_truncate(&self, table: &str) -> Vec<String>;

    // Schema

    fn column_type(&self, column: &ColumnDefinition) -> String;

    fn bool_literal(&self, value: bool) -> String {
        if value { "1".to_string() } else { "0".to_string() }
    }

    fn default_literal(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::Raw(sql) => sql.clone(),
            ColumnDefault::Value(Value::Null) => "NULL".to_string(),
            ColumnDefault::Value(Value::Bool(b)) => self.bool_literal(*b),
            ColumnDefault::Value(Value::Number(n)) => n.to_string(),
            ColumnDefault::Value(Value::String(s)) => format!("'{}'", s.replace('\'', "''")),
            ColumnDefault::Value(other) => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }

    /// Trailing column comment, only some dialects support it
    fn column_comment(&self, comment: &str) -> String {
        let _ = comment;
        String::new()
    }

    fn compile_column(&self, column: &ColumnDefinition) -> String {
        let mut sql = format!("{} {}", self.wrap(&column.name), self.column_type(column));
        if column.column_type.is_auto_increment() {
            return sql;
        }
        if column.primary {
            sql.push_str(" PRIMARY KEY");
        }
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_literal(default));
        }
        if column.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(comment) = &column.comment {
            sql.push_str(&self.column_comment(comment));
        }
        sql
    }

    fn compile_foreign_key(&self, table: &str, key: &ForeignKeyBuilder) -> ModelResult<String> {
        let (target_table, target_column) = key.target()?;
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.wrap_segment(&format!("{}_{}_foreign", table, key.column)),
            self.wrap(&key.column),
            self.wrap(target_table),
            self.wrap(target_column)
        );
        if let Some(action) = key.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        if let Some(action) = key.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.as_sql());
        }
        Ok(sql)
    }

    fn compile_index(&self, table: &str, index: &IndexDefinition) -> String {
        let columns = index
            .columns
            .iter()
            .map(|c| self.wrap(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.kind == IndexKind::Unique { "UNIQUE " } else { "" },
            self.wrap_segment(&index.name),
            self.wrap(table),
            columns
        )
    }

    fn compile_create(&self, blueprint: &Blueprint) -> ModelResult<Vec<String>> {
        if blueprint.columns.is_empty() {
            return Err(ModelError::Schema(format!(
                "table '{}' has no columns",
                blueprint.table
            )));
        }

        let mut definitions: Vec<String> = blueprint
            .columns
            .iter()
            .map(|c| self.compile_column(c))
            .collect();

        for index in blueprint.indexes.iter().filter(|i| i.kind == IndexKind::Primary) {
            definitions.push(format!(
                "PRIMARY KEY ({})",
                self.wrap_columns(&index.columns)
            ));
        }

        for key in blueprint.all_foreign_keys()? {
            definitions.push(self.compile_foreign_key(&blueprint.table, &key)?);
        }

        let mut statements = vec![format!(
            "CREATE {}TABLE {}{} (\n    {}\n)",
            if blueprint.temporary { "TEMPORARY " } else { "" },
            if blueprint.if_not_exists { "IF NOT EXISTS " } else { "" },
            self.wrap(&blueprint.table),
            definitions.join(",\n    ")
        )];

        statements.extend(
            blueprint
                .indexes
                .iter()
                .filter(|i| i.kind != IndexKind::Primary)
                .map(|i| self.compile_index(&blueprint.table, i)),
        );
        Ok(statements)
    }

    fn compile_alter(&self, blueprint: &Blueprint) -> ModelResult<Vec<String>> {
        let table = self.wrap(&blueprint.table);
        let mut statements = Vec::new();

        for column in &blueprint.columns {
            statements.push(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table,
                self.compile_column(column)
            ));
        }

        for command in &blueprint.commands {
            statements.push(match command {
                BlueprintCommand::DropColumn(name) => {
                    format!("ALTER TABLE {} DROP COLUMN {}", table, self.wrap(name))
                }
                BlueprintCommand::RenameColumn { from, to } => format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    table,
                    self.wrap(from),
                    self.wrap(to)
                ),
                BlueprintCommand::DropIndex(name) => self.compile_drop_index(&blueprint.table, name),
            });
        }

        for index in &blueprint.indexes {
            if index.kind == IndexKind::Primary {
                statements.push(self.compile_add_primary(&blueprint.table, &index.columns)?);
            } else {
                statements.push(self.compile_index(&blueprint.table, index));
            }
        }

        for key in blueprint.all_foreign_keys()? {
            statements.push(self.compile_add_foreign_key(&blueprint.table, &key)?);
        }

        Ok(statements)
    }

    fn compile_add_primary(&self, table: &str, columns: &[String]) -> ModelResult<String> {
        Ok(format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            self.wrap(table),
            self.wrap_columns(columns)
        ))
    }

    fn compile_add_foreign_key(&self, table: &str, key: &ForeignKeyBuilder) -> ModelResult<String> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.wrap(table),
            self.compile_foreign_key(table, key)?
        ))
    }

    fn compile_drop_index(&self, table: &str, name: &str) -> String {
        let _ = table;
        format!("DROP INDEX {}", self.wrap_segment(name))
    }

    fn compile_drop(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.wrap(table))
    }

    fn compile_drop_if_exists(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.wrap(table))
    }

    fn compile_rename(&self, from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", self.wrap(from), self.wrap(to))
    }

    /// Drop every listed table regardless of foreign keys
    fn compile_drop_all_tables(&self, tables: &[String]) -> Vec<String>;

    /// Query returning a single `aggregate` count column
    fn compile_table_exists(&self, table: &str) -> (String, Vec<Value>);

    /// Query returning one `name` column per column of the table
    fn compile_column_listing(&self, table: &str) -> (String, Vec<Value>);

    /// Query returning one `name` column per table
    fn compile_table_listing(&self) -> String;
}

/// SQL type shared by the dialects for the simple column types
pub(crate) fn common_column_type(column_type: &ColumnType) -> Option<String> {
    Some(match column_type {
        ColumnType::String(length) => format!("VARCHAR({})", length),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInteger => "BIGINT".to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::Time => "TIME".to_string(),
        ColumnType::Timestamp => "TIMESTAMP".to_string(),
        ColumnType::Decimal(precision, scale) => format!("DECIMAL({}, {})", precision, scale),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::types::{Boolean, OrderDirection};
    use serde_json::json;

    fn components() -> QueryComponents {
        QueryComponents {
            table: "users".to_string(),
            ..QueryComponents::default()
        }
    }

    #[test]
    fn test_wrap_identifiers() {
        let g = grammar_for(Driver::Sqlite);
        assert_eq!(g.wrap("users.name"), "\"users\".\"name\"");
        assert_eq!(g.wrap("users.*"), "\"users\".*");
        assert_eq!(g.wrap("name as display"), "\"name\" AS \"display\"");
        assert_eq!(g.wrap("COUNT(*) AS aggregate"), "COUNT(*) AS aggregate");
        assert_eq!(grammar_for(Driver::MySql).wrap("users.id"), "`users`.`id`");
    }

    #[test]
    fn test_wrap_non_ascii_alias() {
        let g = grammar_for(Driver::Sqlite);
        assert_eq!(g.wrap("İİ.name as x"), "\"İİ\".\"name\" AS \"x\"");
        assert_eq!(g.wrap("straße AS s"), "\"straße\" AS \"s\"");
    }

    #[test]
    fn test_placeholders_per_driver() {
        let mut query = components();
        query.wheres.push(WhereClause::Basic {
            column: "age".into(),
            operator: ">".into(),
            value: json!(18),
            boolean: Boolean::And,
        });
        query.wheres.push(WhereClause::In {
            column: "role".into(),
            values: vec![json!("admin"), json!("editor")],
            negated: false,
            boolean: Boolean::Or,
        });

        let (sql, params) = grammar_for(Driver::Postgres).compile_select(&query).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE \"age\" > $1 OR \"role\" IN ($2, $3)"
        );
        assert_eq!(params, vec![json!(18), json!("admin"), json!("editor")]);

        let (sql, _) = grammar_for(Driver::Sqlite).compile_select(&query).unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE \"age\" > ? OR \"role\" IN (?, ?)");
    }

    #[test]
    fn test_null_handling_and_empty_in() {
        let mut query = components();
        query.wheres.push(WhereClause::Basic {
            column: "deleted_at".into(),
            operator: "=".into(),
            value: Value::Null,
            boolean: Boolean::And,
        });
        query.wheres.push(WhereClause::Basic {
            column: "email".into(),
            operator: "!=".into(),
            value: Value::Null,
            boolean: Boolean::And,
        });
        query.wheres.push(WhereClause::In {
            column: "id".into(),
            values: vec![],
            negated: false,
            boolean: Boolean::And,
        });
        query.wheres.push(WhereClause::In {
            column: "id".into(),
            values: vec![],
            negated: true,
            boolean: Boolean::And,
        });

        let (sql, params) = grammar_for(Driver::Sqlite).compile_select(&query).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE \"deleted_at\" IS NULL AND \"email\" IS NOT NULL AND 0 = 1 AND 1 = 1"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_raw_fragments_are_renumbered() {
        let mut query = components();
        query.wheres.push(WhereClause::Basic {
            column: "active".into(),
            operator: "=".into(),
            value: json!(true),
            boolean: Boolean::And,
        });
        query.wheres.push(WhereClause::Raw {
            sql: "age > ? AND age < ?".into(),
            bindings: vec![json!(18), json!(65)],
            boolean: Boolean::And,
        });

        let (sql, params) = grammar_for(Driver::Postgres).compile_select(&query).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE \"active\" = $1 AND (age > $2 AND age < $3)"
        );
        assert_eq!(params.len(), 3);

        query.wheres.push(WhereClause::Raw {
            sql: "x = ?".into(),
            bindings: vec![],
            boolean: Boolean::And,
        });
        assert!(grammar_for(Driver::Postgres).compile_select(&query).is_err());
    }

    #[test]
    fn test_limit_offset_per_driver() {
        let mut query = components();
        query.orders.push(("id".into(), OrderDirection::Desc));
        query.offset = Some(10);

        let (sql, _) = grammar_for(Driver::Sqlite).compile_select(&query).unwrap();
        assert!(sql.ends_with("ORDER BY \"id\" DESC LIMIT -1 OFFSET 10"));
        let (sql, _) = grammar_for(Driver::Postgres).compile_select(&query).unwrap();
        assert!(sql.ends_with("ORDER BY \"id\" DESC OFFSET 10"));
        let (sql, _) = grammar_for(Driver::MySql).compile_select(&query).unwrap();
        assert!(sql.ends_with("LIMIT 18446744073709551615 OFFSET 10"));
    }

    #[test]
    fn test_insert_inlines_nulls() {
        let g = grammar_for(Driver::Postgres);
        let columns = vec!["name".to_string(), "bio".to_string()];
        let (sql, params) = g
            .compile_insert_get_id("users", &columns, &[json!("Ada"), Value::Null], "id")
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"name\", \"bio\") VALUES ($1, NULL) RETURNING \"id\""
        );
        assert_eq!(params, vec![json!("Ada")]);
    }

    #[test]
    fn test_update_and_delete() {
        let mut query = components();
        query.wheres.push(WhereClause::Basic {
            column: "id".into(),
            operator: "=".into(),
            value: json!(1),
            boolean: Boolean::And,
        });
        let g = grammar_for(Driver::Postgres);
        let (sql, params) = g
            .compile_update(
                &query,
                &[
                    ("name".into(), UpdateValue::Value(json!("Ada"))),
                    ("logins".into(), UpdateValue::Increment(json!(1))),
                ],
            )
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE \"users\" SET \"name\" = $1, \"logins\" = \"logins\" + $2 WHERE \"id\" = $3"
        );
        assert_eq!(params.len(), 3);

        let (sql, _) = g.compile_delete(&query).unwrap();
        assert_eq!(sql, "DELETE FROM \"users\" WHERE \"id\" = $1");
    }

    #[test]
    fn test_truncate_per_driver() {
        assert_eq!(grammar_for(Driver::Sqlite).compile_truncate("users"), vec!["DELETE FROM \"users\""]);
        assert_eq!(
            grammar_for(Driver::Postgres).compile_truncate("users"),
            vec!["TRUNCATE TABLE \"users\" RESTART IDENTITY CASCADE"]
        );
        assert_eq!(grammar_for(Driver::MySql).compile_truncate("users"), vec!["TRUNCATE TABLE `users`"]);
    }

    #[test]
    fn test_create_table_per_driver() {
        let mut table = Blueprint::new("posts");
        table.id();
        table.string("title", 255);
        table.boolean("published").default(false);
        table.foreign_id("user_id").references("users.id").cascade_on_delete();
        table.index(&["title"], None);

        let sqlite = grammar_for(Driver::Sqlite).compile_create(&table).unwrap();
        assert_eq!(
            sqlite[0],
            "CREATE TABLE \"posts\" (\n    \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n    \"title\" VARCHAR(255) NOT NULL,\n    \"published\" BOOLEAN NOT NULL DEFAULT 0,\n    \"user_id\" INTEGER NOT NULL,\n    CONSTRAINT \"posts_user_id_foreign\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE\n)"
        );
        assert_eq!(sqlite[1], "CREATE INDEX \"idx_posts_title\" ON \"posts\" (\"title\")");

        let pg = grammar_for(Driver::Postgres).compile_create(&table).unwrap();
        assert!(pg[0].contains("\"id\" SERIAL PRIMARY KEY"));
        assert!(pg[0].contains("\"published\" BOOLEAN NOT NULL DEFAULT FALSE"));

        let mysql = grammar_for(Driver::MySql).compile_create(&table).unwrap();
        assert!(mysql[0].contains("`id` INT AUTO_INCREMENT PRIMARY KEY"));
    }

    #[test]
    fn test_create_without_columns_fails() {
        let table = Blueprint::new("empty");
        assert!(matches!(
            grammar_for(Driver::Sqlite).compile_create(&table),
            Err(ModelError::Schema(_))
        ));
    }

    #[test]
    fn test_alter_table() {
        let mut table = Blueprint::new("users");
        table.string("nickname", 50).nullable();
        table.rename_column("name", "full_name");
        table.drop_column("legacy");

        let statements = grammar_for(Driver::Sqlite).compile_alter(&table).unwrap();
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE \"users\" ADD COLUMN \"nickname\" VARCHAR(50) NULL",
                "ALTER TABLE \"users\" RENAME COLUMN \"name\" TO \"full_name\"",
                "ALTER TABLE \"users\" DROP COLUMN \"legacy\"",
            ]
        );

        let mut with_key = Blueprint::new("posts");
        with_key.foreign("user_id").references("id").on("users");
        assert!(grammar_for(Driver::Sqlite).compile_alter(&with_key).is_err());
        assert!(grammar_for(Driver::Postgres).compile_alter(&with_key).is_ok());
    }
}
