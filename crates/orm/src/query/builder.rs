//! Query Builder - fluent clause accumulation

use std::marker::PhantomData;

use serde_json::Value;

use super::types::*;
use crate::connection::Driver;
use crate::error::{ModelError, ModelResult};
use crate::grammar::grammar_for;

/// Fluent SQL builder.
///
/// `M` selects what rows hydrate into: plain [`Row`](crate::Row)s for `()`,
/// or [`Record`](crate::Record)s for a model type.
pub struct QueryBuilder<M = ()> {
    pub(crate) components: QueryComponents,
    pub(crate) driver: Driver,
    pub(crate) error: Option<ModelError>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for QueryBuilder<M> {
    fn clone(&self) -> Self {
        Self {
            components: self.components.clone(),
            driver: self.driver,
            error: self.error.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> std::fmt::Debug for QueryBuilder<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("components", &self.components)
            .field("driver", &self.driver)
            .field("error", &self.error)
            .finish()
    }
}

impl<M> Default for QueryBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> QueryBuilder<M> {
    pub fn new() -> Self {
        Self {
            components: QueryComponents::default(),
            driver: Driver::default(),
            error: None,
            _model: PhantomData,
        }
    }

    pub fn table(name: &str) -> Self {
        Self::new().from(name)
    }

    /// Compile for this dialect
    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.driver = driver;
        self
    }

    /// Same clauses, different hydration target
    pub fn cast<N>(self) -> QueryBuilder<N> {
        QueryBuilder {
            components: self.components,
            driver: self.driver,
            error: self.error,
            _model: PhantomData,
        }
    }

    pub fn components(&self) -> &QueryComponents {
        &self.components
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn table_name(&self) -> &str {
        &self.components.table
    }

    fn fail(mut self, error: ModelError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    pub(crate) fn check(&self) -> ModelResult<()> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    pub fn from(mut self, table: &str) -> Self {
        self.components.table = table.to_string();
        self
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.components.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn add_select(mut self, columns: &[&str]) -> Self {
        self.components
            .columns
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.components.distinct = true;
        self
    }

    fn push_where(
        mut self,
        column: &str,
        operator: &str,
        value: Value,
        boolean: Boolean,
    ) -> Self {
        let Some(operator) = normalize_operator(operator) else {
            return self.fail(ModelError::Query(format!("invalid operator '{}'", operator)));
        };

        let clause = match operator.as_str() {
            "in" | "not in" => match value {
                Value::Array(values) => WhereClause::In {
                    column: column.to_string(),
                    values,
                    negated: operator == "not in",
                    boolean,
                },
                other => WhereClause::In {
                    column: column.to_string(),
                    values: vec![other],
                    negated: operator == "not in",
                    boolean,
                },
            },
            "between" => match value {
                Value::Array(mut values) if values.len() == 2 => {
                    let high = values.pop().unwrap_or(Value::Null);
                    let low = values.pop().unwrap_or(Value::Null);
                    WhereClause::Between {
                        column: column.to_string(),
                        low,
                        high,
                        negated: false,
                        boolean,
                    }
                }
                _ => {
                    return self.fail(ModelError::Query(format!(
                        "between on '{}' needs exactly two values",
                        column
                    )))
                }
            },
            _ => WhereClause::Basic {
                column: column.to_string(),
                operator,
                value,
                boolean,
            },
        };
        self.components.wheres.push(clause);
        self
    }

    pub fn where_(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_where(column, operator, value.into(), Boolean::And)
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_where(column, "=", value.into(), Boolean::And)
    }

    pub fn or_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_where(column, operator, value.into(), Boolean::Or)
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.push_where(column, "=", value.into(), Boolean::Or)
    }

    fn push_in<I, V>(mut self, column: &str, values: I, negated: bool, boolean: Boolean) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.components.wheres.push(WhereClause::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            negated,
            boolean,
        });
        self
    }

    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, values, false, Boolean::And)
    }

    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, values, true, Boolean::And)
    }

    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(column, values, false, Boolean::Or)
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.components.wheres.push(WhereClause::Null {
            column: column.to_string(),
            negated: false,
            boolean: Boolean::And,
        });
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        self.components.wheres.push(WhereClause::Null {
            column: column.to_string(),
            negated: true,
            boolean: Boolean::And,
        });
        self
    }

    pub fn or_where_null(mut self, column: &str) -> Self {
        self.components.wheres.push(WhereClause::Null {
            column: column.to_string(),
            negated: false,
            boolean: Boolean::Or,
        });
        self
    }

    fn push_between(
        mut self,
        column: &str,
        low: Value,
        high: Value,
        negated: bool,
    ) -> Self {
        self.components.wheres.push(WhereClause::Between {
            column: column.to_string(),
            low,
            high,
            negated,
            boolean: Boolean::And,
        });
        self
    }

    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_between(column, low.into(), high.into(), false)
    }

    pub fn where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_between(column, low.into(), high.into(), true)
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.push_where(column, "like", Value::String(pattern.to_string()), Boolean::And)
    }

    pub fn where_not_like(self, column: &str, pattern: &str) -> Self {
        self.push_where(column, "not like", Value::String(pattern.to_string()), Boolean::And)
    }

    /// Raw condition with `?` placeholders
    pub fn where_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.components.wheres.push(WhereClause::Raw {
            sql: sql.to_string(),
            bindings,
            boolean: Boolean::And,
        });
        self
    }

    pub fn or_where_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        self.components.wheres.push(WhereClause::Raw {
            sql: sql.to_string(),
            bindings,
            boolean: Boolean::Or,
        });
        self
    }

    fn push_join(
        mut self,
        join_type: JoinType,
        table: &str,
        first: &str,
        operator: &str,
        second: &str,
    ) -> Self {
        if !matches!(operator, "=" | "!=" | "<>" | "<" | ">" | "<=" | ">=") {
            return self.fail(ModelError::Query(format!(
                "invalid join operator '{}'",
                operator
            )));
        }
        self.components.joins.push(JoinClause {
            join_type,
            table: table.to_string(),
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
        });
        self
    }

    pub fn join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinType::Inner, table, first, operator, second)
    }

    pub fn left_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinType::Left, table, first, operator, second)
    }

    pub fn right_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinType::Right, table, first, operator, second)
    }

    pub fn cross_join(mut self, table: &str) -> Self {
        self.components.joins.push(JoinClause {
            join_type: JoinType::Cross,
            table: table.to_string(),
            first: String::new(),
            operator: String::new(),
            second: String::new(),
        });
        self
    }

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.components
            .groups
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn having(mut self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        let Some(operator) = normalize_operator(operator) else {
            return self.fail(ModelError::Query(format!("invalid operator '{}'", operator)));
        };
        self.components.havings.push(HavingClause {
            column: column.to_string(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, column: &str, direction: impl Into<OrderDirection>) -> Self {
        self.components
            .orders
            .push((column.to_string(), direction.into()));
        self
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, OrderDirection::Desc)
    }

    /// Newest first, by `created_at` unless a column is given
    pub fn latest(self, column: Option<&str>) -> Self {
        self.order_by(column.unwrap_or("created_at"), OrderDirection::Desc)
    }

    pub fn oldest(self, column: Option<&str>) -> Self {
        self.order_by(column.unwrap_or("created_at"), OrderDirection::Asc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.components.limit = Some(limit);
        self
    }

    pub fn take(self, limit: u64) -> Self {
        self.limit(limit)
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.components.offset = Some(offset);
        self
    }

    pub fn skip(self, offset: u64) -> Self {
        self.offset(offset)
    }

    /// `LIMIT per_page OFFSET (page - 1) * per_page`, pages start at 1
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.offset((page - 1) * per_page).limit(per_page)
    }

    /// Compile the select statement for the builder's dialect
    pub fn to_sql(&self) -> ModelResult<(String, Vec<Value>)> {
        self.check()?;
        grammar_for(self.driver).compile_select(&self.components)
    }
}
