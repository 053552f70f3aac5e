//! Clause types accumulated by the query builder and read by grammars

use serde_json::Value;
use std::fmt;

/// How a where clause joins the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

impl Boolean {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Boolean::And => "AND",
            Boolean::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    Basic {
        column: String,
        operator: String,
        value: Value,
        boolean: Boolean,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
        boolean: Boolean,
    },
    Null {
        column: String,
        negated: bool,
        boolean: Boolean,
    },
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
        boolean: Boolean,
    },
    /// Raw SQL with `?` placeholders
    Raw {
        sql: String,
        bindings: Vec<Value>,
        boolean: Boolean,
    },
}

impl WhereClause {
    pub fn boolean(&self) -> Boolean {
        match self {
            WhereClause::Basic { boolean, .. }
            | WhereClause::In { boolean, .. }
            | WhereClause::Null { boolean, .. }
            | WhereClause::Between { boolean, .. }
            | WhereClause::Raw { boolean, .. } => *boolean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub first: String,
    pub operator: String,
    pub second: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

impl From<&str> for OrderDirection {
    fn from(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            OrderDirection::Desc
        } else {
            OrderDirection::Asc
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HavingClause {
    pub column: String,
    pub operator: String,
    pub value: Value,
}

/// Right-hand side of a `SET` assignment
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateValue {
    Value(Value),
    /// `column = column + amount`
    Increment(Value),
}

/// Everything a grammar needs to compile a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryComponents {
    pub table: String,
    pub columns: Vec<String>,
    pub distinct: bool,
    pub wheres: Vec<WhereClause>,
    pub joins: Vec<JoinClause>,
    pub groups: Vec<String>,
    pub havings: Vec<HavingClause>,
    pub orders: Vec<(String, OrderDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Operators accepted by `where_` and `having`
pub const OPERATORS: &[&str] = &[
    "=", "!=", "<>", "<", ">", "<=", ">=", "like", "not like", "ilike", "in", "not in", "between",
];

/// Lowercased operator when it is supported
pub fn normalize_operator(operator: &str) -> Option<String> {
    let normalized = operator.trim().to_lowercase();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    OPERATORS
        .contains(&normalized.as_str())
        .then_some(normalized)
}
