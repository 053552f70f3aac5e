//! Fluent query builder
//!
//! Builders accumulate clauses as plain data ([`types::QueryComponents`]) and hand
//! them to a [`Grammar`](crate::grammar::Grammar) when compiled or executed.

pub mod builder;
pub mod execution;
pub mod pagination;
pub mod types;

pub use builder::QueryBuilder;
pub use pagination::Paginator;
pub use types::{
    Boolean, HavingClause, JoinClause, JoinType, OrderDirection, QueryComponents, UpdateValue,
    WhereClause, OPERATORS,
};

use crate::connection::Row;
use crate::error::ModelResult;

/// Turns fetched rows into the builder's output type
pub trait Hydrate {
    type Output: Send;

    fn hydrate(row: Row) -> ModelResult<Self::Output>;
}

impl Hydrate for () {
    type Output = Row;

    fn hydrate(row: Row) -> ModelResult<Row> {
        Ok(row)
    }
}
