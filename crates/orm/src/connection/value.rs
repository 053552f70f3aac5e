//! Conversions between `serde_json::Value` and the sqlx `Any` driver

use super::Driver;
use crate::error::{ModelError, ModelResult};
use serde_json::{Map, Number, Value};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Column, Row as _, ValueRef};

/// A fetched row, keyed by column name
pub type Row = Map<String, Value>;

/// Bind `params` to `sql` in order.
///
/// Grammars inline `NULL`, so a null parameter here means a hand-written
/// statement tried to bind one. That is rejected because the `Any` driver
/// cannot infer a type for it.
pub(crate) fn bind_params<'q>(
    driver: Driver,
    sql: &'q str,
    params: &'q [Value],
) -> ModelResult<Query<'q, Any, AnyArguments<'q>>> {
    let mut query = sqlx::query(sql);
    for (position, param) in params.iter().enumerate() {
        query = match param {
            Value::Null => {
                return Err(ModelError::Query(format!(
                    "parameter {} is NULL; write NULL into the statement instead of binding it",
                    position + 1
                )))
            }
            Value::Bool(b) => match driver {
                Driver::Postgres => query.bind(*b),
                Driver::Sqlite | Driver::MySql => query.bind(i64::from(*b)),
            },
            Value::Number(n) => match n.as_i64() {
                Some(int) => query.bind(int),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.as_str()),
            Value::Array(_) | Value::Object(_) => query.bind(param.to_string()),
        };
    }
    Ok(query)
}

/// Decode every column of a row
pub(crate) fn decode_row(row: &AnyRow) -> Row {
    let mut map = Map::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_column(row, index));
    }
    map
}

fn decode_column(row: &AnyRow, index: usize) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    if let Ok(int) = row.try_get::<i64, _>(index) {
        return Value::from(int);
    }
    if let Ok(int) = row.try_get::<i32, _>(index) {
        return Value::from(int);
    }
    if let Ok(float) = row.try_get::<f64, _>(index) {
        return Number::from_f64(float).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Ok(text) = row.try_get::<String, _>(index) {
        return Value::String(text);
    }
    if let Ok(flag) = row.try_get::<bool, _>(index) {
        return Value::Bool(flag);
    }
    if let Ok(bytes) = row.try_get::<Vec<u8>, _>(index) {
        return Value::String(hex::encode(bytes));
    }
    Value::Null
}

/// Read an integer out of a decoded value, accepting numeric strings
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
