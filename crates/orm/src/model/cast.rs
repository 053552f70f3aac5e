use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::connection::{value_as_f64, value_as_i64};

/// Conversion applied to a column when a row hydrates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cast {
    Integer,
    Float,
    Boolean,
    String,
    /// JSON stored as text
    Json,
    /// RFC 3339 in UTC
    DateTime,
}

impl Cast {
    pub fn apply(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }

        match self {
            Cast::Integer => value_as_i64(&value).map(Value::from).unwrap_or(value),
            Cast::Float => value_as_f64(&value)
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(value),
            Cast::Boolean => match &value {
                Value::Number(n) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
                Value::String(s) => match s.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => Value::Bool(true),
                    "0" | "false" | "no" | "off" | "" => Value::Bool(false),
                    _ => value,
                },
                _ => value,
            },
            Cast::String => match value {
                Value::String(_) => value,
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                other => Value::String(other.to_string()),
            },
            Cast::Json => match &value {
                Value::String(s) => serde_json::from_str(s).unwrap_or(value),
                _ => value,
            },
            Cast::DateTime => match &value {
                Value::String(s) => normalize_datetime(s).map(Value::String).unwrap_or(value),
                _ => value,
            },
        }
    }
}

fn normalize_datetime(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true))
}
