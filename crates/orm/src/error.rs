//! Error types for the ORM
//!
//! Every database, query building, schema, migration and model failure is a
//! [`ModelError`]. Driver errors are flattened into strings so the error stays
//! `Clone` and can be carried inside query builders.

use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found in table '{0}'")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,

    #[error("Relationship error: {0}")]
    Relationship(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Factory error: {0}")]
    Factory(String),

    #[error("Seeder error: {0}")]
    Seeder(String),
}

impl ModelError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound(_))
    }
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ModelError::NotFound("row".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                ModelError::Connection(err.to_string())
            }
            other => ModelError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Migration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ModelError::NotFound("users".into()).to_string(),
            "Record not found in table 'users'"
        );
        assert_eq!(
            ModelError::Query("bad operator".into()).to_string(),
            "Query error: bad operator"
        );
        assert!(ModelError::NotFound("x".into()).is_not_found());
    }

    #[test]
    fn test_sqlx_conversion() {
        let err: ModelError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
        let err: ModelError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ModelError::Connection(_)));
    }
}
