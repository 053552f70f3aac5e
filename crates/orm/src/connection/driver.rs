use crate::error::{ModelError, ModelResult};
use std::fmt;
use std::str::FromStr;

/// Database backend, derived from the connection URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Driver {
    #[default]
    Sqlite,
    Postgres,
    MySql,
}

impl Driver {
    pub fn from_url(url: &str) -> ModelResult<Self> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| ModelError::Configuration(format!("invalid database url '{}'", url)))?;
        scheme.parse()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Driver::Sqlite => "sqlite",
            Driver::Postgres => "postgres",
            Driver::MySql => "mysql",
        }
    }

    /// Query reading the id generated by the last insert on the same connection.
    /// Postgres returns it through `RETURNING` instead.
    pub fn last_insert_id_query(&self) -> Option<&'static str> {
        match self {
            Driver::Sqlite => Some("SELECT last_insert_rowid()"),
            Driver::MySql => Some("SELECT LAST_INSERT_ID()"),
            Driver::Postgres => None,
        }
    }
}

impl FromStr for Driver {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            "postgres" | "postgresql" | "pgsql" => Ok(Driver::Postgres),
            "mysql" | "mariadb" => Ok(Driver::MySql),
            other => Err(ModelError::Configuration(format!(
                "unsupported database driver '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_from_url() {
        assert_eq!(Driver::from_url("sqlite::memory:").unwrap(), Driver::Sqlite);
        assert_eq!(Driver::from_url("sqlite://db.sqlite").unwrap(), Driver::Sqlite);
        assert_eq!(Driver::from_url("postgresql://localhost/app").unwrap(), Driver::Postgres);
        assert_eq!(Driver::from_url("mariadb://localhost/app").unwrap(), Driver::MySql);
        assert!(Driver::from_url("oracle://x").is_err());
        assert!(Driver::from_url("nonsense").is_err());
    }

    #[test]
    fn test_last_insert_id_query() {
        assert_eq!(Driver::Sqlite.last_insert_id_query(), Some("SELECT last_insert_rowid()"));
        assert_eq!(Driver::MySql.last_insert_id_query(), Some("SELECT LAST_INSERT_ID()"));
        assert_eq!(Driver::Postgres.last_insert_id_query(), None);
    }
}
