use super::database::{Database, DatabaseConfig};
use crate::error::{ModelError, ModelResult};
use larix_core::Config;
use std::collections::HashMap;
use std::time::Duration;

/// Named database connections with one default
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    connections: HashMap<String, Database>,
    default: String,
}

impl DatabaseManager {
    pub fn new(default: impl Into<String>, database: Database) -> Self {
        let default = default.into();
        let mut connections = HashMap::new();
        connections.insert(default.clone(), database);
        Self {
            connections,
            default,
        }
    }

    /// Connect everything under `database.connections`.
    ///
    /// Reads `database.default` (falling back to `default`) and each
    /// connection's `url`, `max_connections`, `min_connections` and
    /// `connect_timeout` (seconds).
    pub async fn from_config(config: &Config) -> ModelResult<Self> {
        let default = config
            .get_string("database.default")
            .unwrap_or_else(|| "default".to_string());

        let connections = config
            .get("database.connections")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        if !connections.contains_key(&default) {
            return Err(ModelError::Configuration(format!(
                "default connection '{}' is not configured under database.connections",
                default
            )));
        }

        let mut manager = Self {
            connections: HashMap::new(),
            default,
        };

        for (name, settings) in connections {
            let url = settings
                .get("url")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    ModelError::Configuration(format!("connection '{}' has no url", name))
                })?;

            let mut db_config = DatabaseConfig::new(url);
            if let Some(max) = settings.get("max_connections").and_then(|v| v.as_u64()) {
                db_config = db_config.max_connections(max as u32);
            }
            if let Some(min) = settings.get("min_connections").and_then(|v| v.as_u64()) {
                db_config = db_config.min_connections(min as u32);
            }
            if let Some(secs) = settings.get("connect_timeout").and_then(|v| v.as_u64()) {
                db_config = db_config.connect_timeout(Duration::from_secs(secs));
            }

            let database = Database::connect_with(db_config).await?;
            tracing::info!(connection = %name, driver = %database.driver(), "database connection ready");
            manager.connections.insert(name, database);
        }

        Ok(manager)
    }

    pub fn add(&mut self, name: impl Into<String>, database: Database) {
        self.connections.insert(name.into(), database);
    }

    pub fn connection(&self, name: &str) -> ModelResult<&Database> {
        self.connections.get(name).ok_or_else(|| {
            ModelError::Configuration(format!("database connection '{}' is not configured", name))
        })
    }

    pub fn default_connection(&self) -> ModelResult<&Database> {
        self.connection(&self.default)
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_from_config() {
        let config = Config::from_value(json!({
            "database": {
                "default": "main",
                "connections": {
                    "main": {"url": "sqlite::memory:"},
                    "reports": {"url": "sqlite::memory:", "max_connections": 1}
                }
            }
        }));

        let manager = DatabaseManager::from_config(&config).await.unwrap();
        assert_eq!(manager.default_name(), "main");
        assert_eq!(manager.names(), vec!["main", "reports"]);
        assert!(manager.default_connection().is_ok());
        assert!(manager.connection("missing").is_err());
    }

    #[tokio::test]
    async fn test_missing_default_is_an_error() {
        let config = Config::from_value(json!({
            "database": {"connections": {"other": {"url": "sqlite::memory:"}}}
        }));
        assert!(matches!(
            DatabaseManager::from_config(&config).await,
            Err(ModelError::Configuration(_))
        ));
    }
}
