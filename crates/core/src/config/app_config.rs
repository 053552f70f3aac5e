use crate::config::{ConfigError, ConfigSource, ConfigValidator, PortValidator, UrlValidator};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Configuration trait for application configuration
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Local,
    Development,
    Testing,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue {
                field: "environment".to_string(),
                value: s.to_string(),
                expected: "local, development, testing, staging, or production".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Environment {
    /// Every known environment, in promotion order
    pub const ALL: [Environment; 5] = [
        Environment::Local,
        Environment::Development,
        Environment::Testing,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Environment::Local)
    }

    pub fn is_testing(&self) -> bool {
        matches!(self, Environment::Testing)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Debug mode default for this environment
    pub fn is_debug_default(&self) -> bool {
        matches!(self, Environment::Local | Environment::Development)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Get the bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
    pub format: String,
}

/// Typed application configuration built from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub name: String,
    pub environment: Environment,
    pub debug: bool,
    pub url: String,
    pub key: Option<String>,
    pub database_url: String,
    pub server: ServerConfig,
    pub logging: LogSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Larix".to_string(),
            environment: Environment::Local,
            debug: true,
            url: "http://localhost:8000".to_string(),
            key: None,
            database_url: "sqlite://database/database.sqlite".to_string(),
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            logging: LogSettings {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Configuration suitable for tests
    pub fn testing() -> Self {
        Self {
            environment: Environment::Testing,
            debug: false,
            database_url: "sqlite::memory:".to_string(),
            key: Some("testing-key-testing-key-testing-key".to_string()),
            logging: LogSettings {
                level: "error".to_string(),
                format: "pretty".to_string(),
            },
            ..Self::default()
        }
    }
}

impl AppConfigTrait for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let environment = match env::var("APP_ENV") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.environment,
        };

        let debug = match env::var("APP_DEBUG") {
            Ok(raw) => crate::config::parse_bool(&raw).ok_or_else(|| {
                ConfigError::invalid_value("APP_DEBUG", raw.clone(), "true or false")
            })?,
            Err(_) => environment.is_debug_default(),
        };

        let port_raw = get_env_or_default("SERVER_PORT", &defaults.server.port.to_string());
        let port = port_raw.parse::<u16>().map_err(|_| {
            ConfigError::invalid_value("SERVER_PORT", port_raw.clone(), "valid port number (1-65535)")
        })?;

        Ok(Self {
            name: get_env_or_default("APP_NAME", &defaults.name),
            environment,
            debug,
            url: get_env_or_default("APP_URL", &defaults.url),
            key: env::var("APP_KEY").ok().filter(|k| !k.is_empty()),
            database_url: get_env_or_default("DATABASE_URL", &defaults.database_url),
            server: ServerConfig {
                host: get_env_or_default("SERVER_HOST", &defaults.server.host),
                port,
            },
            logging: LogSettings {
                level: get_env_or_default("LOG_LEVEL", &defaults.logging.level),
                format: get_env_or_default("LOG_FORMAT", &defaults.logging.format),
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::missing_required("APP_NAME", "Set APP_NAME to your application name"));
        }

        PortValidator::default().validate(&self.server.port)?;
        UrlValidator::default().validate(&self.url)?;

        if self.environment.is_production() {
            if self.key.is_none() {
                return Err(ConfigError::missing_required(
                    "APP_KEY",
                    "Run `larix key generate` to create an application key",
                ));
            }
            if self.debug {
                return Err(ConfigError::validation_failed(
                    "debug mode must be disabled in production",
                ));
            }
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        for (field, var) in [
            ("name", "APP_NAME"),
            ("environment", "APP_ENV"),
            ("debug", "APP_DEBUG"),
            ("url", "APP_URL"),
            ("key", "APP_KEY"),
            ("database_url", "DATABASE_URL"),
            ("server.host", "SERVER_HOST"),
            ("server.port", "SERVER_PORT"),
            ("logging.level", "LOG_LEVEL"),
            ("logging.format", "LOG_FORMAT"),
        ] {
            let source = if env::var(var).is_ok() {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(field.to_string())
            };
            sources.insert(field.to_string(), source);
        }
        sources
    }
}

/// Read an environment variable or fall back to a default
pub fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_vars() {
        for var in [
            "APP_NAME", "APP_ENV", "APP_DEBUG", "APP_URL", "APP_KEY", "DATABASE_URL",
            "SERVER_HOST", "SERVER_PORT", "LOG_LEVEL", "LOG_FORMAT",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("stage".parse::<Environment>().unwrap(), Environment::Staging);
        assert!("moon".parse::<Environment>().is_err());
        assert_eq!(Environment::Testing.to_string(), "testing");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_vars();
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.name, "Larix");
        assert_eq!(config.environment, Environment::Local);
        assert!(config.debug);
        assert_eq!(config.server.bind_address(), "127.0.0.1:8000");
        assert!(config.validate().is_ok());

        let sources = config.config_sources();
        assert!(sources["name"].is_default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_vars();
        env::set_var("APP_ENV", "production");
        env::set_var("SERVER_PORT", "9000");
        env::set_var("APP_KEY", "base64:abcdefghijklmnopqrstuvwxyz012345");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.debug);
        assert_eq!(config.server.port, 9000);
        assert!(config.validate().is_ok());
        assert!(config.config_sources()["server.port"].is_env_var());
        clear_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_port() {
        clear_vars();
        env::set_var("SERVER_PORT", "not-a-port");
        assert!(AppConfig::from_env().is_err());
        clear_vars();
    }

    #[test]
    fn test_production_requires_key_and_no_debug() {
        let mut config = AppConfig {
            environment: Environment::Production,
            debug: false,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingRequired { .. })));

        config.key = Some("k".repeat(32));
        config.debug = true;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationFailed { .. })));
    }
}
