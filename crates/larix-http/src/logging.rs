//! Logging setup
//!
//! Installs a `tracing-subscriber` registry with either JSON, pretty or plain
//! output. `RUST_LOG` takes precedence over the configured filter.

use larix_core::Config;
use serde_json::{json, Value};
use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level used when no filter is set (e.g. "info")
    pub level: String,
    pub json_format: bool,
    pub pretty_print: bool,
    pub include_location: bool,
    /// Fields reported with the initialization event
    pub global_fields: serde_json::Map<String, Value>,
    /// Full filter directive such as "larix=debug,tower=info"
    pub env_filter: Option<String>,
    pub service_name: Option<String>,
    pub service_version: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            pretty_print: true,
            include_location: false,
            global_fields: serde_json::Map::new(),
            env_filter: None,
            service_name: None,
            service_version: None,
        }
    }
}

impl LoggingConfig {
    pub fn production() -> Self {
        Self {
            json_format: true,
            pretty_print: false,
            env_filter: Some("larix=info,tower=warn,axum=warn,sqlx=warn".to_string()),
            ..Self::default()
        }
        .with_global_field("env", "production")
    }

    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            include_location: true,
            env_filter: Some("larix=debug,tower=debug,axum=debug,sqlx=info".to_string()),
            ..Self::default()
        }
        .with_global_field("env", "development")
    }

    /// Minimal output for tests
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            pretty_print: false,
            env_filter: Some("larix=error".to_string()),
            ..Self::default()
        }
        .with_global_field("env", "test")
    }

    /// Build from `logging.level`, `logging.format` and `app.name`
    pub fn from_config(config: &Config) -> Self {
        let format = config
            .get_string("logging.format")
            .unwrap_or_else(|| "pretty".to_string());
        let mut logging = match format.as_str() {
            "json" => Self::production(),
            _ => Self::default(),
        };
        if let Some(level) = config.get_string("logging.level") {
            logging.env_filter = None;
            logging.level = level;
        }
        if let Some(name) = config.get_string("app.name") {
            logging.service_name = Some(name);
        }
        logging
    }

    pub fn with_global_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.global_fields.insert(key.into(), value.into());
        self
    }

    pub fn with_service(mut self, name: &str, version: &str) -> Self {
        self.service_name = Some(name.to_string());
        self.service_version = Some(version.to_string());
        self
    }

    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Directive handed to `EnvFilter` when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Install the global subscriber.
///
/// Fails if the filter is invalid or a subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stdout)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .json(),
            )
            .try_init()?;
    } else if config.pretty_print {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stdout)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .pretty(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout))
            .try_init()?;
    }

    let mut init = json!({
        "level": config.level,
        "format": if config.json_format { "json" } else { "text" },
    });
    if let Some(name) = &config.service_name {
        init["service_name"] = json!(name);
    }
    if let Some(version) = &config.service_version {
        init["service_version"] = json!(version);
    }
    for (key, value) in &config.global_fields {
        init[key] = value.clone();
    }
    tracing::info!(target: "larix::logging", "logging initialized {}", init);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let production = LoggingConfig::production();
        assert!(production.json_format);
        assert_eq!(production.global_fields["env"], "production");
        assert!(production.filter_directive().starts_with("larix=info"));

        let test = LoggingConfig::test();
        assert_eq!(test.level, "error");
        assert!(!test.pretty_print);
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::new();
        config.set("logging.format", json!("json"));
        config.set("logging.level", json!("warn"));
        config.set("app.name", json!("shop"));

        let logging = LoggingConfig::from_config(&config);
        assert!(logging.json_format);
        assert_eq!(logging.filter_directive(), "warn");
        assert_eq!(logging.service_name.as_deref(), Some("shop"));

        let logging = LoggingConfig::from_config(&Config::new());
        assert!(logging.pretty_print);
        assert_eq!(logging.filter_directive(), "info");
    }

    #[test]
    fn test_builders() {
        let logging = LoggingConfig::default()
            .with_service("api", "1.2.0")
            .with_env_filter("larix=trace");
        assert_eq!(logging.service_version.as_deref(), Some("1.2.0"));
        assert_eq!(logging.filter_directive(), "larix=trace");
    }
}
