//! Dot-notation configuration repository
//!
//! Values live in a single `serde_json::Value` tree. Files loaded from the
//! config directory are namespaced by their file stem, so `config/database.yaml`
//! becomes reachable as `database.*`.

use crate::config::{ConfigError, ConfigSource};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Application configuration repository
#[derive(Debug, Clone, Default)]
pub struct Config {
    items: Value,
    sources: HashMap<String, ConfigSource>,
}

impl Config {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            items: Value::Object(Map::new()),
            sources: HashMap::new(),
        }
    }

    /// Create a repository from an existing value tree
    pub fn from_value(value: Value) -> Self {
        let items = match value {
            Value::Object(_) => value,
            _ => Value::Object(Map::new()),
        };
        Self {
            items,
            sources: HashMap::new(),
        }
    }

    /// Get a value by dotted key
    pub fn get(&self, key: &str) -> Option<&Value> {
        if key.is_empty() {
            return Some(&self.items);
        }
        let mut current = &self.items;
        for segment in key.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Get a value or the provided default
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Deserialize a value into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Get a string, rendering scalars as text
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Get a boolean, accepting the usual truthy strings
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => parse_bool(s),
            _ => None,
        }
    }

    /// Get an integer
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Set a value, creating intermediate objects as needed
    pub fn set(&mut self, key: &str, value: Value) {
        let mut current = &mut self.items;
        let mut segments = key.split('.').peekable();

        while let Some(segment) = segments.next() {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let map = match current {
                Value::Object(map) => map,
                _ => return,
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value);
                break;
            }
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        self.sources
            .insert(key.to_string(), ConfigSource::Programmatic);
    }

    /// Check whether a key exists
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key, returning the removed value
    pub fn forget(&mut self, key: &str) -> Option<Value> {
        let (parent, last) = match key.rsplit_once('.') {
            Some((parent, last)) => (Some(parent), last),
            None => (None, key),
        };

        let container = match parent {
            Some(parent) => {
                let mut current = &mut self.items;
                for segment in parent.split('.') {
                    current = current.as_object_mut()?.get_mut(segment)?;
                }
                current
            }
            None => &mut self.items,
        };

        self.sources.remove(key);
        container.as_object_mut()?.remove(last)
    }

    /// The whole configuration tree
    pub fn all(&self) -> &Value {
        &self.items
    }

    /// Merge another tree into this one recursively
    pub fn merge(&mut self, other: Value) {
        merge_values(&mut self.items, other);
    }

    /// Where a key was set from, if tracked
    pub fn source_of(&self, key: &str) -> Option<&ConfigSource> {
        self.sources.get(key)
    }

    /// Load a single file namespaced by its stem
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let namespace = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::parsing(path.display().to_string(), "invalid file name"))?
            .to_string();

        let value = parse_file(path)?;
        let mut wrapper = Map::new();
        wrapper.insert(namespace.clone(), value);
        self.merge(Value::Object(wrapper));
        self.sources.insert(
            namespace,
            ConfigSource::File(path.display().to_string()),
        );

        tracing::debug!("Loaded configuration file {}", path.display());
        Ok(())
    }

    /// Load every supported file in a directory, sorted by name
    pub fn load_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut files: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_supported(path))
            .collect();
        files.sort();

        for file in &files {
            self.load_file(file)?;
        }
        Ok(files.len())
    }

    /// Write the configuration tree to a JSON cache file
    pub fn cache_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.items)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a cached configuration tree if the cache file exists
    pub fn load_cached(path: impl AsRef<Path>) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&contents)?;
        let mut config = Self::from_value(value);
        config
            .sources
            .insert(String::new(), ConfigSource::Cache(path.display().to_string()));
        Ok(Some(config))
    }

    /// Remove a cache file; a missing file is not an error
    pub fn clear_cache(path: impl AsRef<Path>) -> Result<bool, ConfigError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Read an environment variable with type casting
    pub fn env(key: &str) -> Option<Value> {
        std::env::var(key).ok().map(|raw| cast_env_value(&raw))
    }

    /// Read an environment variable with a fallback
    pub fn env_or(key: &str, default: Value) -> Value {
        Self::env(key).unwrap_or(default)
    }

    /// Read a boolean environment variable
    pub fn env_bool(key: &str, default: bool) -> bool {
        std::env::var(key)
            .ok()
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(default)
    }

    /// Load a `.env` file without overriding existing variables
    pub fn load_env_file(path: impl AsRef<Path>) -> Result<bool, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(false);
        }
        dotenvy::from_path(path).map_err(|e| ConfigError::environment_error(e.to_string()))?;
        Ok(true)
    }
}

fn is_supported(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "yaml" | "yml" | "toml")
    )
}

fn parse_file(path: &Path) -> Result<Value, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let display = path.display().to_string();

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(serde_json::from_str(&contents)?),
        Some("yaml" | "yml") => Ok(serde_yaml::from_str(&contents)?),
        Some("toml") => {
            let parsed: toml::Value =
                toml::from_str(&contents).map_err(|e| ConfigError::parsing(&display, e.to_string()))?;
            Ok(serde_json::to_value(parsed)?)
        }
        _ => Err(ConfigError::parsing(display, "unsupported configuration format")),
    }
}

fn merge_values(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match target_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value);
                    }
                    _ => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target, incoming) => *target = incoming,
    }
}

/// Parse the truthy/falsy strings accepted in env files
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "(true)" | "1" | "yes" | "on" => Some(true),
        "false" | "(false)" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Cast a raw environment string to a JSON value
pub fn cast_env_value(raw: &str) -> Value {
    match raw.trim().to_lowercase().as_str() {
        "true" | "(true)" => return Value::Bool(true),
        "false" | "(false)" => return Value::Bool(false),
        "null" | "(null)" => return Value::Null,
        "empty" | "(empty)" => return Value::String(String::new()),
        _ => {}
    }

    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dot_notation_get_set() {
        let mut config = Config::new();
        config.set("database.connections.default.url", json!("sqlite::memory:"));

        assert_eq!(
            config.get("database.connections.default.url"),
            Some(&json!("sqlite::memory:"))
        );
        assert!(config.has("database.connections"));
        assert!(!config.has("database.missing"));
        assert_eq!(config.get_or("app.name", json!("Larix")), json!("Larix"));
    }

    #[test]
    fn test_set_through_scalar_replaces_it() {
        let mut config = Config::new();
        config.set("app", json!("flat"));
        config.set("app.name", json!("Larix"));
        assert_eq!(config.get_string("app.name").as_deref(), Some("Larix"));
    }

    #[test]
    fn test_forget() {
        let mut config = Config::from_value(json!({"app": {"name": "Larix", "debug": true}}));
        assert_eq!(config.forget("app.debug"), Some(json!(true)));
        assert!(!config.has("app.debug"));
        assert!(config.has("app.name"));
        assert_eq!(config.forget("nope.nothing"), None);
    }

    #[test]
    fn test_recursive_merge() {
        let mut config = Config::from_value(json!({"cache": {"default": "memory", "stores": {"memory": {}}}}));
        config.merge(json!({"cache": {"stores": {"file": {"path": "/tmp"}}}, "app": {"name": "x"}}));

        assert_eq!(config.get_string("cache.default").as_deref(), Some("memory"));
        assert!(config.has("cache.stores.memory"));
        assert_eq!(config.get_string("cache.stores.file.path").as_deref(), Some("/tmp"));
        assert!(config.has("app.name"));
    }

    #[test]
    fn test_typed_getters() {
        let config = Config::from_value(json!({"a": {"port": "8080", "debug": "yes", "n": 3}}));
        assert_eq!(config.get_i64("a.port"), Some(8080));
        assert_eq!(config.get_bool("a.debug"), Some(true));
        assert_eq!(config.get_as::<u8>("a.n"), Some(3));
    }

    #[test]
    fn test_load_directory_namespaces_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.json"), r#"{"name": "Larix"}"#).unwrap();
        std::fs::write(dir.path().join("database.yaml"), "default: sqlite\n").unwrap();
        std::fs::write(dir.path().join("cache.toml"), "default = \"file\"\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut config = Config::new();
        let loaded = config.load_directory(dir.path()).unwrap();

        assert_eq!(loaded, 3);
        assert_eq!(config.get_string("app.name").as_deref(), Some("Larix"));
        assert_eq!(config.get_string("database.default").as_deref(), Some("sqlite"));
        assert_eq!(config.get_string("cache.default").as_deref(), Some("file"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let mut config = Config::new();
        assert_eq!(config.load_directory("/definitely/not/here").unwrap(), 0);
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("bootstrap/cache/config.json");

        let config = Config::from_value(json!({"app": {"name": "Cached"}}));
        config.cache_to(&cache).unwrap();

        let loaded = Config::load_cached(&cache).unwrap().unwrap();
        assert_eq!(loaded.get_string("app.name").as_deref(), Some("Cached"));

        assert!(Config::clear_cache(&cache).unwrap());
        assert!(!Config::clear_cache(&cache).unwrap());
        assert!(Config::load_cached(&cache).unwrap().is_none());
    }

    #[test]
    fn test_env_casting() {
        assert_eq!(cast_env_value("true"), json!(true));
        assert_eq!(cast_env_value("(false)"), json!(false));
        assert_eq!(cast_env_value("null"), Value::Null);
        assert_eq!(cast_env_value("(empty)"), json!(""));
        assert_eq!(cast_env_value("42"), json!(42));
        assert_eq!(cast_env_value("1.5"), json!(1.5));
        assert_eq!(cast_env_value("hello"), json!("hello"));

        assert_eq!(parse_bool("On"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
