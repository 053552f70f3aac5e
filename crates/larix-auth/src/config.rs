//! Authentication configuration: guards and user providers
//!
//! Read from the `auth` config section:
//!
//! ```yaml
//! auth:
//!   default: web
//!   guards:
//!     web: { driver: session, provider: users }
//!     api: { driver: token, provider: users, hash: false }
//!     jwt: { driver: jwt, provider: users, ttl_minutes: 60 }
//!   providers:
//!     users: { driver: database, table: users }
//! ```

use crate::guards::{JwtGuardConfig, TokenGuardConfig};
use crate::{AuthError, AuthResult};
use larix_core::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum GuardConfig {
    Session {
        provider: String,
    },
    Token {
        provider: String,
        #[serde(flatten)]
        options: TokenGuardConfig,
    },
    Jwt {
        provider: String,
        #[serde(flatten)]
        options: JwtGuardConfig,
    },
}

impl GuardConfig {
    pub fn provider(&self) -> &str {
        match self {
            GuardConfig::Session { provider }
            | GuardConfig::Token { provider, .. }
            | GuardConfig::Jwt { provider, .. } => provider,
        }
    }

    pub fn driver(&self) -> &'static str {
        match self {
            GuardConfig::Session { .. } => "session",
            GuardConfig::Token { .. } => "token",
            GuardConfig::Jwt { .. } => "jwt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum ProviderConfig {
    Database {
        #[serde(default = "default_table")]
        table: String,
    },
    /// Registered in code, e.g. an in-memory provider for tests
    Custom,
}

fn default_table() -> String {
    "users".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(rename = "default")]
    pub default_guard: String,
    pub guards: HashMap<String, GuardConfig>,
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let users = "users".to_string();
        let guards = HashMap::from([
            (
                "web".to_string(),
                GuardConfig::Session {
                    provider: users.clone(),
                },
            ),
            (
                "api".to_string(),
                GuardConfig::Token {
                    provider: users.clone(),
                    options: TokenGuardConfig {
                        hash: false,
                        ..TokenGuardConfig::default()
                    },
                },
            ),
            (
                "jwt".to_string(),
                GuardConfig::Jwt {
                    provider: users.clone(),
                    options: JwtGuardConfig::default(),
                },
            ),
        ]);
        let providers = HashMap::from([(users, ProviderConfig::Database { table: default_table() })]);

        Self {
            default_guard: "web".to_string(),
            guards,
            providers,
        }
    }
}

impl AuthConfig {
    /// Load the `auth` section; JWT guards without a secret fall back to `app.key`
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let mut auth = match config.get("auth") {
            Some(value) => serde_json::from_value::<AuthConfig>(value.clone())
                .map_err(|e| AuthError::config_error(format!("Invalid auth configuration: {}", e)))?,
            None => AuthConfig::default(),
        };

        if let Some(key) = config.get_string("app.key") {
            for guard in auth.guards.values_mut() {
                if let GuardConfig::Jwt { options, .. } = guard {
                    if options.secret.is_empty() {
                        options.secret = key.clone();
                    }
                }
            }
        }

        auth.validate()?;
        Ok(auth)
    }

    /// Every guard points at a known provider and the default guard exists
    pub fn validate(&self) -> AuthResult<()> {
        if !self.guards.contains_key(&self.default_guard) {
            return Err(AuthError::config_error(format!(
                "Default guard '{}' is not defined",
                self.default_guard
            )));
        }
        for (name, guard) in &self.guards {
            if !self.providers.contains_key(guard.provider()) {
                return Err(AuthError::config_error(format!(
                    "Guard '{}' uses undefined provider '{}'",
                    name,
                    guard.provider()
                )));
            }
        }
        Ok(())
    }

    pub fn guard(&self, name: &str) -> AuthResult<&GuardConfig> {
        self.guards
            .get(name)
            .ok_or_else(|| AuthError::config_error(format!("Auth guard [{}] is not defined", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.default_guard, "web");
        assert_eq!(config.guard("web").unwrap().driver(), "session");
        match config.guard("api").unwrap() {
            GuardConfig::Token { options, .. } => {
                assert!(!options.hash);
                assert_eq!(options.input_key, "api_token");
            }
            other => panic!("unexpected guard {:?}", other),
        }
        assert!(config.validate().is_ok());
        assert!(config.guard("admin").is_err());
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_value(json!({
            "app": {"key": "base64:secret"},
            "auth": {
                "default": "api",
                "guards": {
                    "api": {"driver": "token", "provider": "members", "storage_key": "token_hash"},
                    "jwt": {"driver": "jwt", "provider": "members", "ttl_minutes": 15}
                },
                "providers": {"members": {"driver": "database", "table": "members"}}
            }
        }));
        let auth = AuthConfig::from_config(&config).unwrap();
        assert_eq!(auth.default_guard, "api");
        match auth.guard("api").unwrap() {
            GuardConfig::Token { options, .. } => {
                assert_eq!(options.storage_key, "token_hash");
                assert!(options.hash);
            }
            other => panic!("unexpected guard {:?}", other),
        }
        match auth.guard("jwt").unwrap() {
            GuardConfig::Jwt { options, .. } => {
                assert_eq!(options.secret, "base64:secret");
                assert_eq!(options.ttl_minutes, 15);
            }
            other => panic!("unexpected guard {:?}", other),
        }
    }

    #[test]
    fn test_undefined_provider_is_rejected() {
        let config = Config::from_value(json!({
            "auth": {
                "default": "web",
                "guards": {"web": {"driver": "session", "provider": "admins"}},
                "providers": {}
            }
        }));
        assert!(matches!(
            AuthConfig::from_config(&config),
            Err(AuthError::ConfigurationError { .. })
        ));
    }
}
