//! Security configuration types

use larix_core::Config;
use serde::{Deserialize, Serialize};

/// What a rate limiter counts requests against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleKey {
    /// Client IP address
    Ip,
    /// Authenticated user, falling back to the client IP for guests
    User,
}

/// Sliding-log rate limit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub max_attempts: u32,
    pub decay_seconds: u64,
    pub key: ThrottleKey,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            decay_seconds: 60,
            key: ThrottleKey::Ip,
        }
    }
}

impl ThrottleConfig {
    /// 1000 requests per hour keyed by user
    pub fn per_user() -> Self {
        Self {
            max_attempts: 1000,
            decay_seconds: 3600,
            key: ThrottleKey::User,
        }
    }
}

/// CORS policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    /// Allowed request headers; `*` echoes whatever the preflight asks for
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds
    pub max_age: Option<u32>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: ["content-type", "authorization", "x-requested-with", "x-csrf-token"]
                .into_iter()
                .map(String::from)
                .collect(),
            exposed_headers: Vec::new(),
            allow_credentials: false,
            max_age: Some(86400),
        }
    }
}

impl CorsConfig {
    /// Read the `cors` config namespace, falling back to defaults
    pub fn from_config(config: &Config) -> Self {
        config.get_as::<CorsConfig>("cors").unwrap_or_default()
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allows_any_origin() || self.allowed_origins.iter().any(|o| o == origin)
    }

    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|m| m == "*" || m.eq_ignore_ascii_case(method))
    }

    pub fn is_header_allowed(&self, header: &str) -> bool {
        self.allowed_headers
            .iter()
            .any(|h| h == "*" || h.eq_ignore_ascii_case(header))
    }
}

/// CSRF protection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Paths that skip verification; a trailing `*` matches any suffix
    pub except: Vec<String>,
    /// Cookie carrying the token to JavaScript clients
    pub cookie_name: String,
    pub secure_cookie: bool,
    pub add_cookie: bool,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            except: Vec::new(),
            cookie_name: "XSRF-TOKEN".to_string(),
            secure_cookie: false,
            add_cookie: true,
        }
    }
}

impl CsrfConfig {
    pub fn except<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn is_excepted(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        self.except.iter().any(|pattern| {
            let pattern = pattern.trim_start_matches('/');
            match pattern.strip_suffix('*') {
                Some(prefix) => path.starts_with(prefix),
                None => path == pattern.trim_end_matches('/'),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csrf_except_globs() {
        let config = CsrfConfig::default().except(["webhooks/*", "/api/ping"]);
        assert!(config.is_excepted("/webhooks/stripe"));
        assert!(config.is_excepted("/api/ping/"));
        assert!(!config.is_excepted("/api/ping/more"));
        assert!(!config.is_excepted("/posts"));
    }

    #[test]
    fn test_cors_from_config() {
        let mut config = Config::new();
        config.set(
            "cors",
            json!({"allowed_origins": ["https://app.test"], "allow_credentials": true}),
        );
        let cors = CorsConfig::from_config(&config);
        assert!(cors.is_origin_allowed("https://app.test"));
        assert!(!cors.is_origin_allowed("https://evil.test"));
        assert!(cors.allow_credentials);
        assert!(cors.is_method_allowed("patch"));

        assert!(CorsConfig::from_config(&Config::new()).allows_any_origin());
    }

    #[test]
    fn test_throttle_presets() {
        let user = ThrottleConfig::per_user();
        assert_eq!(user.max_attempts, 1000);
        assert_eq!(user.decay_seconds, 3600);
        assert_eq!(ThrottleConfig::default().key, ThrottleKey::Ip);
    }
}
