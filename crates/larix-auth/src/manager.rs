//! Builds guards per request from configuration and registered providers

use crate::config::{AuthConfig, GuardConfig, ProviderConfig};
use crate::guards::{Guard, JwtBlacklist, JwtGuard, SessionGuard, TokenGuard};
use crate::hashing::HashManager;
use crate::providers::{DatabaseUserProvider, UserProvider};
use crate::user::Authenticatable;
use crate::{AuthError, AuthResult};
use larix_core::Config;
use larix_http::{LarixRequest, Session};
use larix_orm::Database;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub struct AuthManager<U: Authenticatable> {
    config: AuthConfig,
    providers: HashMap<String, Arc<dyn UserProvider<U>>>,
    hasher: Arc<HashManager>,
    blacklist: Arc<JwtBlacklist>,
}

impl<U: Authenticatable> fmt::Debug for AuthManager<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&String> = self.providers.keys().collect();
        providers.sort();
        f.debug_struct("AuthManager")
            .field("default_guard", &self.config.default_guard)
            .field("providers", &providers)
            .finish()
    }
}

impl<U: Authenticatable> AuthManager<U> {
    pub fn new(config: AuthConfig, hasher: Arc<HashManager>) -> Self {
        Self {
            config,
            providers: HashMap::new(),
            hasher,
            blacklist: Arc::new(JwtBlacklist::new()),
        }
    }

    /// Auth and hashing settings from config, with database providers over `db`
    pub fn from_config(config: &Config, db: &Database) -> AuthResult<Self> {
        let auth = AuthConfig::from_config(config)?;
        let hasher = Arc::new(HashManager::from_config(config)?);
        let mut manager = Self::new(auth, hasher);

        let tables: Vec<(String, String)> = manager
            .config
            .providers
            .iter()
            .filter_map(|(name, provider)| match provider {
                ProviderConfig::Database { table } => Some((name.clone(), table.clone())),
                ProviderConfig::Custom => None,
            })
            .collect();
        for (name, table) in tables {
            let provider = DatabaseUserProvider::<U>::new(db.clone(), table, manager.hasher.clone());
            manager.register_provider(&name, Arc::new(provider));
        }
        Ok(manager)
    }

    pub fn register_provider(&mut self, name: &str, provider: Arc<dyn UserProvider<U>>) -> &mut Self {
        self.providers.insert(name.to_string(), provider);
        self
    }

    pub fn with_provider(mut self, name: &str, provider: Arc<dyn UserProvider<U>>) -> Self {
        self.register_provider(name, provider);
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn hasher(&self) -> Arc<HashManager> {
        self.hasher.clone()
    }

    pub fn default_guard_name(&self) -> &str {
        &self.config.default_guard
    }

    pub fn guard_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.guards.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn provider(&self, name: &str) -> AuthResult<Arc<dyn UserProvider<U>>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            AuthError::config_error(format!("User provider [{}] is not registered", name))
        })
    }

    /// Guard `name` for one request
    pub fn guard(&self, name: &str, request: &LarixRequest) -> AuthResult<Box<dyn Guard<U>>> {
        let config = self.config.guard(name)?;
        let provider = self.provider(config.provider())?;

        let guard: Box<dyn Guard<U>> = match config {
            GuardConfig::Session { .. } => {
                let session = request.get_extension::<Session>().cloned().ok_or_else(|| {
                    AuthError::session_error(format!(
                        "Guard [{}] needs a session; add the session middleware to the route",
                        name
                    ))
                })?;
                Box::new(SessionGuard::new(name, session, provider))
            }
            GuardConfig::Token { options, .. } => {
                Box::new(TokenGuard::new(name, options.clone(), provider, request))
            }
            GuardConfig::Jwt { options, .. } => Box::new(JwtGuard::new(
                name,
                options.clone(),
                provider,
                self.blacklist.clone(),
                request,
            )?),
        };
        Ok(guard)
    }

    pub fn default_guard(&self, request: &LarixRequest) -> AuthResult<Box<dyn Guard<U>>> {
        self.guard(&self.config.default_guard, request)
    }

    /// JWT guard with its concrete type, for `token()`/`refresh()`
    pub fn jwt_guard(&self, name: &str, request: &LarixRequest) -> AuthResult<JwtGuard<U>> {
        match self.config.guard(name)? {
            GuardConfig::Jwt { provider, options } => JwtGuard::new(
                name,
                options.clone(),
                self.provider(provider)?,
                self.blacklist.clone(),
                request,
            ),
            other => Err(AuthError::config_error(format!(
                "Guard [{}] uses the {} driver, not jwt",
                name,
                other.driver()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::JwtGuardConfig;
    use crate::hashing::{Algorithm, BcryptHasher, PasswordHasher};
    use crate::providers::{credentials, InMemoryUserProvider};
    use crate::user::GenericUser;
    use larix_http::Method;
    use serde_json::json;

    fn manager() -> AuthManager<GenericUser> {
        let hasher = Arc::new(HashManager::new(Algorithm::Bcrypt).with_bcrypt(BcryptHasher::new(4)));
        let ada: GenericUser = serde_json::from_value(json!({
            "id": 1,
            "email": "ada@example.com",
            "password": hasher.hash("secret").unwrap(),
            "api_token": "plain-token"
        }))
        .unwrap();
        let users: Arc<dyn UserProvider<GenericUser>> =
            Arc::new(InMemoryUserProvider::new(hasher.clone()).with_user(ada));

        let mut config = AuthConfig::default();
        if let Some(GuardConfig::Jwt { options, .. }) = config.guards.get_mut("jwt") {
            *options = JwtGuardConfig::new("secret");
        }
        AuthManager::new(config, hasher).with_provider("users", users)
    }

    #[tokio::test]
    async fn test_session_guard_requires_session() {
        let manager = manager();
        let request = LarixRequest::build(Method::GET, "/");
        assert!(matches!(
            manager.default_guard(&request).err(),
            Some(AuthError::SessionError { .. })
        ));

        let mut request = LarixRequest::build(Method::POST, "/login");
        request.insert_extension(Session::new());
        let guard = manager.default_guard(&request).unwrap();
        assert_eq!(guard.name(), "web");
        let creds = credentials([("email", "ada@example.com"), ("password", "secret")]);
        assert!(guard.attempt(&creds, false).await.unwrap());
    }

    #[tokio::test]
    async fn test_api_and_jwt_guards() {
        let manager = manager();
        let request = LarixRequest::build(Method::GET, "/api/me?api_token=plain-token");
        let api = manager.guard("api", &request).unwrap();
        assert!(api.check().await);

        let jwt = manager.jwt_guard("jwt", &request).unwrap();
        let token = jwt.issue("1").unwrap();
        let request = LarixRequest::build(Method::GET, "/api/me")
            .with_header("authorization", &format!("Bearer {}", token));
        assert!(manager.guard("jwt", &request).unwrap().check().await);
        assert!(manager.jwt_guard("web", &request).is_err());
    }

    #[test]
    fn test_unknown_guard_and_provider() {
        let manager = manager();
        let request = LarixRequest::build(Method::GET, "/");
        assert!(matches!(
            manager.guard("admin", &request).err(),
            Some(AuthError::ConfigurationError { .. })
        ));

        let bare: AuthManager<GenericUser> =
            AuthManager::new(AuthConfig::default(), Arc::new(HashManager::default()));
        assert!(matches!(
            bare.guard("api", &request).err(),
            Some(AuthError::ConfigurationError { .. })
        ));
        assert_eq!(manager.guard_names(), vec!["api", "jwt", "web"]);
    }
}
