//! Stateless API token guard

use super::Guard;
use crate::providers::{Credentials, UserProvider};
use crate::user::Authenticatable;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use larix_http::session::random_string;
use larix_http::LarixRequest;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const API_TOKEN_LENGTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenGuardConfig {
    /// Query/form field carrying the token
    pub input_key: String,
    /// Users column holding the token
    pub storage_key: String,
    /// Store and compare sha256 hashes instead of plain tokens
    pub hash: bool,
}

impl Default for TokenGuardConfig {
    fn default() -> Self {
        Self {
            input_key: "api_token".to_string(),
            storage_key: "api_token".to_string(),
            hash: true,
        }
    }
}

pub struct TokenGuard<U> {
    name: String,
    config: TokenGuardConfig,
    provider: Arc<dyn UserProvider<U>>,
    token: Option<String>,
    user: RwLock<Option<U>>,
}

impl<U: Authenticatable> TokenGuard<U> {
    pub fn new(
        name: impl Into<String>,
        config: TokenGuardConfig,
        provider: Arc<dyn UserProvider<U>>,
        request: &LarixRequest,
    ) -> Self {
        let token = Self::token_from_request(&config, request);
        Self {
            name: name.into(),
            config,
            provider,
            token,
            user: RwLock::new(None),
        }
    }

    /// Bearer header first, then the query string, then form/JSON input
    pub fn token_from_request(config: &TokenGuardConfig, request: &LarixRequest) -> Option<String> {
        request
            .bearer_token()
            .or_else(|| request.query_param(&config.input_key).cloned())
            .or_else(|| request.input_str(&config.input_key))
            .filter(|token| !token.is_empty())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// New plain token to hand to the client
    pub fn generate_token() -> String {
        random_string(API_TOKEN_LENGTH)
    }

    /// Hex sha256 of a token, the form stored when hashing is on
    pub fn hash_token(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    async fn user_for_token(&self, token: &str) -> AuthResult<Option<U>> {
        let stored = if self.config.hash {
            Self::hash_token(token)
        } else {
            token.to_string()
        };
        self.provider
            .retrieve_by_field(&self.config.storage_key, &stored)
            .await
    }
}

#[async_trait]
impl<U: Authenticatable> Guard<U> for TokenGuard<U> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn user(&self) -> AuthResult<Option<U>> {
        let cached = self.user.read().clone();
        if cached.is_some() {
            return Ok(cached);
        }
        let token = match &self.token {
            Some(token) => token,
            None => return Ok(None),
        };
        let user = self.user_for_token(token).await?;
        if let Some(found) = &user {
            *self.user.write() = Some(found.clone());
        }
        Ok(user)
    }

    async fn validate(&self, credentials: &Credentials) -> AuthResult<bool> {
        match credentials.get(&self.config.input_key) {
            Some(token) if !token.is_empty() => Ok(self.user_for_token(token).await?.is_some()),
            _ => Ok(false),
        }
    }

    async fn attempt(&self, _credentials: &Credentials, _remember: bool) -> AuthResult<bool> {
        Err(AuthError::unsupported("attempt"))
    }

    async fn login(&self, _user: U, _remember: bool) -> AuthResult<()> {
        Err(AuthError::unsupported("login"))
    }

    async fn logout(&self) -> AuthResult<()> {
        *self.user.write() = None;
        Ok(())
    }

    async fn once(&self, credentials: &Credentials) -> AuthResult<bool> {
        let token = match credentials.get(&self.config.input_key) {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(false),
        };
        match self.user_for_token(token).await? {
            Some(user) => {
                self.set_user(user);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_user(&self, user: U) {
        *self.user.write() = Some(user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashManager;
    use crate::providers::{credentials, InMemoryUserProvider};
    use crate::user::GenericUser;
    use larix_http::Method;
    use serde_json::json;

    const PLAIN: &str = "plain-api-token";

    fn provider(hash: bool) -> Arc<dyn UserProvider<GenericUser>> {
        let stored = if hash {
            TokenGuard::<GenericUser>::hash_token(PLAIN)
        } else {
            PLAIN.to_string()
        };
        let user: GenericUser =
            serde_json::from_value(json!({"id": 3, "name": "api", "api_token": stored})).unwrap();
        Arc::new(InMemoryUserProvider::new(Arc::new(HashManager::default())).with_user(user))
    }

    fn guard(request: &LarixRequest, hash: bool) -> TokenGuard<GenericUser> {
        let config = TokenGuardConfig {
            hash,
            ..TokenGuardConfig::default()
        };
        TokenGuard::new("api", config, provider(hash), request)
    }

    #[tokio::test]
    async fn test_token_sources() {
        let bearer = LarixRequest::build(Method::GET, "/api/me")
            .with_header("authorization", &format!("Bearer {}", PLAIN));
        assert_eq!(guard(&bearer, true).id().await.unwrap(), Some("3".to_string()));

        let query = LarixRequest::build(Method::GET, &format!("/api/me?api_token={}", PLAIN));
        assert!(guard(&query, true).check().await);

        let form = LarixRequest::build(Method::POST, "/api/me")
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_body(format!("api_token={}", PLAIN));
        assert!(guard(&form, true).check().await);

        let none = LarixRequest::build(Method::GET, "/api/me");
        assert!(guard(&none, true).guest().await);
    }

    #[tokio::test]
    async fn test_plain_storage_and_wrong_token() {
        let request = LarixRequest::build(Method::GET, "/api/me")
            .with_header("authorization", &format!("Bearer {}", PLAIN));
        assert!(guard(&request, false).check().await);
        // hashed lookup does not match a plain column
        let mismatch = TokenGuard::new("api", TokenGuardConfig::default(), provider(false), &request);
        assert!(mismatch.guest().await);
    }

    #[tokio::test]
    async fn test_validate_once_and_unsupported() {
        let request = LarixRequest::build(Method::GET, "/");
        let guard = guard(&request, true);
        assert!(guard.validate(&credentials([("api_token", PLAIN)])).await.unwrap());
        assert!(!guard.validate(&credentials([("api_token", "nope")])).await.unwrap());
        assert!(guard.guest().await);

        assert!(guard.once(&credentials([("api_token", PLAIN)])).await.unwrap());
        assert!(guard.check().await);

        let err = guard.attempt(&credentials([("api_token", PLAIN)]), false).await.unwrap_err();
        assert!(matches!(err, AuthError::Unsupported { .. }));
    }

    #[test]
    fn test_generate_and_hash() {
        let token = TokenGuard::<GenericUser>::generate_token();
        assert_eq!(token.len(), API_TOKEN_LENGTH);
        let hashed = TokenGuard::<GenericUser>::hash_token("abc");
        assert_eq!(
            hashed,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
