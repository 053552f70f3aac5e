//! JWT (JSON Web Token) guard
//!
//! Tokens are HS256-signed and carry the user identifier in `sub`. Logging
//! out revokes the token's `jti` until it would have expired anyway.

use super::{user_for_credentials, Guard};
use crate::providers::{Credentials, UserProvider};
use crate::user::Authenticatable;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use larix_http::LarixRequest;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Claims carried by every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtGuardConfig {
    pub secret: String,
    pub ttl_minutes: i64,
    pub issuer: String,
}

impl Default for JwtGuardConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_minutes: 60,
            issuer: "larix".to_string(),
        }
    }
}

impl fmt::Debug for JwtGuardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtGuardConfig")
            .field("secret", &"[redacted]")
            .field("ttl_minutes", &self.ttl_minutes)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtGuardConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Self::default()
        }
    }

    pub fn ttl_minutes(mut self, minutes: i64) -> Self {
        self.ttl_minutes = minutes;
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// Revoked token ids, shared by every guard instance of an application
#[derive(Debug, Default)]
pub struct JwtBlacklist {
    revoked: Mutex<HashMap<String, i64>>,
}

impl JwtBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `jti` until `expires_at` (unix seconds)
    pub fn revoke(&self, jti: &str, expires_at: i64) {
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.lock();
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(jti.to_string(), expires_at);
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.lock().contains_key(jti)
    }

    pub fn len(&self) -> usize {
        self.revoked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct JwtGuard<U> {
    name: String,
    config: JwtGuardConfig,
    provider: Arc<dyn UserProvider<U>>,
    blacklist: Arc<JwtBlacklist>,
    token: RwLock<Option<String>>,
    user: RwLock<Option<U>>,
}

impl<U: Authenticatable> JwtGuard<U> {
    pub fn new(
        name: impl Into<String>,
        config: JwtGuardConfig,
        provider: Arc<dyn UserProvider<U>>,
        blacklist: Arc<JwtBlacklist>,
        request: &LarixRequest,
    ) -> AuthResult<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::config_error("JWT guard requires a secret"));
        }
        Ok(Self {
            name: name.into(),
            config,
            provider,
            blacklist,
            token: RwLock::new(request.bearer_token()),
            user: RwLock::new(None),
        })
    }

    /// Current token: the request's bearer token or one issued by `attempt`/`login`
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Sign a fresh token for `subject`
    pub fn issue(&self, subject: &str) -> AuthResult<String> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            sub: subject.to_string(),
            iat: now,
            exp: now + self.config.ttl_minutes * 60,
            iss: self.config.issuer.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Verify signature, issuer, expiry and revocation
    pub fn decode(&self, token: &str) -> AuthResult<JwtClaims> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = 0;

        let data = decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        )?;
        if self.blacklist.is_revoked(&data.claims.jti) {
            return Err(AuthError::token_error("Token has been revoked"));
        }
        Ok(data.claims)
    }

    /// Claims of the current token, if it is valid
    pub fn payload(&self) -> Option<JwtClaims> {
        let token = self.token()?;
        self.decode(&token).ok()
    }

    /// Exchange a valid token for a new one; the old one is revoked
    pub fn refresh(&self, token: &str) -> AuthResult<String> {
        let claims = self.decode(token)?;
        self.blacklist.revoke(&claims.jti, claims.exp);
        let fresh = self.issue(&claims.sub)?;
        *self.token.write() = Some(fresh.clone());
        Ok(fresh)
    }
}

#[async_trait]
impl<U: Authenticatable> Guard<U> for JwtGuard<U> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn user(&self) -> AuthResult<Option<U>> {
        let cached = self.user.read().clone();
        if cached.is_some() {
            return Ok(cached);
        }
        let token = match self.token() {
            Some(token) => token,
            None => return Ok(None),
        };
        let claims = match self.decode(&token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(guard = %self.name, "Rejected JWT: {}", e);
                return Ok(None);
            }
        };
        let user = self.provider.retrieve_by_id(&claims.sub).await?;
        if let Some(found) = &user {
            *self.user.write() = Some(found.clone());
        }
        Ok(user)
    }

    async fn validate(&self, credentials: &Credentials) -> AuthResult<bool> {
        Ok(user_for_credentials(self.provider.as_ref(), credentials)
            .await?
            .is_some())
    }

    async fn attempt(&self, credentials: &Credentials, remember: bool) -> AuthResult<bool> {
        match user_for_credentials(self.provider.as_ref(), credentials).await? {
            Some(user) => {
                self.login(user, remember).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn login(&self, user: U, _remember: bool) -> AuthResult<()> {
        let token = self.issue(&user.auth_identifier())?;
        tracing::info!(guard = %self.name, user_id = %user.auth_identifier(), "JWT issued");
        *self.token.write() = Some(token);
        *self.user.write() = Some(user);
        Ok(())
    }

    async fn logout(&self) -> AuthResult<()> {
        if let Some(claims) = self.payload() {
            self.blacklist.revoke(&claims.jti, claims.exp);
        }
        *self.token.write() = None;
        *self.user.write() = None;
        Ok(())
    }

    async fn once(&self, credentials: &Credentials) -> AuthResult<bool> {
        match user_for_credentials(self.provider.as_ref(), credentials).await? {
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
