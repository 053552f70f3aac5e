//! Stateful guard backed by the HTTP session

use super::{user_for_credentials, Guard};
use crate::providers::{Credentials, UserProvider};
use crate::user::Authenticatable;
use crate::AuthResult;
use async_trait::async_trait;
use larix_http::session::random_string;
use larix_http::Session;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const SESSION_USER_KEY: &str = "auth_user_id";
pub const REMEMBER_TOKEN_LENGTH: usize = 60;

pub struct SessionGuard<U> {
    name: String,
    session: Session,
    provider: Arc<dyn UserProvider<U>>,
    user: RwLock<Option<U>>,
    logged_out: AtomicBool,
}

impl<U: Authenticatable> SessionGuard<U> {
    pub fn new(name: impl Into<String>, session: Session, provider: Arc<dyn UserProvider<U>>) -> Self {
        Self {
            name: name.into(),
            session,
            provider,
            user: RwLock::new(None),
            logged_out: AtomicBool::new(false),
        }
    }

    /// Session key holding `id|token` for "remember me"
    pub fn remember_key(&self) -> String {
        format!("remember_{}", self.name)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn user_from_recaller(&self) -> AuthResult<Option<U>> {
        let recaller: String = match self.session.get_as(&self.remember_key()) {
            Some(value) => value,
            None => return Ok(None),
        };
        let (id, token) = match recaller.split_once('|') {
            Some(parts) => parts,
            None => return Ok(None),
        };
        let user = self.provider.retrieve_by_token(id, token).await?;
        if let Some(user) = &user {
            self.session.put(SESSION_USER_KEY, user.auth_identifier());
            self.session.regenerate();
            tracing::debug!(guard = %self.name, user_id = %user.auth_identifier(), "User recalled from remember token");
        }
        Ok(user)
    }

    async fn cycle_remember_token(&self, user: &mut U) -> AuthResult<()> {
        let token = random_string(REMEMBER_TOKEN_LENGTH);
        self.provider.update_remember_token(user, &token).await
    }
}

#[async_trait]
impl<U: Authenticatable> Guard<U> for SessionGuard<U> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn user(&self) -> AuthResult<Option<U>> {
        if self.logged_out.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let cached = self.user.read().clone();
        if cached.is_some() {
            return Ok(cached);
        }

        let mut user = None;
        if let Some(id) = self.session.get_as::<String>(SESSION_USER_KEY) {
            user = self.provider.retrieve_by_id(&id).await?;
        }
        if user.is_none() {
            user = self.user_from_recaller().await?;
        }

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
            None => {
                tracing::debug!(guard = %self.name, "Login attempt failed");
                Ok(false)
            }
        }
    }

    async fn login(&self, mut user: U, remember: bool) -> AuthResult<()> {
        let id = user.auth_identifier();
        self.session.put(SESSION_USER_KEY, id.clone());
        // a new id on privilege change prevents session fixation
        self.session.regenerate();

        if remember {
            if user.remember_token().map_or(true, str::is_empty) {
                self.cycle_remember_token(&mut user).await?;
            }
            if let Some(token) = user.remember_token() {
                self.session.put(&self.remember_key(), format!("{}|{}", id, token));
            }
        }

        tracing::info!(guard = %self.name, user_id = %id, "User logged in");
        self.logged_out.store(false, Ordering::SeqCst);
        *self.user.write() = Some(user);
        Ok(())
    }

    async fn logout(&self) -> AuthResult<()> {
        let user = self.user().await?;
        if let Some(mut user) = user {
            if user.remember_token().is_some_and(|t| !t.is_empty()) {
                self.cycle_remember_token(&mut user).await?;
            }
            tracing::info!(guard = %self.name, user_id = %user.auth_identifier(), "User logged out");
        }

        self.session.invalidate();
        self.session.regenerate_token();
        *self.user.write() = None;
        self.logged_out.store(true, Ordering::SeqCst);
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
        self.logged_out.store(false, Ordering::SeqCst);
        *self.user.write() = Some(user);
    }
}
