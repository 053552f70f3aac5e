//! Guards decide who the current user is for one request

pub mod jwt;
pub mod session;
pub mod token;

pub use jwt::{JwtBlacklist, JwtClaims, JwtGuard, JwtGuardConfig};
pub use session::{SessionGuard, SESSION_USER_KEY};
pub use token::{TokenGuard, TokenGuardConfig};

use crate::providers::{Credentials, UserProvider};
use crate::user::Authenticatable;
use crate::AuthResult;
use async_trait::async_trait;

#[async_trait]
pub trait Guard<U: Authenticatable>: Send + Sync {
    fn name(&self) -> &str;

    /// The authenticated user, loaded lazily and cached for the request
    async fn user(&self) -> AuthResult<Option<U>>;

    async fn check(&self) -> bool {
        matches!(self.user().await, Ok(Some(_)))
    }

    async fn guest(&self) -> bool {
        !self.check().await
    }

    async fn id(&self) -> AuthResult<Option<String>> {
        Ok(self.user().await?.map(|user| user.auth_identifier()))
    }

    /// Check credentials without logging anyone in
    async fn validate(&self, credentials: &Credentials) -> AuthResult<bool>;

    async fn attempt(&self, credentials: &Credentials, remember: bool) -> AuthResult<bool>;

    async fn login(&self, user: U, remember: bool) -> AuthResult<()>;

    async fn logout(&self) -> AuthResult<()>;

    /// Authenticate for this request only, nothing is persisted
    async fn once(&self, credentials: &Credentials) -> AuthResult<bool>;

    fn set_user(&self, user: U);
}

/// Look a user up by credentials and check the password
pub(crate) async fn user_for_credentials<U: Authenticatable>(
    provider: &dyn UserProvider<U>,
    credentials: &Credentials,
) -> AuthResult<Option<U>> {
    let user = match provider.retrieve_by_credentials(credentials).await? {
        Some(user) => user,
        None => return Ok(None),
    };
    if provider.validate_credentials(&user, credentials).await? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}
