//! Route middleware: `auth`, `guest` and `can:<ability>`

use crate::gate::Gate;
use crate::manager::AuthManager;
use crate::user::Authenticatable;
use crate::AuthError;
use larix_http::{
    render_error, HttpError, HttpKernel, LarixRequest, LarixResponse, Middleware, Next, NextFuture,
    UserId, UserRole,
};
use std::fmt;
use std::sync::Arc;

/// The authenticated user, stored as a request extension by [`Authenticate`]
#[derive(Debug, Clone)]
pub struct AuthUser<U>(pub U);

/// Name of the guard that authenticated the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGuardName(pub String);

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/home";

fn expects_json(request: &LarixRequest) -> bool {
    request.wants_json() || request.is_ajax()
}

/// Requires one of `guards` (the default guard when empty) to have a user
pub struct Authenticate<U: Authenticatable> {
    manager: Arc<AuthManager<U>>,
    guards: Vec<String>,
    login_path: String,
}

impl<U: Authenticatable> Authenticate<U> {
    pub fn new(manager: Arc<AuthManager<U>>) -> Self {
        Self {
            manager,
            guards: Vec::new(),
            login_path: LOGIN_PATH.to_string(),
        }
    }

    pub fn guards<I, S>(mut self, guards: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guards = guards.into_iter().map(Into::into).collect();
        self
    }

    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }
}

impl<U: Authenticatable> fmt::Debug for Authenticate<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticate")
            .field("guards", &self.guards)
            .field("login_path", &self.login_path)
            .finish()
    }
}

impl<U: Authenticatable> Middleware for Authenticate<U> {
    fn handle(&self, mut request: LarixRequest, next: Next) -> NextFuture<'static> {
        let manager = self.manager.clone();
        let guards = if self.guards.is_empty() {
            vec![manager.default_guard_name().to_string()]
        } else {
            self.guards.clone()
        };
        let login_path = self.login_path.clone();

        Box::pin(async move {
            let wants_json = expects_json(&request);
            for name in &guards {
                let guard = match manager.guard(name, &request) {
                    Ok(guard) => guard,
                    Err(e) => {
                        tracing::error!(guard = %name, "Cannot build auth guard: {}", e);
                        return render_error(HttpError::internal(e.to_string()), wants_json, false);
                    }
                };
                match guard.user().await {
                    Ok(Some(user)) => {
                        tracing::debug!(guard = %name, user_id = %user.auth_identifier(), "Authenticated");
                        request.insert_extension(UserId(user.auth_identifier()));
                        if let Some(role) = user.roles().into_iter().next() {
                            request.insert_extension(UserRole(role));
                        }
                        request.insert_extension(AuthGuardName(name.clone()));
                        request.insert_extension(AuthUser(user));
                        return next.run(request).await;
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(guard = %name, "Guard lookup failed: {}", e);
                        continue;
                    }
                }
            }

            if wants_json {
                render_error(HttpError::Unauthorized, true, false)
            } else {
                LarixResponse::redirect(&login_path)
            }
        })
    }

    fn name(&self) -> &'static str {
        "Authenticate"
    }
}

/// Sends already authenticated users away, e.g. from the login form
pub struct RedirectIfAuthenticated<U: Authenticatable> {
    manager: Arc<AuthManager<U>>,
    guards: Vec<String>,
    home_path: String,
}

impl<U: Authenticatable> RedirectIfAuthenticated<U> {
    pub fn new(manager: Arc<AuthManager<U>>) -> Self {
        Self {
            manager,
            guards: Vec::new(),
            home_path: HOME_PATH.to_string(),
        }
    }

    pub fn guards<I, S>(mut self, guards: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guards = guards.into_iter().map(Into::into).collect();
        self
    }

    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }
}

impl<U: Authenticatable> fmt::Debug for RedirectIfAuthenticated<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedirectIfAuthenticated")
            .field("guards", &self.guards)
            .field("home_path", &self.home_path)
            .finish()
    }
}

impl<U: Authenticatable> Middleware for RedirectIfAuthenticated<U> {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        let manager = self.manager.clone();
        let guards = if self.guards.is_empty() {
            vec![manager.default_guard_name().to_string()]
        } else {
            self.guards.clone()
        };
        let home_path = self.home_path.clone();

        Box::pin(async move {
            for name in &guards {
                // a guard that cannot run here means nobody is logged in through it
                let Ok(guard) = manager.guard(name, &request) else {
                    continue;
                };
                if guard.check().await {
                    return LarixResponse::redirect(&home_path);
                }
            }
            next.run(request).await
        })
    }

    fn name(&self) -> &'static str {
        "RedirectIfAuthenticated"
    }
}

/// Requires the authenticated user to pass `ability` on the gate
pub struct Authorize<U: Authenticatable> {
    gate: Arc<Gate<U>>,
    ability: String,
}

impl<U: Authenticatable> Authorize<U> {
    pub fn new(gate: Arc<Gate<U>>, ability: impl Into<String>) -> Self {
        Self {
            gate,
            ability: ability.into(),
        }
    }
}

impl<U: Authenticatable> fmt::Debug for Authorize<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorize").field("ability", &self.ability).finish()
    }
}

impl<U: Authenticatable> Middleware for Authorize<U> {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        let wants_json = expects_json(&request);
        let decision = request
            .get_extension::<AuthUser<U>>()
            .map(|user| self.gate.authorize(&user.0, &self.ability));
        let ability = self.ability.clone();

        Box::pin(async move {
            match decision {
                None => render_error(HttpError::Unauthorized, wants_json, false),
                Some(Ok(())) => next.run(request).await,
                Some(Err(e)) => {
                    tracing::info!(ability = %ability, path = %request.path(), "Authorization denied");
                    render_error(HttpError::from(e), wants_json, false)
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "Authorize"
    }
}

/// Register `auth[:guard,...]`, `guest[:guard,...]` and `can:<ability>` on a kernel
pub fn register_middleware<U: Authenticatable>(
    kernel: &mut HttpKernel,
    manager: Arc<AuthManager<U>>,
    gate: Arc<Gate<U>>,
) {
    let auth_manager = manager.clone();
    kernel.alias("auth", move |guards| {
        Ok(Arc::new(Authenticate::new(auth_manager.clone()).guards(guards)) as Arc<dyn Middleware>)
    });
    kernel.alias("guest", move |guards| {
        Ok(Arc::new(RedirectIfAuthenticated::new(manager.clone()).guards(guards)) as Arc<dyn Middleware>)
    });
    kernel.alias("can", move |params| {
        let ability = params.into_iter().next().ok_or_else(|| {
            HttpError::from(AuthError::config_error("The can middleware needs an ability, e.g. can:edit-posts"))
        })?;
        Ok(Arc::new(Authorize::new(gate.clone(), ability)) as Arc<dyn Middleware>)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::hashing::{Algorithm, BcryptHasher, HashManager};
    use crate::providers::{InMemoryUserProvider, UserProvider};
    use crate::user::GenericUser;
    use larix_http::{Method, MiddlewarePipeline, Session, StatusCode};
    use serde_json::json;

    fn manager() -> Arc<AuthManager<GenericUser>> {
        let hasher = Arc::new(HashManager::new(Algorithm::Bcrypt).with_bcrypt(BcryptHasher::new(4)));
        let user: GenericUser = serde_json::from_value(json!({
            "id": 7, "email": "grace@example.com", "password": "", "api_token": "t0k3n", "roles": "admin"
        }))
        .unwrap();
        let users: Arc<dyn UserProvider<GenericUser>> =
            Arc::new(InMemoryUserProvider::new(hasher.clone()).with_user(user));
        Arc::new(AuthManager::new(AuthConfig::default(), hasher).with_provider("users", users))
    }

    fn session_request(path: &str, user_id: Option<i64>) -> LarixRequest {
        let mut request = LarixRequest::build(Method::GET, path);
        let session = Session::new();
        if let Some(id) = user_id {
            session.put(crate::guards::SESSION_USER_KEY, id.to_string());
        }
        request.insert_extension(session);
        request
    }

    fn location(response: &LarixResponse) -> Option<&str> {
        response.headers().get("location").and_then(|v| v.to_str().ok())
    }

    async fn echo_user(request: LarixRequest) -> LarixResponse {
        let id = request
            .get_extension::<UserId>()
            .map(|u| u.0.clone())
            .unwrap_or_default();
        LarixResponse::text(id)
    }

    #[tokio::test]
    async fn test_authenticate_redirects_or_401() {
        let pipeline = MiddlewarePipeline::new().add(Authenticate::new(manager()));

        let response = pipeline.execute(session_request("/dashboard", None), echo_user).await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(location(&response), Some("/login"));

        let request = session_request("/dashboard", None).with_header("accept", "application/json");
        let response = pipeline.execute(request, echo_user).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authenticate_sets_user() {
        let pipeline = MiddlewarePipeline::new().add(Authenticate::new(manager()));
        let response = pipeline.execute(session_request("/dashboard", Some(7)), echo_user).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.body_text(), "7");

        let response = pipeline
            .execute(session_request("/dashboard", Some(7)), |request: LarixRequest| async move {
                let role = request.get_extension::<UserRole>().map(|r| r.0.clone());
                LarixResponse::text(role.unwrap_or_default())
            })
            .await;
        assert_eq!(response.body_text(), "admin");
    }

    #[tokio::test]
    async fn test_authenticate_tries_each_guard() {
        let pipeline =
            MiddlewarePipeline::new().add(Authenticate::new(manager()).guards(["api"]));
        let request = LarixRequest::build(Method::GET, "/api/me?api_token=t0k3n");
        let response = pipeline.execute(request, echo_user).await;
        assert_eq!(response.body_text(), "7");
    }

    #[tokio::test]
    async fn test_guest_redirects_logged_in_users() {
        let pipeline = MiddlewarePipeline::new().add(RedirectIfAuthenticated::new(manager()));
        let response = pipeline.execute(session_request("/login", Some(7)), echo_user).await;
        assert_eq!(location(&response), Some("/home"));

        let response = pipeline.execute(session_request("/login", None), echo_user).await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn test_authorize() {
        let mut gate = Gate::<GenericUser>::new();
        gate.define("admin-panel", |user: &GenericUser| user.roles().contains(&"admin".to_string()));
        let gate = Arc::new(gate);

        let pipeline = MiddlewarePipeline::new()
            .add(Authenticate::new(manager()))
            .add(Authorize::new(gate.clone(), "admin-panel"));
        let response = pipeline.execute(session_request("/admin", Some(7)), echo_user).await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let pipeline = MiddlewarePipeline::new()
            .add(Authenticate::new(manager()))
            .add(Authorize::new(gate.clone(), "billing"));
        let response = pipeline.execute(session_request("/billing", Some(7)), echo_user).await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
        assert!(logs_contain("Authorization denied"));

        let pipeline = MiddlewarePipeline::new().add(Authorize::new(gate, "admin-panel"));
        let request = session_request("/admin", None).with_header("accept", "application/json");
        let response = pipeline.execute(request, echo_user).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }
}
