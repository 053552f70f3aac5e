//! Login, protected routes and abilities through the HTTP kernel with real sessions.

use larix_auth::{
    credentials, register_middleware, Algorithm, AuthConfig, AuthManager, AuthUser, Authenticatable,
    BcryptHasher, Gate, GenericUser, HashManager, InMemoryUserProvider, PasswordHasher,
    UserProvider,
};
use larix_http::{
    HttpError, HttpKernel, LarixRequest, LarixResponse, MemorySessionStore, Method, Middleware,
    Router, StartSession, StatusCode,
};
use serde_json::json;
use std::sync::Arc;

fn kernel() -> Arc<HttpKernel> {
    let hasher = Arc::new(HashManager::new(Algorithm::Bcrypt).with_bcrypt(BcryptHasher::new(4)));
    let users: Arc<dyn UserProvider<GenericUser>> = Arc::new(
        InMemoryUserProvider::new(hasher.clone())
            .with_user(
                serde_json::from_value(json!({
                    "id": 1,
                    "email": "ada@example.com",
                    "password": hasher.hash("secret").unwrap(),
                    "roles": ["admin"]
                }))
                .unwrap(),
            )
            .with_user(
                serde_json::from_value(json!({
                    "id": 2,
                    "email": "bob@example.com",
                    "password": hasher.hash("hunter22").unwrap()
                }))
                .unwrap(),
            ),
    );
    let manager = Arc::new(
        AuthManager::new(AuthConfig::default(), hasher).with_provider("users", users),
    );

    let mut gate = Gate::<GenericUser>::new();
    gate.define("manage-users", |user: &GenericUser| {
        user.roles().iter().any(|r| r == "admin")
    });

    let mut router = Router::new();
    let login_manager = manager.clone();
    router.group(
        larix_http::GroupAttributes::new().middleware(["web"]),
        |r| {
            r.post("/login", move |req: LarixRequest| {
                let manager = login_manager.clone();
                async move {
                    let guard = manager.guard("web", &req).map_err(HttpError::from)?;
                    let email = req.input_str("email").unwrap_or_default();
                    let password = req.input_str("password").unwrap_or_default();
                    let creds = credentials([("email", email.as_str()), ("password", password.as_str())]);
                    if guard.attempt(&creds, false).await.map_err(HttpError::from)? {
                        Ok(LarixResponse::redirect("/dashboard"))
                    } else {
                        Ok(LarixResponse::redirect("/login"))
                    }
                }
            })
            .middleware(["guest"]);
            r.get("/login", |_req| async { Ok(LarixResponse::text("login form")) })
                .middleware(["guest"]);
            r.get("/dashboard", |req: LarixRequest| async move {
                let user = req
                    .get_extension::<AuthUser<GenericUser>>()
                    .ok_or_else(|| HttpError::internal("no user"))?;
                Ok(LarixResponse::text(format!(
                    "hello {}",
                    user.0.get_str("email").unwrap_or_default()
                )))
            })
            .middleware(["auth"]);
            r.get("/admin/users", |_req| async { Ok(LarixResponse::text("users")) })
                .middleware(["auth", "can:manage-users"]);
        },
    );

    let store = Arc::new(MemorySessionStore::new());
    let mut kernel = HttpKernel::new(router);
    kernel
        .alias("session", move |_params| {
            Ok(Arc::new(StartSession::new(store.clone())) as Arc<dyn Middleware>)
        })
        .middleware_group("web", ["session"]);
    register_middleware(&mut kernel, manager, Arc::new(gate));
    Arc::new(kernel)
}

fn session_cookie(response: &LarixResponse) -> String {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .last()
        .and_then(|v| v.split(';').next())
        .map(String::from)
        .unwrap_or_default()
}

fn location(response: &LarixResponse) -> Option<String> {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

async fn login(kernel: &Arc<HttpKernel>, email: &str, password: &str) -> LarixResponse {
    let request = LarixRequest::build(Method::POST, "/login")
        .with_header("content-type", "application/json")
        .with_body(json!({"email": email, "password": password}).to_string());
    kernel.clone().handle(request).await
}

#[tokio::test]
async fn test_guest_is_sent_to_login() {
    let kernel = kernel();
    let response = kernel
        .clone()
        .handle(LarixRequest::build(Method::GET, "/dashboard"))
        .await;
    assert_eq!(response.status_code(), StatusCode::FOUND);
    assert_eq!(location(&response).as_deref(), Some("/login"));

    let request =
        LarixRequest::build(Method::GET, "/dashboard").with_header("accept", "application/json");
    let response = kernel.clone().handle(request).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_then_visit_dashboard() {
    let kernel = kernel();
    let response = login(&kernel, "ada@example.com", "secret").await;
    assert_eq!(location(&response).as_deref(), Some("/dashboard"));
    let cookie = session_cookie(&response);
    assert!(!cookie.is_empty());

    let request = LarixRequest::build(Method::GET, "/dashboard").with_header("cookie", &cookie);
    let response = kernel.clone().handle(request).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.body_text(), "hello ada@example.com");

    // logged-in users do not see the login form
    let request = LarixRequest::build(Method::GET, "/login").with_header("cookie", &cookie);
    let response = kernel.clone().handle(request).await;
    assert_eq!(location(&response).as_deref(), Some("/home"));
}

#[tokio::test]
async fn test_wrong_password_stays_guest() {
    let kernel = kernel();
    let response = login(&kernel, "ada@example.com", "nope").await;
    assert_eq!(location(&response).as_deref(), Some("/login"));

    let cookie = session_cookie(&response);
    let request = LarixRequest::build(Method::GET, "/dashboard").with_header("cookie", &cookie);
    let response = kernel.clone().handle(request).await;
    assert_eq!(location(&response).as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_ability_middleware() {
    let kernel = kernel();

    let cookie = session_cookie(&login(&kernel, "ada@example.com", "secret").await);
    let request = LarixRequest::build(Method::GET, "/admin/users").with_header("cookie", &cookie);
    assert_eq!(kernel.clone().handle(request).await.status_code(), StatusCode::OK);

    let cookie = session_cookie(&login(&kernel, "bob@example.com", "hunter22").await);
    let request = LarixRequest::build(Method::GET, "/admin/users").with_header("cookie", &cookie);
    assert_eq!(
        kernel.clone().handle(request).await.status_code(),
        StatusCode::FORBIDDEN
    );
}
