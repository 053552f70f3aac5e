//! End-to-end requests through the axum bridge, kernel, sessions and
//! maintenance mode.

use axum::body::Body;
use axum::extract::Request;
use http_body_util::BodyExt;
use larix_http::{
    GroupAttributes, HttpKernel, LarixRequest, LarixResponse, MaintenanceMiddleware,
    MaintenanceMode, MaintenancePayload, MemorySessionStore, Middleware, RequestIdMiddleware,
    Router, Server, Session, StartSession, StatusCode,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(base: &TempDir) -> axum::Router {
    let mut router = Router::new();
    router.get("/", |_req| async { Ok(LarixResponse::text("home")) });
    router.group(GroupAttributes::new().prefix("api").name("api.").middleware(["api"]), |r| {
        r.get("/users/{id}", |req: LarixRequest| async move {
            let id: u64 = req.path_param_parsed("id")?;
            Ok(LarixResponse::json_ok(&json!({"id": id, "route": req.route_name()})))
        })
        .name("users.show")
        .where_number("id");
    });
    router.group(GroupAttributes::new().middleware(["web"]), |r| {
        r.post("/visits", |req: LarixRequest| async move {
            let session = req
                .get_extension::<Session>()
                .cloned()
                .ok_or_else(|| larix_http::HttpError::internal("session missing"))?;
            let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
            session.put("visits", visits);
            Ok(LarixResponse::json_ok(&json!({"visits": visits})))
        });
    });

    let store = Arc::new(MemorySessionStore::new());
    let mut kernel = HttpKernel::new(router);
    kernel
        .prepend_middleware(MaintenanceMiddleware::new(MaintenanceMode::new(base.path())))
        .push_middleware(RequestIdMiddleware::new())
        .alias("session", move |_params| {
            Ok(Arc::new(StartSession::new(store.clone())) as Arc<dyn Middleware>)
        })
        .middleware_group("web", ["session"]);

    Server::new(kernel).unwrap().into_axum_router()
}

async fn send(app: &axum::Router, request: Request) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

fn json_of(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_named_group_route_with_constraint() {
    let base = TempDir::new().unwrap();
    let app = app(&base);

    let (status, headers, body) = send(
        &app,
        Request::builder().uri("/api/users/12").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(json_of(&body), json!({"id": 12, "route": "api.users.show"}));

    let (status, _, body) = send(
        &app,
        Request::builder()
            .uri("/api/users/abc")
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_of(&body)["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_session_survives_between_requests() {
    let base = TempDir::new().unwrap();
    let app = app(&base);

    let (status, headers, body) = send(
        &app,
        Request::builder().method("POST").uri("/visits").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["visits"], 1);

    let cookie = headers
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("larix_session="));

    let (_, _, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/visits")
            .header("cookie", cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(json_of(&body)["visits"], 2);
}

#[tokio::test]
async fn test_maintenance_mode_blocks_everything_but_bypass() {
    let base = TempDir::new().unwrap();
    let app = app(&base);
    let mode = MaintenanceMode::new(base.path());
    mode.enable(&MaintenancePayload::new().secret("open-sesame").retry(60))
        .unwrap();

    let (status, headers, _) =
        send(&app, Request::builder().uri("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(headers.get("retry-after").unwrap(), "60");

    let (status, _, body) = send(
        &app,
        Request::builder().uri("/?bypass=open-sesame").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"home");

    mode.disable().unwrap();
    let (status, _, _) = send(&app, Request::builder().uri("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}
