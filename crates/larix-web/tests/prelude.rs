use larix::prelude::*;
use larix::HttpKernel;

#[test]
fn test_framework_info() {
    assert_eq!(larix::name(), "larix");
    assert_eq!(larix::version(), env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_router_through_prelude() {
    let mut router = Router::new();
    router
        .get("/", |_req: Request| async { Ok(Response::text("home")) })
        .name("home");
    router.post("/posts", |_req: Request| async {
        Ok(Response::json_ok(&json!({ "created": true })))
    });

    let routes = router.routes();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].name.as_deref(), Some("home"));
    assert_eq!(routes[1].uri, "/posts");
    assert!(router.dispatch(&larix::http::Method::GET, "/").is_ok());
}

#[test]
fn test_environment_reexport() {
    assert!(Environment::Production.is_production());
    assert!(!Environment::Testing.is_production());
}

#[test]
fn test_kernel_serves_prelude_routes() {
    let mut router = Router::new();
    router.get("/ping", |_req: Request| async { Ok(Response::text("pong")) });
    let kernel = std::sync::Arc::new(HttpKernel::new(router));

    let response = tokio_test::block_on(
        kernel
            .clone()
            .handle(Request::build(larix::http::Method::GET, "/ping")),
    );
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.body_text(), "pong");

    let missing = tokio_test::block_on(
        kernel.handle(Request::build(larix::http::Method::GET, "/nope")),
    );
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}
