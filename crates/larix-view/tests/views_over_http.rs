//! Rendering views inside the HTTP kernel: the CSRF token printed by a form
//! component must be accepted by the CSRF middleware on submit.

use larix_http::{
    HttpKernel, LarixRequest, LarixResponse, MemorySessionStore, Method, Middleware, Router,
    StartSession, StatusCode,
};
use larix_security::{CsrfConfig, CsrfMiddleware};
use larix_view::{ViewConfig, ViewEngine, ViewFactory};
use regex::Regex;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn views(dir: &TempDir) -> Arc<ViewFactory> {
    let root = dir.path();
    fs::create_dir_all(root.join("layouts")).unwrap();
    fs::create_dir_all(root.join("posts")).unwrap();
    fs::write(
        root.join("layouts/app.html"),
        "<html><title>@yield('title')</title><body>@yield('content')</body></html>",
    )
    .unwrap();
    fs::write(
        root.join("posts/edit.larix.html"),
        r#"@extends('layouts.app')
@section('title', 'Edit ' ~ title)
@section('content')
@component('form', ['action' => $action, 'method' => 'PUT'])
<input name="title" value="{{ $title }}">
@endcomponent
@endsection"#,
    )
    .unwrap();

    let engine = ViewEngine::with_config(ViewConfig::default().path(root)).unwrap();
    Arc::new(ViewFactory::new(engine))
}

fn kernel(factory: Arc<ViewFactory>) -> Arc<HttpKernel> {
    let mut router = Router::new();
    router.group(larix_http::GroupAttributes::new().middleware(["web"]), |r| {
        let views = factory.clone();
        r.get("/posts/{id}/edit", move |req: LarixRequest| {
            let views = views.clone();
            async move {
                let id = req.path_params.get("id").cloned().unwrap_or_default();
                Ok(views
                    .make("posts.edit")
                    .with("action", &format!("/posts/{}", id))
                    .with("title", "Hello <world>")
                    .with_request_context(&req)
                    .into_response()?)
            }
        });
        r.put("/posts/{id}", |req: LarixRequest| async move {
            Ok(LarixResponse::text(format!(
                "updated {}",
                req.input_str("title").unwrap_or_default()
            )))
        });
    });

    let store = Arc::new(MemorySessionStore::new());
    let mut kernel = HttpKernel::new(router);
    kernel
        .alias("session", move |_| {
            Ok(Arc::new(StartSession::new(store.clone())) as Arc<dyn Middleware>)
        })
        .alias("csrf", |_| {
            Ok(Arc::new(CsrfMiddleware::new(CsrfConfig::default())) as Arc<dyn Middleware>)
        })
        .middleware_group("web", ["session", "csrf"]);
    Arc::new(kernel)
}

fn session_cookie(response: &LarixResponse) -> String {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| !v.starts_with("XSRF-TOKEN"))
        .and_then(|v| v.split(';').next())
        .map(String::from)
        .unwrap_or_default()
}

#[tokio::test]
async fn test_form_component_round_trip() {
    let dir = TempDir::new().unwrap();
    let kernel = kernel(views(&dir));

    let response = kernel
        .clone()
        .handle(LarixRequest::build(Method::GET, "/posts/5/edit"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let html = response.body_text();
    assert!(html.contains("<title>Edit Hello &lt;world&gt;</title>"));
    assert!(html.contains(r#"<form method="POST" action="/posts/5">"#));
    assert!(html.contains(r#"<input type="hidden" name="_method" value="PUT">"#));

    let token = Regex::new(r#"name="_token" value="([A-Za-z0-9]+)""#)
        .unwrap()
        .captures(&html)
        .map(|c| c[1].to_string())
        .expect("token in form");
    let cookie = session_cookie(&response);

    let submit = |token: &str| {
        LarixRequest::build(Method::POST, "/posts/5")
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_header("cookie", &cookie)
            .with_body(format!("_method=PUT&_token={}&title=New", token))
    };
    let response = kernel.clone().handle(submit(&token)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.body_text(), "updated New");

    let response = kernel.clone().handle(submit("forged")).await;
    assert_eq!(response.status_code().as_u16(), 419);
}
