//! Server: bridges axum and the kernel
//!
//! Every request lands in a single fallback service which buffers the body,
//! builds a `LarixRequest` and hands it to the [`HttpKernel`].

use crate::errors::{HttpError, HttpResult};
use crate::kernel::{render_error, HttpKernel};
use crate::request::LarixRequest;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    response::Response,
};
use http_body_util::{BodyExt, Limited};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Default request body limit (2 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Server {
    kernel: Arc<HttpKernel>,
    body_limit: usize,
}

impl Server {
    /// Build a server; rejects kernels with invalid routes or middleware
    pub fn new(kernel: HttpKernel) -> HttpResult<Self> {
        kernel.validate()?;
        Ok(Self {
            kernel: Arc::new(kernel),
            body_limit: DEFAULT_BODY_LIMIT,
        })
    }

    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn kernel(&self) -> &Arc<HttpKernel> {
        &self.kernel
    }

    /// The axum router serving every path through the kernel
    pub fn into_axum_router(self) -> axum::Router {
        let kernel = self.kernel;
        let limit = self.body_limit;
        axum::Router::new().fallback(move |request: Request| {
            let kernel = kernel.clone();
            async move { handle_axum_request(kernel, limit, request).await }
        })
    }

    /// Bind `addr` and serve until Ctrl+C or SIGTERM
    pub async fn listen(self, addr: &str) -> HttpResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| HttpError::startup(format!("Failed to bind to {}: {}", addr, e)))?;
        let local = listener
            .local_addr()
            .map_err(|e| HttpError::startup(e.to_string()))?;

        info!(address = %local, routes = self.kernel.router().len(), "server listening");

        let router = self.into_axum_router().layer(TraceLayer::new_for_http());
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| HttpError::internal(format!("Server error: {}", e)))?;

        info!("server stopped");
        Ok(())
    }
}

/// Convert an axum request, run the kernel and convert the response back
pub async fn handle_axum_request(
    kernel: Arc<HttpKernel>,
    body_limit: usize,
    request: Request,
) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let remote = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let bytes = match Limited::new(body, body_limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Rejected request body: {}", e);
            let error = HttpError::bad_request("Request body is too large or unreadable");
            return render_error(error, true, false).into_axum();
        }
    };

    let mut larix_request =
        LarixRequest::new(parts.method, parts.uri, parts.headers).with_body(bytes);
    if let Some(addr) = remote {
        larix_request = larix_request.with_remote_addr(addr);
    }

    kernel.handle(larix_request).await.into_axum()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, shutting down gracefully"),
        _ = terminate => warn!("Received terminate signal, shutting down gracefully"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::LarixResponse;
    use crate::routing::Router;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server() -> Server {
        let mut router = Router::new();
        router.post("/echo", |req| async move {
            Ok(LarixResponse::text(req.body_text().unwrap_or_default()))
        });
        router.get("/ip", |req| async move { Ok(LarixResponse::text(req.ip())) });
        Server::new(HttpKernel::new(router)).unwrap()
    }

    #[tokio::test]
    async fn test_fallback_bridges_requests() {
        let app = server().into_axum_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let app = server().body_limit(4).into_axum_router();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from("way too long"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_route_is_404() {
        let app = server().into_axum_router();
        let response = app
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_router_is_rejected() {
        let mut router = Router::new();
        router.get("/broken/{id", |_req| async { Ok(LarixResponse::ok()) });
        assert!(Server::new(HttpKernel::new(router)).is_err());
    }
}
