//! Request ID tracking
//!
//! Reuses an incoming `X-Request-ID` header or generates a UUID v4, stores it
//! on the request and echoes it back on the response.

use super::pipeline::{Middleware, Next, NextFuture};
use crate::request::LarixRequest;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request identifier stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    override_existing: bool,
}

impl RequestIdMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always generate a fresh id, ignoring client supplied ones
    pub fn override_existing(mut self) -> Self {
        self.override_existing = true;
        self
    }
}

impl Middleware for RequestIdMiddleware {
    fn handle(&self, mut request: LarixRequest, next: Next) -> NextFuture<'static> {
        let existing = request
            .header(REQUEST_ID_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from);
        let id = match existing {
            Some(id) if !self.override_existing => id,
            _ => Uuid::new_v4().to_string(),
        };

        Box::pin(async move {
            if let Err(e) = request.add_header(REQUEST_ID_HEADER, &id) {
                tracing::warn!("Could not set request id header: {}", e);
            }
            request.insert_extension(RequestId(id.clone()));
            tracing::debug!(request_id = %id, path = %request.path(), "request started");

            let response = next.run(request).await;
            response.with_header(REQUEST_ID_HEADER, &id)
        })
    }

    fn name(&self) -> &'static str {
        "RequestIdMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewarePipeline;
    use crate::response::LarixResponse;
    use axum::http::Method;

    #[tokio::test]
    async fn test_generates_id_and_exposes_extension() {
        let pipeline = MiddlewarePipeline::new().add(RequestIdMiddleware::new());
        let response = pipeline
            .execute(LarixRequest::build(Method::GET, "/"), |req| async move {
                let id = req.get_extension::<RequestId>().map(|r| r.0.clone()).unwrap_or_default();
                LarixResponse::text(id)
            })
            .await;

        let header = response.get_header(REQUEST_ID_HEADER).unwrap().to_string();
        assert!(Uuid::parse_str(&header).is_ok());
        assert_eq!(response.body_text(), header);
    }

    #[tokio::test]
    async fn test_reuses_incoming_id() {
        let pipeline = MiddlewarePipeline::new().add(RequestIdMiddleware::new());
        let request = LarixRequest::build(Method::GET, "/").with_header("x-request-id", "trace-123");
        let response = pipeline
            .execute(request, |_req| async { LarixResponse::ok() })
            .await;
        assert_eq!(response.get_header(REQUEST_ID_HEADER), Some("trace-123"));
    }

    #[tokio::test]
    async fn test_override_existing() {
        let pipeline = MiddlewarePipeline::new().add(RequestIdMiddleware::new().override_existing());
        let request = LarixRequest::build(Method::GET, "/").with_header("x-request-id", "trace-123");
        let response = pipeline
            .execute(request, |_req| async { LarixResponse::ok() })
            .await;
        assert_ne!(response.get_header(REQUEST_ID_HEADER), Some("trace-123"));
    }
}
