//! CORS (Cross-Origin Resource Sharing) middleware

use crate::config::CorsConfig;
use crate::SecurityError;
use axum::http::{Method, StatusCode};
use larix_http::{HttpError, LarixRequest, LarixResponse, Middleware, Next, NextFuture};

#[derive(Debug, Clone, Default)]
pub struct CorsMiddleware {
    config: CorsConfig,
}

impl CorsMiddleware {
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }

    /// Any origin, no credentials
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn allow_origin(mut self, origin: &str) -> Self {
        self.config.allowed_origins.retain(|o| o != "*");
        self.config.allowed_origins.push(origin.to_string());
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.config.allow_credentials = allow;
        self
    }

    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.exposed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.config.max_age = Some(seconds);
        self
    }

    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    fn is_preflight(request: &LarixRequest) -> bool {
        request.method == Method::OPTIONS
            && request.header("access-control-request-method").is_some()
    }

    /// Value for `Access-Control-Allow-Origin`
    fn allow_origin_value(&self, origin: &str) -> String {
        if self.config.allows_any_origin() && !self.config.allow_credentials {
            "*".to_string()
        } else {
            origin.to_string()
        }
    }

    fn preflight(&self, request: &LarixRequest, origin: &str) -> Result<LarixResponse, SecurityError> {
        if let Some(method) = request.header("access-control-request-method") {
            if !self.config.is_method_allowed(method) {
                return Err(SecurityError::cors(format!("Method '{}' not allowed", method)));
            }
        }

        let requested = request.header("access-control-request-headers").unwrap_or("");
        let requested: Vec<&str> = requested
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .collect();
        if let Some(header) = requested.iter().find(|h| !self.config.is_header_allowed(h)) {
            return Err(SecurityError::cors(format!("Header '{}' not allowed", header)));
        }

        let allow_headers = if self.config.allowed_headers.iter().any(|h| h == "*") {
            requested.join(", ")
        } else {
            self.config.allowed_headers.join(", ")
        };

        let mut response = LarixResponse::with_status(StatusCode::NO_CONTENT)
            .with_header("access-control-allow-origin", self.allow_origin_value(origin))
            .with_header("access-control-allow-methods", self.config.allowed_methods.join(", "))
            .with_header("vary", "Origin");
        if !allow_headers.is_empty() {
            response = response.with_header("access-control-allow-headers", allow_headers);
        }
        if let Some(max_age) = self.config.max_age {
            response = response.with_header("access-control-max-age", max_age.to_string());
        }
        if self.config.allow_credentials {
            response = response.with_header("access-control-allow-credentials", "true");
        }
        Ok(response)
    }

    fn decorate(&self, mut response: LarixResponse, origin: &str) -> LarixResponse {
        let allow = self.allow_origin_value(origin);
        if allow != "*" {
            response = response.with_header("vary", "Origin");
        }
        response = response.with_header("access-control-allow-origin", allow);
        if self.config.allow_credentials {
            response = response.with_header("access-control-allow-credentials", "true");
        }
        if !self.config.exposed_headers.is_empty() {
            response = response.with_header(
                "access-control-expose-headers",
                self.config.exposed_headers.join(", "),
            );
        }
        response
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        let cors = self.clone();
        Box::pin(async move {
            let origin = match request.header("origin") {
                Some(origin) => origin.to_string(),
                None => return next.run(request).await,
            };

            if !cors.config.is_origin_allowed(&origin) {
                if Self::is_preflight(&request) {
                    tracing::warn!(origin = %origin, "CORS preflight rejected");
                    return HttpError::from(SecurityError::cors("Origin not allowed"))
                        .into_response(false);
                }
                // the browser enforces the policy when no allow header is present
                return next.run(request).await;
            }

            if Self::is_preflight(&request) {
                return match cors.preflight(&request, &origin) {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!("CORS preflight rejected: {}", e);
                        HttpError::from(e).into_response(false)
                    }
                };
            }

            let response = next.run(request).await;
            cors.decorate(response, &origin)
        })
    }

    fn name(&self) -> &'static str {
        "CorsMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larix_http::MiddlewarePipeline;

    async fn call(cors: CorsMiddleware, request: LarixRequest) -> LarixResponse {
        MiddlewarePipeline::new()
            .add(cors)
            .execute(request, |_req| async { LarixResponse::text("body") })
            .await
    }

    fn preflight(origin: &str) -> LarixRequest {
        LarixRequest::build(Method::OPTIONS, "/api/posts")
            .with_header("origin", origin)
            .with_header("access-control-request-method", "POST")
            .with_header("access-control-request-headers", "Content-Type")
    }

    #[tokio::test]
    async fn test_preflight() {
        let response = call(CorsMiddleware::permissive(), preflight("https://a.test")).await;
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
        assert_eq!(response.get_header("access-control-allow-origin"), Some("*"));
        assert!(response
            .get_header("access-control-allow-methods")
            .unwrap()
            .contains("POST"));
        assert_eq!(response.get_header("access-control-max-age"), Some("86400"));
        assert_eq!(response.body_text(), "");
    }

    #[tokio::test]
    async fn test_preflight_rejects_unknown_origin_and_method() {
        let cors = CorsMiddleware::permissive().allow_origin("https://app.test");
        let response = call(cors.clone(), preflight("https://evil.test")).await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

        let request = preflight("https://app.test")
            .with_header("access-control-request-method", "TRACE");
        let response = call(cors, request).await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_simple_request_with_credentials() {
        let cors = CorsMiddleware::permissive()
            .allow_credentials(true)
            .expose_headers(["x-request-id"]);
        let request =
            LarixRequest::build(Method::GET, "/api/posts").with_header("origin", "https://a.test");
        let response = call(cors, request).await;
        assert_eq!(response.body_text(), "body");
        assert_eq!(
            response.get_header("access-control-allow-origin"),
            Some("https://a.test")
        );
        assert_eq!(response.get_header("access-control-allow-credentials"), Some("true"));
        assert_eq!(response.get_header("access-control-expose-headers"), Some("x-request-id"));
    }

    #[tokio::test]
    async fn test_disallowed_origin_gets_no_headers() {
        let cors = CorsMiddleware::permissive().allow_origin("https://app.test");
        let request =
            LarixRequest::build(Method::GET, "/").with_header("origin", "https://evil.test");
        let response = call(cors, request).await;
        assert!(!response.has_header("access-control-allow-origin"));
    }
}
