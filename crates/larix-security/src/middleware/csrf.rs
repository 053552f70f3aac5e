//! CSRF (Cross-Site Request Forgery) protection middleware
//!
//! Verifies that state-changing requests carry the token stored in the
//! session, and hands the token to JavaScript clients through a cookie.

use crate::config::CsrfConfig;
use crate::SecurityError;
use axum::http::Method;
use larix_http::{
    HttpError, LarixRequest, LarixResponse, Middleware, Next, NextFuture, Session,
};
use sha2::{Digest, Sha256};

pub const TOKEN_FIELD: &str = "_token";
pub const TOKEN_HEADER: &str = "x-csrf-token";
pub const XSRF_HEADER: &str = "x-xsrf-token";

/// Compare two tokens without short-circuiting on the first difference.
///
/// Both sides are hashed first so the comparison also hides their lengths.
pub fn tokens_match(known: &str, given: &str) -> bool {
    let known = Sha256::digest(known.as_bytes());
    let given = Sha256::digest(given.as_bytes());
    known
        .iter()
        .zip(given.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[derive(Debug, Clone, Default)]
pub struct CsrfMiddleware {
    config: CsrfConfig,
}

impl CsrfMiddleware {
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    pub fn except<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config = self.config.except(paths);
        self
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    fn is_reading(method: &Method) -> bool {
        matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Token sent with the request: `_token` input, then the headers
    pub fn token_from_request(request: &LarixRequest) -> Option<String> {
        request
            .input_str(TOKEN_FIELD)
            .or_else(|| request.header(TOKEN_HEADER).map(String::from))
            .or_else(|| request.header(XSRF_HEADER).map(String::from))
            .filter(|token| !token.is_empty())
    }

    fn cookie(&self, token: &str) -> String {
        let mut cookie = format!("{}={}; Path=/; SameSite=Lax", self.config.cookie_name, token);
        if self.config.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn mismatch_response(request: &LarixRequest) -> LarixResponse {
        let error = HttpError::from(SecurityError::CsrfTokenMismatch);
        if request.wants_json() || request.is_ajax() {
            return error.into_response(false);
        }
        LarixResponse::with_status(error.status_code()).with_html(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
             <title>Page Expired</title>\n</head>\n<body>\n<h1>419</h1>\n\
             <p>Page Expired</p>\n</body>\n</html>\n",
        )
    }
}

impl Middleware for CsrfMiddleware {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        let csrf = self.clone();
        Box::pin(async move {
            let session = match request.get_extension::<Session>() {
                Some(session) => session.clone(),
                None => {
                    tracing::error!("{}", SecurityError::SessionMissing);
                    return HttpError::from(SecurityError::SessionMissing).into_response(false);
                }
            };

            let method = request.effective_method();
            let verify = !Self::is_reading(&method) && !csrf.config.is_excepted(request.path());
            if verify {
                let valid = Self::token_from_request(&request)
                    .map(|given| tokens_match(&session.token(), &given))
                    .unwrap_or(false);
                if !valid {
                    tracing::warn!(path = %request.path(), method = %method, "CSRF token mismatch");
                    return Self::mismatch_response(&request);
                }
            }

            let mut response = next.run(request).await;
            if csrf.config.add_cookie {
                // the handler may have regenerated the token
                let cookie = csrf.cookie(&session.token());
                if let Err(e) = response.append_header("set-cookie", cookie) {
                    tracing::warn!("Failed to set XSRF cookie: {}", e);
                }
            }
            response
        })
    }

    fn name(&self) -> &'static str {
        "CsrfMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use larix_http::MiddlewarePipeline;

    async fn call(csrf: CsrfMiddleware, session: &Session, mut request: LarixRequest) -> LarixResponse {
        request.insert_extension(session.clone());
        MiddlewarePipeline::new()
            .add(csrf)
            .execute(request, |_req| async { LarixResponse::text("done") })
            .await
    }

    fn form_post(path: &str, body: String) -> LarixRequest {
        LarixRequest::build(Method::POST, path)
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_body(body)
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
    }

    #[tokio::test]
    async fn test_reads_pass_and_receive_cookie() {
        let session = Session::new();
        let response = call(
            CsrfMiddleware::default(),
            &session,
            LarixRequest::build(Method::GET, "/form"),
        )
        .await;
        assert_eq!(response.body_text(), "done");
        let cookie = response.get_header("set-cookie").unwrap();
        assert!(cookie.starts_with(&format!("XSRF-TOKEN={}", session.token())));
    }

    #[tokio::test]
    async fn test_token_sources() {
        let session = Session::new();
        let token = session.token();

        let by_field = form_post("/posts", format!("_token={}&title=x", token));
        assert_eq!(call(CsrfMiddleware::default(), &session, by_field).await.body_text(), "done");

        let by_header = LarixRequest::build(Method::DELETE, "/posts/1").with_header("x-csrf-token", &token);
        assert_eq!(call(CsrfMiddleware::default(), &session, by_header).await.body_text(), "done");

        let by_xsrf = LarixRequest::build(Method::PUT, "/posts/1").with_header("x-xsrf-token", &token);
        assert_eq!(call(CsrfMiddleware::default(), &session, by_xsrf).await.body_text(), "done");
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn test_mismatch_is_page_expired() {
        let session = Session::new();
        let response = call(
            CsrfMiddleware::default(),
            &session,
            form_post("/posts", "_token=wrong".to_string()),
        )
        .await;
        assert_eq!(response.status_code().as_u16(), 419);
        assert!(response.body_text().contains("Page Expired"));
        assert!(logs_contain("CSRF token mismatch"));

        let request = LarixRequest::build(Method::POST, "/posts").with_header("accept", "application/json");
        let response = call(CsrfMiddleware::default(), &session, request).await;
        assert_eq!(response.status_code().as_u16(), 419);
        assert_eq!(response.json_body().unwrap()["error"]["message"], "Page Expired");
    }

    #[tokio::test]
    async fn test_spoofed_get_is_still_verified() {
        let session = Session::new();
        let request = form_post("/posts/1/delete", "_method=GET&title=x".to_string());
        let response = call(CsrfMiddleware::default(), &session, request).await;
        assert_eq!(response.status_code().as_u16(), 419);
    }

    #[tokio::test]
    async fn test_except_paths_and_missing_session() {
        let session = Session::new();
        let csrf = CsrfMiddleware::default().except(["webhooks/*"]);
        let response = call(csrf.clone(), &session, LarixRequest::build(Method::POST, "/webhooks/stripe")).await;
        assert_eq!(response.body_text(), "done");

        let response = MiddlewarePipeline::new()
            .add(csrf)
            .execute(LarixRequest::build(Method::POST, "/posts"), |_req| async {
                LarixResponse::ok()
            })
            .await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
