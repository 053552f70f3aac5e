//! Response abstraction
//!
//! `LarixResponse` keeps the body structured (text, bytes or JSON) until the
//! server converts it, which lets middleware inspect and rewrite bodies.

use crate::errors::{HttpError, HttpResult};
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

/// Response body kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Text(String),
    Bytes(Bytes),
    Json(Value),
}

/// Framework response
#[derive(Debug, Clone)]
pub struct LarixResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl LarixResponse {
    /// Create a new 200 response with an empty body
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::new()
        }
    }

    /// Set status code (consuming)
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn set_body(&mut self, body: ResponseBody) {
        self.body = body;
    }

    /// Add header (never panics)
    ///
    /// Invalid header names or values turn the response into a 500.
    pub fn with_header<K, V>(self, key: K, value: V) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.header(key, value).unwrap_or_else(|err| {
            tracing::error!("Header creation failed in with_header: {}", err);
            LarixResponse::internal_server_error()
        })
    }

    /// Add header (consuming)
    pub fn header<K, V>(mut self, key: K, value: V) -> HttpResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.add_header(key, value)?;
        Ok(self)
    }

    /// Insert a header, replacing any previous value
    pub fn add_header<K, V>(&mut self, key: K, value: V) -> HttpResult<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let name = HeaderName::from_bytes(key.as_ref().as_bytes())
            .map_err(|e| HttpError::internal(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::from_str(value.as_ref())
            .map_err(|e| HttpError::internal(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Append a header, keeping existing values (used for `Set-Cookie`)
    pub fn append_header<K, V>(&mut self, key: K, value: V) -> HttpResult<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let name = HeaderName::from_bytes(key.as_ref().as_bytes())
            .map_err(|e| HttpError::internal(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::from_str(value.as_ref())
            .map_err(|e| HttpError::internal(format!("Invalid header value: {}", e)))?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn remove_header(&mut self, key: &str) -> Option<HeaderValue> {
        self.headers.remove(key)
    }

    /// Set JSON body (never panics)
    pub fn with_json<T: Serialize>(self, data: &T) -> Self {
        self.json(data).unwrap_or_else(|err| {
            tracing::error!("JSON serialization failed in with_json: {}", err);
            LarixResponse::internal_server_error()
        })
    }

    /// Set plain text body
    pub fn with_text<S: Into<String>>(mut self, content: S) -> Self {
        self.body = ResponseBody::Text(content.into());
        self
    }

    /// Set HTML body and content type
    pub fn with_html<S: Into<String>>(self, content: S) -> Self {
        self.with_text(content)
            .with_header("content-type", "text/html; charset=utf-8")
    }

    pub fn bytes(mut self, bytes: Bytes) -> Self {
        self.body = ResponseBody::Bytes(bytes);
        self
    }

    pub fn json<T: Serialize>(mut self, data: &T) -> HttpResult<Self> {
        let value = serde_json::to_value(data)
            .map_err(|e| HttpError::internal(format!("JSON serialization failed: {}", e)))?;
        self.body = ResponseBody::Json(value);
        Ok(self)
    }

    pub fn json_value(mut self, value: Value) -> Self {
        self.body = ResponseBody::Json(value);
        self
    }

    /// Body as JSON, parsing text and bytes bodies when possible
    pub fn json_body(&self) -> Option<Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value.clone()),
            ResponseBody::Text(text) => serde_json::from_str(text).ok(),
            ResponseBody::Bytes(bytes) => serde_json::from_slice(bytes).ok(),
            ResponseBody::Empty => None,
        }
    }

    /// Body rendered as a string
    pub fn body_text(&self) -> String {
        match &self.body {
            ResponseBody::Empty => String::new(),
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            ResponseBody::Json(value) => value.to_string(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("content-type")
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }

    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }

    /// Convert to an axum response, filling in a default content type
    pub fn into_axum(self) -> Response<Body> {
        self.into_response()
    }

    fn build(mut self) -> HttpResult<Response<Body>> {
        if !self.headers.contains_key(header::CONTENT_TYPE) {
            match &self.body {
                ResponseBody::Json(_) => self.add_header("content-type", "application/json")?,
                ResponseBody::Text(_) => {
                    self.add_header("content-type", "text/plain; charset=utf-8")?
                }
                _ => {}
            }
        }

        let body = match self.body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Text(text) => Body::from(text),
            ResponseBody::Bytes(bytes) => Body::from(bytes),
            ResponseBody::Json(value) => {
                let json_string = serde_json::to_string(&value)
                    .map_err(|e| HttpError::internal(format!("JSON serialization failed: {}", e)))?;
                Body::from(json_string)
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        Ok(response)
    }
}

impl Default for LarixResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Shortcuts for common responses
impl LarixResponse {
    pub fn ok() -> Self {
        Self::with_status(StatusCode::OK)
    }

    pub fn created() -> Self {
        Self::with_status(StatusCode::CREATED)
    }

    pub fn no_content() -> Self {
        Self::with_status(StatusCode::NO_CONTENT)
    }

    pub fn bad_request() -> Self {
        Self::with_status(StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::with_status(StatusCode::FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::with_status(StatusCode::NOT_FOUND)
    }

    pub fn internal_server_error() -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// 200 response with a JSON body
    pub fn json_ok<T: Serialize>(data: &T) -> Self {
        Self::ok().with_json(data)
    }

    /// 200 response with an HTML body
    pub fn html<S: Into<String>>(content: S) -> Self {
        Self::ok().with_html(content)
    }

    /// 200 response with a plain text body
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self::ok().with_text(content)
    }

    /// 302 redirect
    pub fn redirect(to: &str) -> Self {
        Self::with_status(StatusCode::FOUND).with_header("location", to)
    }

    pub fn redirect_permanent(to: &str) -> Self {
        Self::with_status(StatusCode::MOVED_PERMANENTLY).with_header("location", to)
    }
}

impl IntoResponse for LarixResponse {
    fn into_response(self) -> Response<Body> {
        match self.build() {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed to build response: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builders() {
        assert_eq!(LarixResponse::created().status_code(), StatusCode::CREATED);
        assert_eq!(LarixResponse::no_content().status_code(), StatusCode::NO_CONTENT);

        let response = LarixResponse::redirect("/login");
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(response.get_header("location"), Some("/login"));
    }

    #[test]
    fn test_invalid_header_becomes_server_error() {
        let response = LarixResponse::ok().with_header("bad header", "x");
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_json_and_text_introspection() {
        let response = LarixResponse::json_ok(&json!({"name": "larix"}));
        assert_eq!(response.json_body().unwrap()["name"], "larix");
        assert!(response.is_success());

        let response = LarixResponse::text("{\"a\":1}");
        assert_eq!(response.json_body().unwrap()["a"], 1);
        assert_eq!(response.body_text(), "{\"a\":1}");
    }

    #[test]
    fn test_into_axum_sets_default_content_type() {
        let response = LarixResponse::json_ok(&json!({"ok": true})).into_axum();
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let response = LarixResponse::html("<p>hi</p>").into_axum();
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );
    }
}
