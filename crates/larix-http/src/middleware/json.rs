//! JSON shaping middleware
//!
//! `JsonResponseMiddleware` forces JSON bodies for API style requests,
//! `ApiJsonMiddleware` wraps payloads in a success/error envelope and
//! `JsonValidationMiddleware` rejects malformed or incomplete JSON input.

use super::pipeline::{Middleware, Next, NextFuture};
use crate::request::LarixRequest;
use crate::response::{LarixResponse, ResponseBody};
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

/// Converts responses to JSON for clients that expect it
#[derive(Debug, Clone, Default)]
pub struct JsonResponseMiddleware {
    pub force_json: bool,
    pub pretty_print: bool,
}

impl JsonResponseMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self) -> Self {
        self.force_json = true;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.pretty_print = true;
        self
    }

    fn applies_to(&self, request: &LarixRequest) -> bool {
        self.force_json
            || request.wants_json()
            || request.is_ajax()
            || request.path().starts_with("/api")
    }
}

impl Middleware for JsonResponseMiddleware {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        let applies = self.applies_to(&request);
        let pretty = self.pretty_print;
        Box::pin(async move {
            let mut response = next.run(request).await;
            if !applies {
                return response;
            }

            let declared_json = response
                .content_type()
                .map(|ct| ct.contains("json"))
                .unwrap_or(false);
            let value = match response.body().clone() {
                ResponseBody::Json(value) => Some(value),
                ResponseBody::Empty => None,
                _ if declared_json => response.json_body(),
                other => {
                    let text = match other {
                        ResponseBody::Text(text) => text,
                        _ => response.body_text(),
                    };
                    Some(json!({ "data": text }))
                }
            };

            if let Some(value) = value {
                if pretty {
                    match serde_json::to_string_pretty(&value) {
                        Ok(rendered) => response.set_body(ResponseBody::Text(rendered)),
                        Err(e) => {
                            tracing::error!("Pretty printing JSON failed: {}", e);
                            response.set_body(ResponseBody::Json(value));
                        }
                    }
                } else {
                    response.set_body(ResponseBody::Json(value));
                }
                response = response.with_header("content-type", "application/json");
            }
            response
        })
    }

    fn name(&self) -> &'static str {
        "JsonResponseMiddleware"
    }
}

/// Wraps API responses in a `{success, data, message}` envelope
#[derive(Debug, Clone, Default)]
pub struct ApiJsonMiddleware;

impl ApiJsonMiddleware {
    pub fn new() -> Self {
        Self
    }

    fn wrap(response: LarixResponse) -> LarixResponse {
        let status = response.status_code();
        let body = response.json_body();

        if let Some(Value::Object(map)) = &body {
            if map.contains_key("success") {
                return response;
            }
        }

        let mut wrapped = response.clone();
        if status.as_u16() >= 400 {
            let message = match &body {
                Some(Value::Object(map)) => map
                    .get("error")
                    .and_then(|e| e.get("message").or(Some(e)))
                    .or_else(|| map.get("message"))
                    .and_then(|m| m.as_str().map(String::from)),
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            }
            .or_else(|| {
                let text = response.body_text();
                (!text.is_empty()).then_some(text)
            })
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Error").to_string());

            wrapped.set_body(ResponseBody::Json(json!({
                "success": false,
                "error": {
                    "type": error_type(status),
                    "message": message,
                },
                "data": null,
            })));
        } else {
            let data = match body {
                Some(value) => value,
                None if matches!(response.body(), ResponseBody::Empty) => Value::Null,
                None => Value::String(response.body_text()),
            };
            wrapped.set_body(ResponseBody::Json(json!({
                "success": true,
                "data": data,
                "message": "Request successful",
            })));
        }
        wrapped.with_header("content-type", "application/json")
    }
}

fn error_type(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "BadRequest",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "NotFound",
        405 => "MethodNotAllowed",
        419 => "PageExpired",
        422 => "ValidationError",
        429 => "TooManyRequests",
        503 => "ServiceUnavailable",
        s if s >= 500 => "ServerError",
        _ => "ClientError",
    }
}

impl Middleware for ApiJsonMiddleware {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        Box::pin(async move { Self::wrap(next.run(request).await) })
    }

    fn name(&self) -> &'static str {
        "ApiJsonMiddleware"
    }
}

/// Validates JSON request bodies on write methods
#[derive(Debug, Clone, Default)]
pub struct JsonValidationMiddleware {
    pub required: Vec<String>,
}

impl JsonValidationMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    fn validate(&self, request: &LarixRequest) -> Option<LarixResponse> {
        let method = request.effective_method();
        if !(method == Method::POST || method == Method::PUT || method == Method::PATCH) {
            return None;
        }
        if !request.is_json() {
            return None;
        }

        let parsed = match request.body_bytes() {
            Some(bytes) if !bytes.is_empty() => serde_json::from_slice::<Value>(bytes),
            _ => Ok(Value::Object(Default::default())),
        };
        let value = match parsed {
            Ok(value) => value,
            Err(e) => {
                return Some(LarixResponse::bad_request().with_json(&json!({
                    "error": {
                        "type": "InvalidJSON",
                        "message": format!("Invalid JSON: {}", e),
                    }
                })))
            }
        };

        let missing: Vec<&String> = self
            .required
            .iter()
            .filter(|field| value.get(field.as_str()).map_or(true, Value::is_null))
            .collect();
        if missing.is_empty() {
            return None;
        }

        Some(LarixResponse::bad_request().with_json(&json!({
            "error": {
                "type": "ValidationError",
                "message": "Missing required fields",
                "fields": missing,
            }
        })))
    }
}

impl Middleware for JsonValidationMiddleware {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        let rejection = self.validate(&request);
        Box::pin(async move {
            match rejection {
                Some(response) => response,
                None => next.run(request).await,
            }
        })
    }

    fn name(&self) -> &'static str {
        "JsonValidationMiddleware"
    }
}
