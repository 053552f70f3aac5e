//! HTTP error types
//!
//! Every handler returns `HttpResult<LarixResponse>`; the kernel maps the
//! error side onto a status code and a JSON (or HTML) error body.

use crate::response::LarixResponse;
use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Result type for HTTP operations
pub type HttpResult<T> = Result<T, HttpError>;

/// HTTP errors
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Server startup failed: {message}")]
    StartupFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Internal server error: {message}")]
    InternalError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Method not allowed: {method}")]
    MethodNotAllowed { method: String },

    #[error("Resource already exists: {message}")]
    Conflict { message: String },

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Access forbidden: {message}")]
    Forbidden { message: String },

    #[error("Page expired")]
    PageExpired,

    #[error("Too many requests")]
    TooManyRequests { retry_after: u64 },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl HttpError {
    pub fn startup<T: Into<String>>(message: T) -> Self {
        HttpError::StartupFailed {
            message: message.into(),
        }
    }

    pub fn config<T: Into<String>>(message: T) -> Self {
        HttpError::ConfigError {
            message: message.into(),
        }
    }

    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        HttpError::BadRequest {
            message: message.into(),
        }
    }

    pub fn internal<T: Into<String>>(message: T) -> Self {
        HttpError::InternalError {
            message: message.into(),
        }
    }

    pub fn validation<T: Into<String>>(message: T) -> Self {
        HttpError::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found<T: Into<String>>(resource: T) -> Self {
        HttpError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict<T: Into<String>>(message: T) -> Self {
        HttpError::Conflict {
            message: message.into(),
        }
    }

    pub fn forbidden<T: Into<String>>(message: T) -> Self {
        HttpError::Forbidden {
            message: message.into(),
        }
    }

    pub fn unavailable<T: Into<String>>(message: T) -> Self {
        HttpError::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Status code this error renders with
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::StartupFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::ConfigError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            HttpError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            HttpError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::ValidationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            HttpError::NotFound { .. } => StatusCode::NOT_FOUND,
            HttpError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            HttpError::Conflict { .. } => StatusCode::CONFLICT,
            HttpError::Unauthorized => StatusCode::UNAUTHORIZED,
            HttpError::Forbidden { .. } => StatusCode::FORBIDDEN,
            HttpError::PageExpired => page_expired_status(),
            HttpError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            HttpError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine readable code used in JSON error bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            HttpError::StartupFailed { .. } => "startup_failed",
            HttpError::ConfigError { .. } => "config_error",
            HttpError::RequestTimeout => "request_timeout",
            HttpError::BadRequest { .. } => "bad_request",
            HttpError::InternalError { .. } => "internal_error",
            HttpError::ValidationError { .. } => "validation_error",
            HttpError::NotFound { .. } => "not_found",
            HttpError::MethodNotAllowed { .. } => "method_not_allowed",
            HttpError::Conflict { .. } => "conflict",
            HttpError::Unauthorized => "unauthorized",
            HttpError::Forbidden { .. } => "forbidden",
            HttpError::PageExpired => "page_expired",
            HttpError::TooManyRequests { .. } => "too_many_requests",
            HttpError::ServiceUnavailable { .. } => "service_unavailable",
        }
    }

    /// Message that is safe to show to clients.
    ///
    /// Server side failures collapse to the canonical reason phrase so that
    /// internals only leak through the `trace` field in debug mode.
    pub fn public_message(&self) -> String {
        let status = self.status_code();
        if status.is_server_error() {
            return status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string();
        }
        match self {
            HttpError::NotFound { .. } => "Not Found".to_string(),
            HttpError::Unauthorized => "Unauthenticated.".to_string(),
            HttpError::PageExpired => "Page Expired".to_string(),
            HttpError::TooManyRequests { .. } => "Too Many Attempts.".to_string(),
            HttpError::BadRequest { message }
            | HttpError::ValidationError { message }
            | HttpError::Conflict { message }
            | HttpError::Forbidden { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Render the error as a JSON response.
    ///
    /// The body is `{"error": {"code", "message"}}`; `trace` carries the
    /// full error text only when `debug` is set.
    pub fn into_response(self, debug: bool) -> LarixResponse {
        let status = self.status_code();
        let mut error = json!({
            "code": self.error_code(),
            "message": self.public_message(),
        });
        if debug {
            error["trace"] = json!(self.to_string());
        }

        let mut response = LarixResponse::with_status(status).json_value(json!({ "error": error }));
        if let HttpError::TooManyRequests { retry_after } = &self {
            response = response.with_header("retry-after", retry_after.to_string());
        }
        response
    }
}

/// 419 is not a registered status, so it is built from its number.
pub(crate) fn page_expired_status() -> StatusCode {
    StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN)
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::bad_request(format!("JSON parsing error: {}", err))
    }
}

impl From<larix_core::CoreError> for HttpError {
    fn from(err: larix_core::CoreError) -> Self {
        HttpError::internal(err.to_string())
    }
}
