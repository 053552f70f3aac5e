//! # larix-security
//!
//! Security middleware and utilities for the larix web framework:
//! rate limiting, CORS, CSRF protection and HTML sanitization.

pub mod config;
pub mod middleware;
pub mod sanitizer;

pub use config::{CorsConfig, CsrfConfig, ThrottleConfig, ThrottleKey};
pub use middleware::cors::CorsMiddleware;
pub use middleware::csrf::CsrfMiddleware;
pub use middleware::throttle::ThrottleMiddleware;
pub use sanitizer::{clean_filename, escape_html, sanitize_html, strip_tags};

use larix_http::{HttpError, HttpKernel, Middleware};
use std::sync::Arc;

/// Common result type for security operations
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Security-related errors
#[derive(thiserror::Error, Debug)]
pub enum SecurityError {
    #[error("CORS violation: {message}")]
    CorsViolation { message: String },

    #[error("CSRF token mismatch")]
    CsrfTokenMismatch,

    #[error("CSRF protection requires a started session")]
    SessionMissing,

    #[error("Rate limit exceeded: retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl SecurityError {
    pub fn cors<T: Into<String>>(message: T) -> Self {
        SecurityError::CorsViolation {
            message: message.into(),
        }
    }

    pub fn config<T: Into<String>>(message: T) -> Self {
        SecurityError::ConfigError {
            message: message.into(),
        }
    }
}

impl From<SecurityError> for HttpError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::CorsViolation { message } => HttpError::forbidden(message),
            SecurityError::CsrfTokenMismatch => HttpError::PageExpired,
            SecurityError::RateLimitExceeded { retry_after } => {
                HttpError::TooManyRequests { retry_after }
            }
            SecurityError::ConfigError { message } => HttpError::config(message),
            other => HttpError::internal(other.to_string()),
        }
    }
}

/// Register the `throttle`, `csrf` and `cors` route middleware aliases.
///
/// `throttle:60,1` allows sixty requests per minute; `throttle:user` keys the
/// limiter by the authenticated user.
pub fn register_middleware(kernel: &mut HttpKernel) {
    kernel
        .alias("throttle", |params| {
            let throttle = ThrottleMiddleware::from_params(&params)?;
            Ok(Arc::new(throttle) as Arc<dyn Middleware>)
        })
        .alias_instance("csrf", CsrfMiddleware::new(CsrfConfig::default()))
        .alias_instance("cors", CorsMiddleware::new(CorsConfig::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use larix_http::{Router, StatusCode};

    #[test]
    fn test_error_mapping() {
        let err: HttpError = SecurityError::CsrfTokenMismatch.into();
        assert_eq!(err.status_code().as_u16(), 419);

        let err: HttpError = SecurityError::RateLimitExceeded { retry_after: 9 }.into();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err: HttpError = SecurityError::cors("origin").into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_register_middleware() {
        let mut kernel = HttpKernel::new(Router::new());
        register_middleware(&mut kernel);
        assert!(kernel.has_alias("throttle"));
        assert!(kernel.has_alias("csrf"));
        assert!(kernel.has_alias("cors"));
        assert!(kernel.resolve(&["throttle:10,1".to_string()]).is_ok());
        assert!(kernel.resolve(&["throttle:ten".to_string()]).is_err());
    }
}
