//! Authentication and authorization error types

use larix_http::{HttpError, StatusCode};
use larix_orm::ModelError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication and authorization errors
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    /// Invalid credentials provided
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No authenticated user
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Token-related errors
    #[error("Token error: {message}")]
    TokenError { message: String },

    /// Session-related errors
    #[error("Session error: {message}")]
    SessionError { message: String },

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Operation the guard cannot perform
    #[error("Operation not supported by this guard: {operation}")]
    Unsupported { operation: String },

    /// Authorization/permission errors
    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    /// Role not found
    #[error("Role not found: {role}")]
    RoleNotFound { role: String },

    /// Permission not found
    #[error("Permission not found: {permission}")]
    PermissionNotFound { permission: String },

    /// Configuration errors
    #[error("Authentication configuration error: {message}")]
    ConfigurationError { message: String },

    /// Cryptographic errors
    #[error("Cryptographic error: {message}")]
    CryptographicError { message: String },

    /// Database errors
    #[error("Database error during authentication: {message}")]
    DatabaseError { message: String },

    /// Generic authentication error
    #[error("Authentication error: {message}")]
    Generic { message: String },
}

impl AuthError {
    /// Get the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::TokenError { .. } => "TOKEN_ERROR",
            AuthError::SessionError { .. } => "SESSION_ERROR",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::Unsupported { .. } => "UNSUPPORTED",
            AuthError::AccessDenied { .. } => "ACCESS_DENIED",
            AuthError::RoleNotFound { .. } => "ROLE_NOT_FOUND",
            AuthError::PermissionNotFound { .. } => "PERMISSION_NOT_FOUND",
            AuthError::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            AuthError::CryptographicError { .. } => "CRYPTOGRAPHIC_ERROR",
            AuthError::DatabaseError { .. } => "DATABASE_ERROR",
            AuthError::Generic { .. } => "AUTH_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::Unauthenticated
            | AuthError::TokenError { .. }
            | AuthError::SessionError { .. }
            | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
            AuthError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            AuthError::RoleNotFound { .. } | AuthError::PermissionNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a token error
    pub fn token_error(message: impl Into<String>) -> Self {
        AuthError::TokenError {
            message: message.into(),
        }
    }

    /// Create a session error
    pub fn session_error(message: impl Into<String>) -> Self {
        AuthError::SessionError {
            message: message.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        AuthError::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create an access denied error
    pub fn access_denied(message: impl Into<String>) -> Self {
        AuthError::AccessDenied {
            message: message.into(),
        }
    }

    pub fn role_not_found(role: impl Into<String>) -> Self {
        AuthError::RoleNotFound { role: role.into() }
    }

    pub fn permission_not_found(permission: impl Into<String>) -> Self {
        AuthError::PermissionNotFound {
            permission: permission.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        AuthError::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a cryptographic error
    pub fn crypto_error(message: impl Into<String>) -> Self {
        AuthError::CryptographicError {
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database_error(message: impl Into<String>) -> Self {
        AuthError::DatabaseError {
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn generic_error(message: impl Into<String>) -> Self {
        AuthError::Generic {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::token_error(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::crypto_error(format!("Argon2 error: {}", err))
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AuthError::crypto_error(format!("Bcrypt error: {}", err))
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::database_error(err.to_string())
    }
}

impl From<ModelError> for AuthError {
    fn from(err: ModelError) -> Self {
        AuthError::database_error(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::generic_error(format!("Serialization error: {}", err))
    }
}

impl From<AuthError> for HttpError {
    fn from(err: AuthError) -> Self {
        match err.status_code() {
            StatusCode::UNAUTHORIZED => HttpError::Unauthorized,
            StatusCode::FORBIDDEN => HttpError::forbidden(match err {
                AuthError::AccessDenied { message } => message,
                other => other.to_string(),
            }),
            StatusCode::NOT_FOUND => HttpError::not_found(err.to_string()),
            _ => HttpError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_statuses() {
        let error = AuthError::InvalidCredentials;
        assert_eq!(error.error_code(), "INVALID_CREDENTIALS");
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);

        let error = AuthError::access_denied("posts.update");
        assert_eq!(error.error_code(), "ACCESS_DENIED");
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(error.to_string(), "Access denied: posts.update");

        assert_eq!(
            AuthError::config_error("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_into_http_error() {
        let http: HttpError = AuthError::Unauthenticated.into();
        assert_eq!(http.status_code(), StatusCode::UNAUTHORIZED);

        let http: HttpError = AuthError::access_denied("This action is unauthorized.").into();
        assert_eq!(http.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(http.public_message(), "This action is unauthorized.");

        let http: HttpError = AuthError::unsupported("attempt").into();
        assert_eq!(http.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
