//! # Prelude
//!
//! Convenient imports for common larix functionality.
//!
//! ```rust
//! use larix::prelude::*;
//! ```

// Essential HTTP types
pub use crate::{HttpError, HttpResult, Request, Response, Router, Server};
pub use larix_http::{
    GroupAttributes, Middleware, Next, NextFuture, ResourceController, StatusCode,
};

// Database
pub use larix_orm::{Database, Migration, Model, ModelExt, Record, Schema, Seeder};

// Auth and security
pub use larix_auth::{Authenticatable, Gate, Policy};
pub use larix_security::CsrfMiddleware;

// Caching and views
pub use larix_cache::CacheManager;
pub use larix_view::{ViewEngine, ViewFactory};

// Core types
pub use crate::{Application, Config, Container, Environment};

// JSON helper
pub use serde_json::json;

// Common derives
pub use serde::{Deserialize, Serialize};

// Async traits
pub use async_trait::async_trait;
