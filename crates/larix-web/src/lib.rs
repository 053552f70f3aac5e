//! # larix
//!
//! An expressive, batteries-included web framework for Rust.
//!
//! This is the umbrella package. It re-exports every larix crate under a
//! short module name and gathers the everyday types into [`prelude`].
//!
//! ```rust,no_run
//! use larix::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut router = Router::new();
//! router.get("/", |_req: Request| async { Ok(Response::text("Hello from larix")) });
//! # Ok(())
//! # }
//! ```

// Sub-packages as modules
pub use larix_auth as auth;
pub use larix_cache as cache;
pub use larix_core as core;
pub use larix_http as http;
pub use larix_orm as orm;
pub use larix_security as security;
pub use larix_view as view;

// Common types at root level
pub use larix_http::LarixRequest as Request;
pub use larix_http::LarixResponse as Response;
pub use larix_http::{HttpError, HttpKernel, HttpResult, Router, Server};

pub use larix_core::{
    AppConfig, AppConfigTrait, Application, Config, ConfigSource, Container, CoreError,
    Environment, ServiceProvider,
};

pub mod prelude;

/// Current version of larix
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Framework information
pub const FRAMEWORK_NAME: &str = "larix";

/// Get framework version
pub fn version() -> &'static str {
    VERSION
}

/// Get framework name
pub fn name() -> &'static str {
    FRAMEWORK_NAME
}
