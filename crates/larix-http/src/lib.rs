//! # larix-http
//!
//! HTTP layer of the larix web framework:
//! - request and response abstractions that keep bodies inspectable
//! - a regex route table with groups, named routes and resource controllers
//! - an onion middleware pipeline and a kernel that resolves middleware by name
//! - sessions, maintenance mode and JSON helpers
//! - an axum-backed server with graceful shutdown

pub mod errors;
pub mod kernel;
pub mod logging;
pub mod maintenance;
pub mod middleware;
pub mod request;
pub mod response;
pub mod routing;
pub mod server;
pub mod session;

pub use errors::{HttpError, HttpResult};
pub use kernel::{render_error, HttpKernel, MiddlewareFactory};
pub use logging::{init_logging, LoggingConfig};
pub use maintenance::{MaintenanceMiddleware, MaintenanceMode, MaintenancePayload};
pub use request::{LarixRequest, RouteInfo, UserId, UserRole, UserSegments};
pub use response::{LarixResponse, ResponseBody};
pub use server::Server;
pub use session::{
    FileSessionStore, MemorySessionStore, Session, SessionConfig, SessionStore, StartSession,
};

pub use middleware::{
    middleware_fn, ApiJsonMiddleware, JsonResponseMiddleware, JsonValidationMiddleware,
    LoggingMiddleware, Middleware, MiddlewarePipeline, Next, NextFuture, RequestId,
    RequestIdMiddleware, RequireFeature,
};
pub use routing::{
    handler, GroupAttributes, Handler, ResourceAction, ResourceController, Route, RouteSummary,
    Router,
};

// re-exported so handlers can name status codes and methods without axum
pub use axum::http::{HeaderMap, Method, StatusCode};
