//! Routing: URI templates, the route table, groups and resource controllers

pub mod resource;
pub mod route;
pub mod router;

pub use resource::{ResourceAction, ResourceController};
pub use route::{handler, Handler, HandlerFuture, Route};
pub use router::{GroupAttributes, RouteMatch, RouteSummary, Router, DEFAULT_BASE_URL};
