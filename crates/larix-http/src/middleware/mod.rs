//! Middleware: the onion pipeline and the middleware shipped with the HTTP layer

pub mod feature;
pub mod json;
pub mod pipeline;
pub mod request_id;

pub use feature::RequireFeature;
pub use json::{ApiJsonMiddleware, JsonResponseMiddleware, JsonValidationMiddleware};
pub use pipeline::{
    middleware_fn, FnMiddleware, LoggingMiddleware, Middleware, MiddlewarePipeline, Next,
    NextFuture,
};
pub use request_id::{RequestId, RequestIdMiddleware, REQUEST_ID_HEADER};
