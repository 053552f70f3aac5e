//! Middleware pipeline
//!
//! Middleware wraps the handler like an onion: the first middleware added is
//! the outermost layer, so code before `next.run` executes in registration
//! order and code after it executes in reverse.

use crate::request::LarixRequest;
use crate::response::LarixResponse;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by middleware and by `Next`
pub type NextFuture<'a> = Pin<Box<dyn Future<Output = LarixResponse> + Send + 'a>>;

/// The remainder of the middleware chain
pub struct Next {
    handler: Box<dyn FnOnce(LarixRequest) -> NextFuture<'static> + Send>,
}

impl Next {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnOnce(LarixRequest) -> NextFuture<'static> + Send + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Run the rest of the chain
    pub async fn run(self, request: LarixRequest) -> LarixResponse {
        (self.handler)(request).await
    }

    /// Like [`Next::run`] but returns the boxed future directly
    pub fn call(self, request: LarixRequest) -> NextFuture<'static> {
        (self.handler)(request)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// Request/response interceptor
pub trait Middleware: Send + Sync + fmt::Debug {
    /// Handle the request; call `next.run(request)` to continue the chain
    /// or return a response directly to short-circuit it.
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static>;

    fn name(&self) -> &'static str {
        "Middleware"
    }
}

/// Ordered middleware chain
#[derive(Debug, Clone, Default)]
pub struct MiddlewarePipeline {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append middleware (builder style)
    pub fn add<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn add_mut<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middleware.push(Arc::new(middleware));
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// Insert middleware as the new outermost layer
    pub fn prepend(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.insert(0, middleware);
    }

    pub fn extend(mut self, other: Self) -> Self {
        self.middleware.extend(other.middleware);
        self
    }

    /// Run `request` through every middleware and finally `handler`
    pub async fn execute<F, Fut>(&self, request: LarixRequest, handler: F) -> LarixResponse
    where
        F: FnOnce(LarixRequest) -> Fut + Send + 'static,
        Fut: Future<Output = LarixResponse> + Send + 'static,
    {
        let mut chain = Box::new(move |req: LarixRequest| Box::pin(handler(req)) as NextFuture<'static>)
            as Box<dyn FnOnce(LarixRequest) -> NextFuture<'static> + Send>;

        for middleware in self.middleware.iter().rev() {
            let middleware = middleware.clone();
            let next_handler = chain;
            chain = Box::new(move |req: LarixRequest| {
                let next = Next::new(next_handler);
                middleware.handle(req, next)
            });
        }

        chain(request).await
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Middleware>> {
        self.middleware.iter()
    }
}

impl From<Vec<Arc<dyn Middleware>>> for MiddlewarePipeline {
    fn from(middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middleware }
    }
}

type MiddlewareFn = dyn Fn(LarixRequest, Next) -> NextFuture<'static> + Send + Sync;

/// Middleware built from a closure, see [`middleware_fn`]
pub struct FnMiddleware {
    name: &'static str,
    func: Arc<MiddlewareFn>,
}

impl fmt::Debug for FnMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").field("name", &self.name).finish()
    }
}

impl Middleware for FnMiddleware {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        (self.func)(request, next)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Adapt an async closure into middleware
///
/// ```ignore
/// let timing = middleware_fn("timing", |req, next| async move {
///     let response = next.run(req).await;
///     response.with_header("x-timed", "1")
/// });
/// ```
pub fn middleware_fn<F, Fut>(name: &'static str, f: F) -> FnMiddleware
where
    F: Fn(LarixRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LarixResponse> + Send + 'static,
{
    FnMiddleware {
        name,
        func: Arc::new(move |req, next| Box::pin(f(req, next))),
    }
}

/// Logs method, path, status and duration of every request
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        Box::pin(async move {
            let start = std::time::Instant::now();
            let method = request.method.clone();
            let path = request.path().to_string();

            let response = next.run(request).await;

            tracing::info!(
                method = %method,
                path = %path,
                status = response.status_code().as_u16(),
                duration_ms = start.elapsed().as_millis() as u64,
                "request handled"
            );
            response
        })
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recorder {
        fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
            let label = self.label;
            let log = self.log.clone();
            Box::pin(async move {
                log.lock().push(format!("{}:before", label));
                let response = next.run(request).await;
                log.lock().push(format!("{}:after", label));
                response
            })
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    #[derive(Debug)]
    struct Blocker;

    impl Middleware for Blocker {
        fn handle(&self, _request: LarixRequest, _next: Next) -> NextFuture<'static> {
            Box::pin(async move { LarixResponse::forbidden() })
        }
    }

    #[tokio::test]
    async fn test_onion_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = MiddlewarePipeline::new()
            .add(Recorder { label: "first", log: log.clone() })
            .add(Recorder { label: "second", log: log.clone() });

        let handler_log = log.clone();
        let response = pipeline
            .execute(LarixRequest::build(Method::GET, "/"), move |_req| async move {
                handler_log.lock().push("handler".to_string());
                LarixResponse::ok()
            })
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            *log.lock(),
            vec!["first:before", "second:before", "handler", "second:after", "first:after"]
        );
        assert_eq!(pipeline.names(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = MiddlewarePipeline::new()
            .add(Recorder { label: "outer", log: log.clone() })
            .add(Blocker);

        let handler_log = log.clone();
        let response = pipeline
            .execute(LarixRequest::build(Method::GET, "/"), move |_req| async move {
                handler_log.lock().push("handler".to_string());
                LarixResponse::ok()
            })
            .await;

        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(*log.lock(), vec!["outer:before", "outer:after"]);
    }

    #[tokio::test]
    async fn test_prepend_and_middleware_fn() {
        let mut pipeline = MiddlewarePipeline::new().add(middleware_fn("tag", |req, next| async move {
            next.run(req).await.with_header("x-tag", "inner")
        }));
        pipeline.prepend(Arc::new(middleware_fn("outer", |req, next| async move {
            let response = next.run(req).await;
            let seen = response.get_header("x-tag").unwrap_or("none").to_string();
            response.with_header("x-outer-saw", seen)
        })));

        assert_eq!(pipeline.names(), vec!["outer", "tag"]);
        let response = pipeline
            .execute(LarixRequest::build(Method::GET, "/"), |_req| async { LarixResponse::ok() })
            .await;
        assert_eq!(response.get_header("x-outer-saw"), Some("inner"));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn test_logging_middleware_emits_event() {
        let pipeline = MiddlewarePipeline::new().add(LoggingMiddleware);
        pipeline
            .execute(LarixRequest::build(Method::GET, "/health"), |_req| async {
                LarixResponse::ok()
            })
            .await;
        assert!(logs_contain("request handled"));
    }
}
