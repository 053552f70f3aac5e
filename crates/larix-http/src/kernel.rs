//! HTTP kernel
//!
//! Runs a request through the global middleware, dispatches it to a route,
//! resolves that route's middleware by name and finally calls the handler.

use crate::errors::{HttpError, HttpResult};
use crate::middleware::{Middleware, MiddlewarePipeline};
use crate::request::{LarixRequest, RouteInfo};
use crate::response::LarixResponse;
use crate::routing::Router;
use dashmap::DashMap;
use larix_core::AppConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a middleware instance from the parameters of `name:p1,p2`
pub type MiddlewareFactory =
    Arc<dyn Fn(Vec<String>) -> HttpResult<Arc<dyn Middleware>> + Send + Sync>;

pub struct HttpKernel {
    router: Router,
    global: MiddlewarePipeline,
    aliases: HashMap<String, MiddlewareFactory>,
    groups: HashMap<String, Vec<String>>,
    // one instance per distinct middleware string, so stateful middleware
    // (rate limiters) keep their state between requests
    resolved: DashMap<String, Arc<dyn Middleware>>,
    debug: bool,
}

impl fmt::Debug for HttpKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut aliases: Vec<&String> = self.aliases.keys().collect();
        aliases.sort();
        f.debug_struct("HttpKernel")
            .field("routes", &self.router.len())
            .field("global", &self.global.names())
            .field("aliases", &aliases)
            .field("groups", &self.groups)
            .field("debug", &self.debug)
            .finish()
    }
}

impl HttpKernel {
    pub fn new(router: Router) -> Self {
        let mut groups = HashMap::new();
        groups.insert("web".to_string(), Vec::new());
        groups.insert("api".to_string(), Vec::new());
        Self {
            router,
            global: MiddlewarePipeline::new(),
            aliases: HashMap::new(),
            groups,
            resolved: DashMap::new(),
            debug: false,
        }
    }

    /// Kernel whose debug output follows the application configuration
    pub fn from_config(router: Router, config: &AppConfig) -> Self {
        Self::new(router).debug(config.debug && !config.environment.is_production())
    }

    /// Include error detail in 5xx responses
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn global_middleware(&self) -> &MiddlewarePipeline {
        &self.global
    }

    /// Append global middleware (innermost of the global layers)
    pub fn push_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.global.add_mut(middleware);
        self
    }

    /// Insert global middleware as the outermost layer
    pub fn prepend_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.global.prepend(Arc::new(middleware));
        self
    }

    /// Register a route middleware alias
    pub fn alias<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(Vec<String>) -> HttpResult<Arc<dyn Middleware>> + Send + Sync + 'static,
    {
        self.aliases.insert(name.to_string(), Arc::new(factory));
        self
    }

    /// Register an alias for middleware that takes no parameters
    pub fn alias_instance<M>(&mut self, name: &str, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        let middleware: Arc<dyn Middleware> = Arc::new(middleware);
        self.alias(name, move |_params| Ok(middleware.clone()))
    }

    /// Define (or replace) a named middleware group
    pub fn middleware_group<I, S>(&mut self, name: &str, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(name.to_string(), members.into_iter().map(Into::into).collect());
        self
    }

    pub fn has_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    pub fn group_members(&self, name: &str) -> Option<&[String]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Resolve route middleware strings into a pipeline.
    ///
    /// Groups expand recursively; `name:a,b` passes `["a", "b"]` to the
    /// alias factory.
    pub fn resolve(&self, names: &[String]) -> HttpResult<MiddlewarePipeline> {
        let mut pipeline = MiddlewarePipeline::new();
        let mut expanding = Vec::new();
        for name in names {
            self.resolve_into(name, &mut pipeline, &mut expanding)?;
        }
        Ok(pipeline)
    }

    fn resolve_into(
        &self,
        name: &str,
        pipeline: &mut MiddlewarePipeline,
        expanding: &mut Vec<String>,
    ) -> HttpResult<()> {
        let name = name.trim();
        if let Some(members) = self.groups.get(name) {
            if expanding.iter().any(|g| g == name) {
                return Err(HttpError::config(format!(
                    "Middleware group [{}] includes itself",
                    name
                )));
            }
            expanding.push(name.to_string());
            for member in members {
                self.resolve_into(member, pipeline, expanding)?;
            }
            expanding.pop();
            return Ok(());
        }

        if let Some(existing) = self.resolved.get(name) {
            pipeline.push(existing.clone());
            return Ok(());
        }

        let (alias, params) = match name.split_once(':') {
            Some((alias, params)) => (
                alias,
                params
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            None => (name, Vec::new()),
        };

        let factory = self.aliases.get(alias).ok_or_else(|| {
            tracing::error!("Middleware [{}] is not defined", alias);
            HttpError::internal(format!("Middleware [{}] is not defined", alias))
        })?;
        let middleware = factory(params)?;
        self.resolved.insert(name.to_string(), middleware.clone());
        pipeline.push(middleware);
        Ok(())
    }

    /// Check routes and every middleware name they reference
    pub fn validate(&self) -> HttpResult<()> {
        self.router.validate()?;
        for route in self.router.all() {
            self.resolve(route.middleware())?;
        }
        Ok(())
    }

    /// Handle a request end to end
    pub async fn handle(self: Arc<Self>, request: LarixRequest) -> LarixResponse {
        let kernel = self.clone();
        self.global
            .execute(request, move |req| async move { kernel.dispatch(req).await })
            .await
    }

    async fn dispatch(&self, mut request: LarixRequest) -> LarixResponse {
        let wants_json = request.wants_json() || request.is_ajax();
        let method = request.effective_method();

        let (handler, info, params) = match self.router.dispatch(&method, request.path()) {
            Ok(matched) => (
                matched.route.handler(),
                RouteInfo {
                    uri: matched.route.uri().to_string(),
                    name: matched.route.name().map(String::from),
                    methods: matched.route.methods().to_vec(),
                    middleware: matched.route.middleware().to_vec(),
                },
                matched.params,
            ),
            Err(e) => return render_error(e, wants_json, self.debug),
        };

        let pipeline = match self.resolve(&info.middleware) {
            Ok(pipeline) => pipeline,
            Err(e) => return render_error(e, wants_json, self.debug),
        };

        request.set_path_params(params);
        request.set_route_name(info.name.clone());
        request.insert_extension(info);

        let debug = self.debug;
        pipeline
            .execute(request, move |req| async move {
                match handler(req).await {
                    Ok(response) => response,
                    Err(e) => render_error(e, wants_json, debug),
                }
            })
            .await
    }
}

/// Map an error to a response; 404s are HTML unless JSON is wanted
pub fn render_error(error: HttpError, wants_json: bool, debug: bool) -> LarixResponse {
    if error.status_code().is_server_error() {
        tracing::error!("Unhandled error: {}", error);
    }
    if matches!(error, HttpError::NotFound { .. }) && !wants_json {
        return LarixResponse::not_found().with_html(NOT_FOUND_PAGE);
    }
    error.into_response(debug)
}

const NOT_FOUND_PAGE: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n\
<meta charset=\"UTF-8\">\n<title>Not Found</title>\n</head>\n<body>\n\
<h1>404</h1>\n<p>Not Found</p>\n</body>\n</html>\n";
