//! Route table: registration, groups, resources, dispatch and URL generation

use super::resource::{singular, ResourceAction, ResourceController};
use super::route::{handler, Handler, Route};
use crate::errors::{HttpError, HttpResult};
use crate::request::LarixRequest;
use crate::response::LarixResponse;
use axum::http::Method;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Shared attributes for a route group
#[derive(Debug, Clone, Default)]
pub struct GroupAttributes {
    pub prefix: Option<String>,
    pub middleware: Vec<String>,
    /// Name prefix (the `as` attribute), e.g. `admin.`
    pub name: Option<String>,
}

impl GroupAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn middleware<I, S>(mut self, middleware: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware.extend(middleware.into_iter().map(Into::into));
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// A dispatched route with its captured parameters
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

/// Row of the route listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    pub methods: String,
    pub uri: String,
    pub name: Option<String>,
    pub middleware: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<Route>,
    group_stack: Vec<GroupAttributes>,
    base_url: String,
    errors: Vec<String>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            group_stack: Vec::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            errors: Vec::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register a route for `methods`, applying the active group attributes
    pub fn add(&mut self, methods: Vec<Method>, uri: &str, handler: Handler) -> &mut Self {
        let mut full_uri = String::new();
        let mut middleware = Vec::new();
        let mut name_prefix = String::new();
        for group in &self.group_stack {
            if let Some(prefix) = group.prefix.as_deref().map(|p| p.trim_matches('/')) {
                if !prefix.is_empty() {
                    full_uri.push_str(prefix);
                    full_uri.push('/');
                }
            }
            middleware.extend(group.middleware.iter().cloned());
            if let Some(name) = &group.name {
                name_prefix.push_str(name);
            }
        }
        full_uri.push_str(uri.trim_matches('/'));

        match Route::new(methods, &full_uri, handler) {
            Ok(mut route) => {
                route.set_name_prefix(name_prefix);
                route.add_middleware(middleware);
                self.routes.push(route);
            }
            Err(e) => {
                tracing::error!("Failed to register route '{}': {}", full_uri, e);
                self.errors.push(e.to_string());
            }
        }
        self
    }

    fn add_fn<F, Fut>(&mut self, methods: Vec<Method>, uri: &str, f: F) -> &mut Self
    where
        F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
    {
        self.add(methods, uri, handler(f))
    }

    pub fn get<F, Fut>(&mut self, uri: &str, f: F) -> &mut Self
    where
        F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
    {
        self.add_fn(vec![Method::GET], uri, f)
    }

    pub fn post<F, Fut>(&mut self, uri: &str, f: F) -> &mut Self
    where
        F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
    {
        self.add_fn(vec![Method::POST], uri, f)
    }

    pub fn put<F, Fut>(&mut self, uri: &str, f: F) -> &mut Self
    where
        F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
    {
        self.add_fn(vec![Method::PUT], uri, f)
    }

    pub fn patch<F, Fut>(&mut self, uri: &str, f: F) -> &mut Self
    where
        F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
    {
        self.add_fn(vec![Method::PATCH], uri, f)
    }

    pub fn delete<F, Fut>(&mut self, uri: &str, f: F) -> &mut Self
    where
        F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
    {
        self.add_fn(vec![Method::DELETE], uri, f)
    }

    pub fn options<F, Fut>(&mut self, uri: &str, f: F) -> &mut Self
    where
        F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
    {
        self.add_fn(vec![Method::OPTIONS], uri, f)
    }

    /// Route answering every common verb
    pub fn any<F, Fut>(&mut self, uri: &str, f: F) -> &mut Self
    where
        F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
    {
        let methods = vec![
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ];
        self.add_fn(methods, uri, f)
    }

    pub fn match_methods<F, Fut>(&mut self, methods: &[Method], uri: &str, f: F) -> &mut Self
    where
        F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
    {
        self.add_fn(methods.to_vec(), uri, f)
    }

    /// Register routes inside `callback` with shared attributes
    pub fn group<F>(&mut self, attributes: GroupAttributes, callback: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        self.group_stack.push(attributes);
        callback(self);
        self.group_stack.pop();
        self
    }

    /// Name the most recently registered route
    pub fn name(&mut self, name: &str) -> &mut Self {
        if let Some(route) = self.routes.last_mut() {
            route.set_name(name);
        }
        self
    }

    /// Attach middleware to the most recently registered route
    pub fn middleware<I, S>(&mut self, middleware: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(route) = self.routes.last_mut() {
            route.add_middleware(middleware);
        }
        self
    }

    /// Constrain a parameter of the most recently registered route
    pub fn where_(&mut self, param: &str, pattern: &str) -> &mut Self {
        if let Some(route) = self.routes.last_mut() {
            if let Err(e) = route.set_where(param, pattern) {
                tracing::error!("Invalid constraint for '{}': {}", param, e);
                self.errors.push(e.to_string());
            }
        }
        self
    }

    pub fn where_number(&mut self, param: &str) -> &mut Self {
        self.where_(param, "[0-9]+")
    }

    pub fn where_alpha(&mut self, param: &str) -> &mut Self {
        self.where_(param, "[a-zA-Z]+")
    }

    /// Register the seven conventional resource routes
    pub fn resource<C: ResourceController>(&mut self, name: &str, controller: Arc<C>) -> &mut Self {
        self.register_resource(name, controller, &ResourceAction::ALL)
    }

    /// Resource routes without `create` and `edit`
    pub fn api_resource<C: ResourceController>(
        &mut self,
        name: &str,
        controller: Arc<C>,
    ) -> &mut Self {
        self.register_resource(name, controller, &ResourceAction::API)
    }

    fn register_resource<C: ResourceController>(
        &mut self,
        name: &str,
        controller: Arc<C>,
        actions: &[ResourceAction],
    ) -> &mut Self {
        let base = name.trim_matches('/');
        let last = base.rsplit('/').next().unwrap_or(base);
        let param = format!("{{{}}}", singular(last));
        let route_prefix = base.replace('/', ".");

        for action in actions {
            let (methods, uri) = match action {
                ResourceAction::Index => (vec![Method::GET], base.to_string()),
                ResourceAction::Create => (vec![Method::GET], format!("{}/create", base)),
                ResourceAction::Store => (vec![Method::POST], base.to_string()),
                ResourceAction::Show => (vec![Method::GET], format!("{}/{}", base, param)),
                ResourceAction::Edit => (vec![Method::GET], format!("{}/{}/edit", base, param)),
                ResourceAction::Update => {
                    (vec![Method::PUT, Method::PATCH], format!("{}/{}", base, param))
                }
                ResourceAction::Destroy => (vec![Method::DELETE], format!("{}/{}", base, param)),
            };

            let controller = controller.clone();
            let action = *action;
            let action_handler = handler(move |req| {
                let controller = controller.clone();
                async move { action.call(controller.as_ref(), req).await }
            });
            self.add(methods, &uri, action_handler)
                .name(&format!("{}.{}", route_prefix, action.as_str()));
        }
        self
    }

    /// First route matching `method` and `path`
    pub fn dispatch(&self, method: &Method, path: &str) -> HttpResult<RouteMatch<'_>> {
        self.routes
            .iter()
            .find_map(|route| {
                route
                    .matches(method, path)
                    .map(|params| RouteMatch { route, params })
            })
            .ok_or_else(|| HttpError::not_found(format!("{} {}", method, path)))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name() == Some(name))
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    /// Path for a named route
    pub fn route_url(&self, name: &str, params: &HashMap<String, String>) -> HttpResult<String> {
        self.find_by_name(name)
            .ok_or_else(|| HttpError::not_found(format!("route [{}]", name)))?
            .build_url(params)
    }

    /// Absolute URL for `path` below the base URL
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn routes(&self) -> Vec<RouteSummary> {
        self.routes
            .iter()
            .map(|route| RouteSummary {
                methods: route.methods_label(),
                uri: format!("/{}", route.uri()),
                name: route.name().map(String::from),
                middleware: route.middleware().to_vec(),
            })
            .collect()
    }

    pub fn all(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Fail if any registration was rejected
    pub fn validate(&self) -> HttpResult<()> {
        match self.errors.first() {
            Some(error) => Err(HttpError::config(error.clone())),
            None => Ok(()),
        }
    }
}
