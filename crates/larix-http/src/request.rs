//! Request abstraction
//!
//! Wraps the pieces of an incoming request together with route parameters,
//! typed extensions and the buffered body.

use crate::errors::{HttpError, HttpResult};
use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Uri},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

/// Route metadata stored on a request once it has been dispatched
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
    pub uri: String,
    pub name: Option<String>,
    pub methods: Vec<Method>,
    pub middleware: Vec<String>,
}

/// Identifier of the authenticated user, inserted by auth middleware
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

/// Primary role of the authenticated user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRole(pub String);

/// Audience segments the current user belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSegments(pub Vec<String>);

/// Incoming request
#[derive(Debug)]
pub struct LarixRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    body_bytes: Option<Bytes>,
    remote_addr: Option<SocketAddr>,
    route_name: Option<String>,
}

impl LarixRequest {
    /// Create a request; query parameters are parsed from the URI
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let query_params = uri
            .query()
            .map(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).unwrap_or_default())
            .unwrap_or_default()
            .into_iter()
            .collect();

        Self {
            method,
            uri,
            headers,
            path_params: HashMap::new(),
            query_params,
            extensions: HashMap::new(),
            body_bytes: None,
            remote_addr: None,
            route_name: None,
        }
    }

    /// Build a request from a method and a URI string.
    ///
    /// An unparsable URI falls back to `/`.
    pub fn build(method: Method, uri: &str) -> Self {
        let uri = uri.parse().unwrap_or_else(|_| Uri::from_static("/"));
        Self::new(method, uri, HeaderMap::new())
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body_bytes = Some(body.into());
        self
    }

    pub fn set_body(&mut self, body: Bytes) {
        self.body_bytes = Some(body);
    }

    /// Add a header (consuming, invalid pairs are logged and skipped)
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        if let Err(e) = self.add_header(key, value) {
            tracing::warn!("Ignoring request header {}: {}", key, e);
        }
        self
    }

    pub fn add_header(&mut self, key: &str, value: &str) -> HttpResult<()> {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| HttpError::bad_request(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::bad_request(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn with_path_params(mut self, params: HashMap<String, String>) -> Self {
        self.path_params = params;
        self
    }

    pub fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn path_param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    /// Path parameter parsed into `T`
    pub fn path_param_parsed<T>(&self, name: &str) -> HttpResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self
            .path_param(name)
            .ok_or_else(|| HttpError::bad_request(format!("Missing path parameter: {}", name)))?;
        raw.parse::<T>().map_err(|e| {
            HttpError::bad_request(format!("Invalid path parameter {}: {}", name, e))
        })
    }

    pub fn query_param(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of a cookie sent with the request
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all("cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.trim().to_string())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Whether the body is declared as JSON
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/json") || ct.contains("+json"))
            .unwrap_or(false)
    }

    pub fn is_form(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    /// Whether the client asked for a JSON response
    pub fn wants_json(&self) -> bool {
        self.header("accept")
            .map(|accept| accept.contains("application/json") || accept.contains("+json"))
            .unwrap_or(false)
    }

    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with")
            .map(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
            .unwrap_or(false)
    }

    pub fn bearer_token(&self) -> Option<String> {
        let auth = self.header("authorization")?;
        let (scheme, token) = auth.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
            Some(token.trim().to_string())
        } else {
            None
        }
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    /// Client IP address.
    ///
    /// Order: first `X-Forwarded-For` entry, `X-Real-IP`, the connection
    /// address and finally `127.0.0.1`.
    pub fn ip(&self) -> String {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return first.to_string();
            }
        }
        if let Some(real_ip) = self.header("x-real-ip") {
            let real_ip = real_ip.trim();
            if !real_ip.is_empty() {
                return real_ip.to_string();
            }
        }
        self.remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body_bytes.as_ref()
    }

    pub fn body_text(&self) -> Option<String> {
        self.body_bytes
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Deserialize the JSON body
    pub fn json<T: DeserializeOwned>(&self) -> HttpResult<T> {
        let bytes = self
            .body_bytes
            .as_ref()
            .ok_or_else(|| HttpError::bad_request("No request body"))?;
        serde_json::from_slice(bytes)
            .map_err(|e| HttpError::bad_request(format!("Invalid JSON body: {}", e)))
    }

    /// Deserialize a urlencoded form body
    pub fn form<T: DeserializeOwned>(&self) -> HttpResult<T> {
        let bytes = self
            .body_bytes
            .as_ref()
            .ok_or_else(|| HttpError::bad_request("No request body"))?;
        serde_urlencoded::from_bytes(bytes)
            .map_err(|e| HttpError::bad_request(format!("Invalid form body: {}", e)))
    }

    fn form_fields(&self) -> Vec<(String, String)> {
        if !self.is_form() {
            return Vec::new();
        }
        self.body_bytes
            .as_ref()
            .and_then(|b| serde_urlencoded::from_bytes::<Vec<(String, String)>>(b).ok())
            .unwrap_or_default()
    }

    fn json_fields(&self) -> Map<String, Value> {
        if !self.is_json() {
            return Map::new();
        }
        match self
            .body_bytes
            .as_ref()
            .and_then(|b| serde_json::from_slice::<Value>(b).ok())
        {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Query, form and JSON input merged; body values win over the query
    pub fn all_input(&self) -> Map<String, Value> {
        let mut input: Map<String, Value> = self
            .query_params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        for (k, v) in self.form_fields() {
            input.insert(k, Value::String(v));
        }
        input.extend(self.json_fields());
        input
    }

    pub fn input(&self, key: &str) -> Option<Value> {
        self.all_input().remove(key)
    }

    /// Input value as a string; numbers and booleans are stringified
    pub fn input_str(&self, key: &str) -> Option<String> {
        match self.input(key)? {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn has_input(&self, key: &str) -> bool {
        self.all_input().contains_key(key)
    }

    /// Method after `_method` form spoofing is applied to POST requests.
    /// Only PUT, PATCH and DELETE can be spoofed.
    pub fn effective_method(&self) -> Method {
        if self.method != Method::POST {
            return self.method.clone();
        }
        let spoofed = self
            .form_fields()
            .into_iter()
            .find(|(k, _)| k == "_method")
            .map(|(_, v)| v.to_ascii_uppercase());
        match spoofed.as_deref() {
            Some("PUT") => Method::PUT,
            Some("PATCH") => Method::PATCH,
            Some("DELETE") => Method::DELETE,
            _ => Method::POST,
        }
    }

    pub fn is_method(&self, method: &str) -> bool {
        self.effective_method().as_str().eq_ignore_ascii_case(method)
    }

    pub fn route_name(&self) -> Option<&str> {
        self.route_name.as_deref()
    }

    pub fn set_route_name(&mut self, name: Option<String>) {
        self.route_name = name;
    }

    pub fn insert_extension<T: Send + Sync + 'static>(&mut self, data: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(data));
    }

    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    pub fn get_extension_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.extensions
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}
