//! A single route: methods, URI template, handler and attached metadata

use crate::errors::{HttpError, HttpResult};
use crate::request::LarixRequest;
use crate::response::LarixResponse;
use axum::http::Method;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HttpResult<LarixResponse>> + Send>>;

/// Type-erased route handler
pub type Handler = Arc<dyn Fn(LarixRequest) -> HandlerFuture + Send + Sync>;

/// Box an async function into a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(LarixRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResult<LarixResponse>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

const DEFAULT_PARAM_PATTERN: &str = "[^/]+";

/// One piece of a parsed URI template
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Literal(String),
    Param {
        name: String,
        pattern: Option<String>,
        optional: bool,
    },
}

/// Split a URI template into literals and `{name}`, `{name?}`, `{name:regex}`
/// placeholders. Braces inside inline patterns are balanced.
pub(crate) fn parse_template(uri: &str) -> HttpResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = uri.chars();

    while let Some(c) = chars.next() {
        if c != '{' {
            literal.push(c);
            continue;
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }

        let mut depth = 1;
        let mut inner = String::new();
        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            inner.push(c);
        }
        if depth != 0 {
            return Err(HttpError::config(format!("Unclosed parameter in route '{}'", uri)));
        }

        let (head, pattern) = match inner.split_once(':') {
            Some((head, pattern)) => (head, Some(pattern.to_string())),
            None => (inner.as_str(), None),
        };
        let (name, optional) = match head.strip_suffix('?') {
            Some(name) => (name, true),
            None => (head, false),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(HttpError::config(format!(
                "Invalid parameter name '{}' in route '{}'",
                name, uri
            )));
        }
        segments.push(Segment::Param {
            name: name.to_string(),
            pattern,
            optional,
        });
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Registered route
#[derive(Clone)]
pub struct Route {
    methods: Vec<Method>,
    uri: String,
    handler: Handler,
    name: Option<String>,
    name_prefix: String,
    middleware: Vec<String>,
    wheres: HashMap<String, String>,
    params: Vec<String>,
    regex: Regex,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("uri", &self.uri)
            .field("name", &self.name)
            .field("middleware", &self.middleware)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl Route {
    pub fn new(methods: Vec<Method>, uri: &str, handler: Handler) -> HttpResult<Self> {
        let uri = uri.trim_matches('/').to_string();
        let wheres = HashMap::new();
        let (regex, params) = compile(&uri, &wheres)?;
        Ok(Self {
            methods,
            uri,
            handler,
            name: None,
            name_prefix: String::new(),
            middleware: Vec::new(),
            wheres,
            params,
            regex,
        })
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// URI template without leading or trailing slashes
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn handler(&self) -> Handler {
        self.handler.clone()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn middleware(&self) -> &[String] {
        &self.middleware
    }

    pub fn wheres(&self) -> &HashMap<String, String> {
        &self.wheres
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.params
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Name the route; group name prefixes are prepended
    pub fn set_name(&mut self, name: &str) {
        self.name = Some(format!("{}{}", self.name_prefix, name));
    }

    pub(crate) fn set_name_prefix(&mut self, prefix: String) {
        self.name_prefix = prefix;
    }

    pub fn add_middleware<I, S>(&mut self, middleware: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware.extend(middleware.into_iter().map(Into::into));
    }

    /// Constrain a parameter with a regex and recompile
    pub fn set_where(&mut self, param: &str, pattern: &str) -> HttpResult<()> {
        let mut wheres = self.wheres.clone();
        wheres.insert(param.to_string(), pattern.to_string());
        let (regex, params) = compile(&self.uri, &wheres)?;
        self.wheres = wheres;
        self.regex = regex;
        self.params = params;
        Ok(())
    }

    /// Whether the route accepts `method`; GET routes also answer HEAD
    pub fn allows_method(&self, method: &Method) -> bool {
        self.methods.iter().any(|m| {
            m == method || (*method == Method::HEAD && *m == Method::GET)
        })
    }

    /// Match a request path, returning captured parameters
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path.trim_matches('/'))?;
        Some(
            self.params
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }

    pub fn matches(&self, method: &Method, path: &str) -> Option<HashMap<String, String>> {
        if self.allows_method(method) {
            self.match_path(path)
        } else {
            None
        }
    }

    /// Fill the template with `params`; the URL has a leading slash.
    ///
    /// Parameters that are not part of the template become a query string.
    pub fn build_url(&self, params: &HashMap<String, String>) -> HttpResult<String> {
        let mut path = String::new();
        let mut used = Vec::new();

        for segment in parse_template(&self.uri)? {
            match segment {
                Segment::Literal(text) => path.push_str(&text),
                Segment::Param { name, optional, .. } => match params.get(&name) {
                    Some(value) => {
                        path.push_str(&encode_segment(value)?);
                        used.push(name);
                    }
                    None if optional => {
                        if path.ends_with('/') {
                            path.pop();
                        }
                    }
                    None => {
                        return Err(HttpError::bad_request(format!(
                            "Missing required parameter [{}] for route [{}]",
                            name,
                            self.name.as_deref().unwrap_or(&self.uri)
                        )))
                    }
                },
            }
        }

        let mut url = format!("/{}", path.trim_end_matches('/'));
        let mut extra: Vec<(&String, &String)> =
            params.iter().filter(|(k, _)| !used.contains(*k)).collect();
        if !extra.is_empty() {
            extra.sort();
            let query = serde_urlencoded::to_string(&extra)
                .map_err(|e| HttpError::internal(format!("Query encoding failed: {}", e)))?;
            url.push('?');
            url.push_str(&query);
        }
        Ok(url)
    }

    /// Methods joined with `|`, as shown in route listings
    pub fn methods_label(&self) -> String {
        let mut labels: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        if self.methods.contains(&Method::GET) && !self.methods.contains(&Method::HEAD) {
            labels.push("HEAD");
        }
        labels.join("|")
    }
}

/// Compile a trimmed URI template into an anchored regex
fn compile(uri: &str, wheres: &HashMap<String, String>) -> HttpResult<(Regex, Vec<String>)> {
    let segments = parse_template(uri)?;
    let mut pattern = String::from("^");
    let mut params = Vec::new();

    for segment in segments {
        match segment {
            Segment::Literal(text) => pattern.push_str(&regex::escape(&text)),
            Segment::Param {
                name,
                pattern: inline,
                optional,
            } => {
                let param_pattern = wheres
                    .get(&name)
                    .cloned()
                    .or(inline)
                    .unwrap_or_else(|| DEFAULT_PARAM_PATTERN.to_string());
                if optional {
                    // the slash before an optional parameter moves into its group
                    let slash = if pattern.ends_with('/') {
                        pattern.pop();
                        "/"
                    } else {
                        ""
                    };
                    pattern.push_str(&format!("(?:{}(?P<{}>{}))?", slash, name, param_pattern));
                } else {
                    pattern.push_str(&format!("(?P<{}>{})", name, param_pattern));
                }
                params.push(name);
            }
        }
    }
    pattern.push('$');

    let regex = Regex::new(&pattern)
        .map_err(|e| HttpError::config(format!("Invalid route pattern '{}': {}", uri, e)))?;
    Ok((regex, params))
}

/// Percent-encodes a parameter value as a single path segment.
fn encode_segment(value: &str) -> HttpResult<String> {
    let mut url = Url::parse("http://localhost/")
        .map_err(|e| HttpError::internal(format!("URL encoding failed: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| HttpError::internal("URL encoding failed"))?
        .clear()
        .push(value);
    Ok(url.path().trim_start_matches('/').to_string())
}
