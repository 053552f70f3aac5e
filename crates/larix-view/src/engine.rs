//! Tera-backed view engine
//!
//! Templates are read from a views directory, compiled from Blade syntax
//! through the [`TemplateCache`] and registered with tera under slash names
//! (`users/index.html`). Callers use dot names (`users.index`).

use crate::cache::TemplateCache;
use crate::compiler::{template_name, TemplateCompiler};
use crate::components::{csrf_input, ComponentFilter, ComponentRegistry, TemplateComponent};
use crate::error::tera_message;
use crate::{ViewError, ViewResult};
use html_escape::{encode_double_quoted_attribute, encode_safe};
use larix_core::Config;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::{Context, Tera};

pub const DEFAULT_VIEWS_PATH: &str = "resources/views";

/// Resolves a named route and its parameters to a URL
pub type UrlGenerator = Arc<dyn Fn(&str, &HashMap<String, String>) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub path: PathBuf,
    pub base_url: String,
    pub asset_url: Option<String>,
    pub environment: String,
    pub cache_capacity: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_VIEWS_PATH),
            base_url: "http://localhost".to_string(),
            asset_url: None,
            environment: "production".to_string(),
            cache_capacity: crate::cache::DEFAULT_CAPACITY,
        }
    }
}

impl ViewConfig {
    /// Reads `view.path`, `view.cache_size`, `app.url`, `app.asset_url` and `app.env`
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            path: config
                .get_string("view.path")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            base_url: config.get_string("app.url").unwrap_or(defaults.base_url),
            asset_url: config.get_string("app.asset_url"),
            environment: config.get_string("app.env").unwrap_or(defaults.environment),
            cache_capacity: config
                .get_i64("view.cache_size")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.cache_capacity),
        }
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn asset_url(mut self, url: impl Into<String>) -> Self {
        self.asset_url = Some(url.into());
        self
    }

    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.environment = env.into();
        self
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("//") {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_arg(args: &HashMap<String, Value>, key: &str, function: &str) -> tera::Result<String> {
    args.get(key)
        .map(as_text)
        .ok_or_else(|| tera::Error::msg(format!("`{}` needs a `{}` argument", function, key)))
}

struct Escape;

impl tera::Filter for Escape {
    fn filter(&self, value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
        Ok(Value::String(encode_safe(&as_text(value)).into_owned()))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

struct Nl2br;

impl tera::Filter for Nl2br {
    fn filter(&self, value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
        let escaped = encode_safe(&as_text(value)).replace("\r\n", "\n");
        Ok(Value::String(escaped.replace('\n', "<br>\n")))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

struct Sanitize;

impl tera::Filter for Sanitize {
    fn filter(&self, value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let html = as_text(value);
        let cleaned = match args.get("tags").and_then(Value::as_str) {
            Some(tags) => {
                let tags: Vec<&str> = tags.split(',').map(str::trim).collect();
                larix_security::sanitize_html(&html, &tags)
            }
            None => larix_security::sanitize_html(&html, larix_security::sanitizer::DEFAULT_ALLOWED_TAGS),
        };
        Ok(Value::String(cleaned))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

/// `asset(path=...)` and `url(path=...)`; output is attribute-encoded
struct UrlFunction {
    function: &'static str,
    base: String,
}

impl tera::Function for UrlFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let url = join_url(&self.base, &string_arg(args, "path", self.function)?);
        Ok(Value::String(encode_double_quoted_attribute(&url).into_owned()))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

struct RouteFunction {
    generator: UrlGenerator,
}

impl tera::Function for RouteFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = string_arg(args, "name", "route")?;
        let params: HashMap<String, String> = args
            .iter()
            .filter(|(key, _)| key.as_str() != "name")
            .map(|(key, value)| (key.clone(), as_text(value)))
            .collect();
        let url = (self.generator)(&name, &params)
            .ok_or_else(|| tera::Error::msg(format!("Route [{}] not defined", name)))?;
        Ok(Value::String(encode_double_quoted_attribute(&url).into_owned()))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

struct CsrfField;

impl tera::Function for CsrfField {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let token = args.get("token").map(as_text).unwrap_or_default();
        Ok(Value::String(csrf_input(&token)))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

fn str_limit(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = as_text(value);
    let limit = args
        .get("n")
        .or_else(|| args.get("limit"))
        .and_then(Value::as_u64)
        .unwrap_or(100) as usize;
    let end = args.get("end").map(as_text).unwrap_or_else(|| "...".to_string());
    if text.chars().count() <= limit {
        return Ok(Value::String(text));
    }
    let cut: String = text.chars().take(limit).collect();
    Ok(Value::String(format!("{}{}", cut.trim_end(), end)))
}

fn upper_first(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = as_text(value);
    let mut chars = text.chars();
    let upper = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    Ok(Value::String(upper))
}

/// Set for `@isset`: defined and not null
fn filled(value: Option<&Value>, _: &[Value]) -> tera::Result<bool> {
    Ok(!matches!(value, None | Some(Value::Null)))
}

/// Blank for `@empty`: undefined, null, false, zero or an empty string/array/object
fn blank(value: Option<&Value>, _: &[Value]) -> tera::Result<bool> {
    Ok(match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s.is_empty() || s == "0",
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
    })
}

pub struct ViewEngine {
    tera: Tera,
    compiler: TemplateCompiler,
    cache: TemplateCache,
    components: Arc<ComponentRegistry>,
    url_generator: Option<UrlGenerator>,
    config: ViewConfig,
}

impl fmt::Debug for ViewEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewEngine")
            .field("config", &self.config)
            .field("templates", &self.template_names())
            .field("components", &self.components)
            .finish()
    }
}

impl ViewEngine {
    /// Engine over `views_dir`, loading every template in it
    pub fn new(views_dir: impl Into<PathBuf>) -> ViewResult<Self> {
        Self::with_config(ViewConfig::default().path(views_dir))
    }

    pub fn with_config(config: ViewConfig) -> ViewResult<Self> {
        let mut engine = Self::empty(config);
        if engine.config.path.is_dir() {
            engine.load()?;
        } else {
            tracing::debug!(path = %engine.config.path.display(), "Views directory missing; no templates loaded");
        }
        Ok(engine)
    }

    /// Engine with no templates; add them with [`ViewEngine::add_template`]
    pub fn empty(config: ViewConfig) -> Self {
        let mut engine = Self {
            tera: Tera::default(),
            compiler: TemplateCompiler::new(),
            cache: TemplateCache::new(config.cache_capacity),
            components: Arc::new(ComponentRegistry::new()),
            url_generator: None,
            config,
        };
        engine.register_builtins();
        engine
    }

    fn register_builtins(&mut self) {
        self.tera.register_filter("e", Escape);
        self.tera.register_filter("nl2br", Nl2br);
        self.tera.register_filter("sanitize", Sanitize);
        self.tera.register_filter("str_limit", str_limit);
        self.tera.register_filter("upper_first", upper_first);
        self.tera.register_filter(
            "component",
            ComponentFilter {
                registry: self.components.clone(),
            },
        );
        self.tera.register_tester("filled", filled);
        self.tera.register_tester("blank", blank);

        let asset_base = self
            .config
            .asset_url
            .clone()
            .unwrap_or_else(|| self.config.base_url.clone());
        self.tera.register_function(
            "asset",
            UrlFunction {
                function: "asset",
                base: asset_base,
            },
        );
        self.tera.register_function(
            "url",
            UrlFunction {
                function: "url",
                base: self.config.base_url.clone(),
            },
        );
        self.tera.register_function("csrf_field", CsrfField);
        if let Some(generator) = self.url_generator.clone() {
            self.tera.register_function("route", RouteFunction { generator });
        }
    }

    /// Install the generator behind `route(name=..., param=...)`
    pub fn set_url_generator(&mut self, generator: UrlGenerator) {
        self.url_generator = Some(generator.clone());
        self.tera.register_function("route", RouteFunction { generator });
    }

    /// Load every `*.html` file under the views directory, returning the count.
    ///
    /// Files under `components/` are also registered as components.
    pub fn load(&mut self) -> ViewResult<usize> {
        let root = self.config.path.clone();
        let mut files = Vec::new();
        collect_templates(&root, &root, &mut files)?;

        let mut compiled = Vec::with_capacity(files.len());
        for (name, path) in files {
            let source = fs::read_to_string(&path)?;
            let template = self
                .cache
                .get_or_compile(&name, &source, || self.compiler.compile(&name, &source))?;
            if let Some(component) = name.strip_prefix("components/") {
                let component = component.trim_end_matches(".html").replace('/', ".");
                self.components
                    .register(TemplateComponent::new(component, &template)?);
            }
            compiled.push((name, template));
        }

        let count = compiled.len();
        self.tera
            .add_raw_templates(compiled.iter().map(|(name, template)| (name.as_str(), &**template)))
            .map_err(|e| ViewError::from_tera(&root.display().to_string(), e))?;
        tracing::info!(path = %root.display(), templates = count, "Loaded views");
        Ok(count)
    }

    /// Drop every template and load the views directory again
    pub fn reload(&mut self) -> ViewResult<usize> {
        self.tera = Tera::default();
        self.register_builtins();
        self.load()
    }

    /// Register a template from a string; `name` may use dots or slashes
    pub fn add_template(&mut self, name: &str, source: &str) -> ViewResult<()> {
        let name = template_name(name);
        let compiled = self
            .cache
            .get_or_compile(&name, source, || self.compiler.compile(&name, source))?;
        self.tera
            .add_raw_template(&name, &compiled)
            .map_err(|e| ViewError::compile(&name, tera_message(&e)))
    }

    pub fn exists(&self, name: &str) -> bool {
        let name = template_name(name);
        self.tera.get_template_names().any(|t| t == name)
    }

    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tera.get_template_names().map(str::to_string).collect();
        names.sort();
        names
    }

    pub fn render(&self, name: &str, context: &Context) -> ViewResult<String> {
        if !self.exists(name) {
            return Err(ViewError::NotFound(name.to_string()));
        }
        let mut context = context.clone();
        let defaults = [
            ("csrf_token", json!("")),
            ("abilities", json!([])),
            ("app_env", json!(self.config.environment)),
        ];
        for (key, value) in defaults {
            if !context.contains_key(key) {
                context.insert(key, &value);
            }
        }
        self.tera
            .render(&template_name(name), &context)
            .map_err(|e| ViewError::from_tera(name, e))
    }

    /// Compile and render a one-off template string
    pub fn render_str(&mut self, source: &str, context: &Context) -> ViewResult<String> {
        let compiled = self.compiler.compile("inline", source)?;
        let mut context = context.clone();
        if !context.contains_key("app_env") {
            context.insert("app_env", &self.config.environment);
        }
        self.tera
            .render_str(&compiled, &context)
            .map_err(|e| ViewError::from_tera("inline", e))
    }

    pub fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }

    /// Register a custom `@name(...)` directive
    pub fn directive<F>(&mut self, name: &str, handler: F) -> ViewResult<()>
    where
        F: Fn(Option<&str>) -> String + Send + Sync + 'static,
    {
        self.compiler.directive(name, handler)
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }
}

/// `(template name, path)` for every view below `dir`
fn collect_templates(root: &Path, dir: &Path, found: &mut Vec<(String, PathBuf)>) -> ViewResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates(root, &path, found)?;
            continue;
        }
        let Some(file) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        if !file.ends_with(".html") {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .map_err(|e| ViewError::Configuration(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
            .replace(".larix.html", ".html");
        found.push((name, path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine() -> ViewEngine {
        ViewEngine::empty(ViewConfig::default().base_url("https://app.test/").environment("local"))
    }

    fn render(engine: &mut ViewEngine, source: &str, context: &Context) -> String {
        engine.add_template("inline.test", source).unwrap();
        engine.render("inline.test", context).unwrap()
    }

    #[test]
    fn test_escaping_and_raw_output() {
        let mut engine = engine();
        let mut context = Context::new();
        context.insert("name", "<b>Ada</b>");
        assert_eq!(
            render(&mut engine, "{{ $name }}|{!! $name !!}", &context),
            "&lt;b&gt;Ada&lt;&#x2F;b&gt;|<b>Ada</b>"
        );
    }

    #[test]
    fn test_inline_section_values_are_escaped_once() {
        let mut engine = engine();
        let mut context = Context::new();
        context.insert("name", "<i>Ada</i>");
        context.insert("plain", "Tom & Jerry");
        assert_eq!(
            render(&mut engine, "@yield('title', 'Hi ' ~ name)", &context),
            "Hi &lt;i&gt;Ada&lt;&#x2F;i&gt;"
        );
        assert_eq!(
            render(&mut engine, "@yield('title', $plain)", &context),
            "Tom &amp; Jerry"
        );
    }

    #[test]
    fn test_filters() {
        let mut engine = engine();
        let mut context = Context::new();
        context.insert("bio", "line one\nline <two>");
        context.insert("title", "hello world");
        context.insert("html", r#"<p onclick="x()">ok</p><script>bad()</script>"#);

        assert_eq!(
            render(&mut engine, "{{ bio | nl2br }}", &context),
            "line one<br>\nline &lt;two&gt;"
        );
        assert_eq!(render(&mut engine, "{{ title | str_limit(n=5) }}", &context), "hello...");
        assert_eq!(render(&mut engine, "{{ title | upper_first }}", &context), "Hello world");
        assert_eq!(render(&mut engine, "{{ html | sanitize }}", &context), "<p>ok</p>");
        assert_eq!(render(&mut engine, "{{ title | e }}", &context), "hello world");
    }

    #[test]
    fn test_functions() {
        let mut engine = engine();
        let context = Context::new();
        assert_eq!(
            render(&mut engine, "{{ url(path='/users') }} {{ asset(path='css/app.css') }}", &context),
            "https://app.test/users https://app.test/css/app.css"
        );
        assert_eq!(
            render(&mut engine, "{{ csrf_field(token='t0k') }}", &context),
            r#"<input type="hidden" name="_token" value="t0k">"#
        );

        engine.add_template("r", "{{ route(name='users.show', id=7) }}").unwrap();
        assert!(engine.render("r", &context).is_err());
        engine.set_url_generator(Arc::new(|name: &str, params: &HashMap<String, String>| {
            (name == "users.show").then(|| format!("/users/{}", params["id"]))
        }));
        assert_eq!(engine.render("r", &context).unwrap(), "/users/7");
    }

    #[test]
    fn test_conditionals_see_defaults() {
        let mut engine = engine();
        let source = "@auth A @endauth@guest G @endguest@can('edit') E @endcan@env('local') L @endenv";
        assert_eq!(render(&mut engine, source, &Context::new()), " G  L ");

        let mut context = Context::new();
        context.insert("auth_user", &json!({"name": "ada"}));
        context.insert("abilities", &vec!["edit"]);
        assert_eq!(render(&mut engine, source, &context), " A  E  L ");
    }

    #[test]
    fn test_isset_and_empty() {
        let mut engine = engine();
        let source = "@isset($a) set @endisset|@empty($b) empty @endempty";
        let mut context = Context::new();
        assert_eq!(render(&mut engine, source, &context), "| empty ");
        context.insert("a", &json!(null));
        context.insert("b", &json!([1]));
        assert_eq!(render(&mut engine, source, &context), "|");
        context.insert("a", &0);
        assert_eq!(render(&mut engine, source, &context), " set |");
    }

    #[test]
    fn test_loading_layouts_and_partials() {
        let dir = TempDir::new().unwrap();
        let views = dir.path();
        fs::create_dir_all(views.join("layouts")).unwrap();
        fs::create_dir_all(views.join("partials")).unwrap();
        fs::write(
            views.join("layouts/app.html"),
            "<title>@yield('title', 'App')</title><main>@yield('content')</main>",
        )
        .unwrap();
        fs::write(views.join("partials/nav.html"), "<nav>{{ $active }}</nav>").unwrap();
        fs::write(
            views.join("home.larix.html"),
            "@extends('layouts.app')\n@section('content')@include('partials.nav', ['active' => 'home']) Hi {{ $name }}@endsection",
        )
        .unwrap();

        let engine = ViewEngine::new(views).unwrap();
        assert!(engine.exists("home"));
        assert!(engine.exists("layouts.app"));
        assert!(!engine.exists("missing"));

        let mut context = Context::new();
        context.insert("name", "Ada");
        assert_eq!(
            engine.render("home", &context).unwrap(),
            "<title>App</title><main><nav>home</nav> Hi Ada</main>"
        );
        assert!(matches!(engine.render("missing", &context), Err(ViewError::NotFound(_))));
    }

    #[test]
    fn test_components_in_templates() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("components")).unwrap();
        fs::write(
            dir.path().join("components/badge.html"),
            r#"<span class="badge">{{ slot | safe }}</span>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("page.html"),
            "@component('alert', ['type' => 'warning']) Careful, {{ $who }} @endcomponent\
             @component('badge') new @endcomponent",
        )
        .unwrap();

        let engine = ViewEngine::new(dir.path()).unwrap();
        let mut context = Context::new();
        context.insert("who", "<you>");
        assert_eq!(
            engine.render("page", &context).unwrap(),
            r#"<div class="alert alert-warning" role="alert">Careful, &lt;you&gt;</div><span class="badge">new</span>"#
        );

        let mut engine = engine;
        engine.add_template("bad", "@component('nope') x @endcomponent").unwrap();
        let err = engine.render("bad", &context).unwrap_err();
        assert!(err.to_string().contains("Unknown component [nope]"));
    }

    #[test]
    fn test_templates_compile_once() {
        let mut engine = engine();
        engine.add_template("a", "{{ $x }}").unwrap();
        engine.add_template("a", "{{ $x }}").unwrap();
        assert_eq!(engine.cache().stats(), (1, 1));
    }
}
