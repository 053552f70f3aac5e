//! Reusable view components
//!
//! `@component('alert', ['type' => 'danger']) ... @endcomponent` compiles to a
//! tera filter section; the rendered body becomes the component's slot, with
//! `@slot('name')` blocks pulled out as named slots.

use crate::{ViewError, ViewResult};
use html_escape::{encode_double_quoted_attribute, encode_safe};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) const SLOT_OPEN: &str = "<!--larix:slot ";
pub(crate) const SLOT_CLOSE: &str = "<!--larix:endslot-->";

static SLOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--larix:slot (\w+)-->(.*?)<!--larix:endslot-->").expect("valid regex")
});

pub type Props = Map<String, Value>;

/// Rendered content handed to a component
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slot {
    pub content: String,
    pub named: HashMap<String, String>,
}

impl Slot {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            named: HashMap::new(),
        }
    }

    /// Split a rendered component body into the default and named slots
    pub fn parse(body: &str) -> Self {
        let mut named = HashMap::new();
        for caps in SLOT.captures_iter(body) {
            named.insert(caps[1].to_string(), caps[2].trim().to_string());
        }
        let content = SLOT.replace_all(body, "").trim().to_string();
        Self { content, named }
    }

    pub fn with(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.named.insert(name.into(), content.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, props: &Props, slot: &Slot) -> ViewResult<String>;
}

/// Text form of a prop; numbers and booleans are stringified
pub fn prop_str(props: &Props, key: &str) -> Option<String> {
    match props.get(key)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub fn prop_bool(props: &Props, key: &str) -> bool {
    match props.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "yes"),
        Some(Value::Number(n)) => n.as_i64().map_or(false, |n| n != 0),
        _ => false,
    }
}

fn attr(value: &str) -> String {
    encode_double_quoted_attribute(value).into_owned()
}

fn text(value: &str) -> String {
    encode_safe(value).into_owned()
}

#[derive(Debug, Default)]
pub struct Alert;

impl Component for Alert {
    fn name(&self) -> &str {
        "alert"
    }

    fn render(&self, props: &Props, slot: &Slot) -> ViewResult<String> {
        let kind = prop_str(props, "type").unwrap_or_else(|| "info".to_string());
        let dismissible = prop_bool(props, "dismissible");

        let mut classes = format!("alert alert-{}", kind);
        if dismissible {
            classes.push_str(" alert-dismissible");
        }
        let mut html = format!(r#"<div class="{}" role="alert">"#, attr(&classes));
        if let Some(title) = slot.get("title") {
            html.push_str(&format!("<strong>{}</strong> ", title));
        }
        if let Some(message) = prop_str(props, "message") {
            html.push_str(&text(&message));
        }
        html.push_str(&slot.content);
        if dismissible {
            html.push_str(r#"<button type="button" class="btn-close" data-bs-dismiss="alert" aria-label="Close"></button>"#);
        }
        html.push_str("</div>");
        Ok(html)
    }
}

#[derive(Debug, Default)]
pub struct Card;

impl Component for Card {
    fn name(&self) -> &str {
        "card"
    }

    fn render(&self, props: &Props, slot: &Slot) -> ViewResult<String> {
        let mut html = String::from(r#"<div class="card">"#);
        if let Some(title) = prop_str(props, "title") {
            html.push_str(&format!(
                r#"<div class="card-header"><h5 class="card-title">{}</h5>"#,
                text(&title)
            ));
            if let Some(subtitle) = prop_str(props, "subtitle") {
                html.push_str(&format!(
                    r#"<h6 class="card-subtitle mb-2 text-muted">{}</h6>"#,
                    text(&subtitle)
                ));
            }
            html.push_str("</div>");
        }
        html.push_str(&format!(r#"<div class="card-body">{}</div>"#, slot.content));

        let footer = slot
            .get("footer")
            .map(str::to_string)
            .or_else(|| prop_str(props, "footer").map(|f| text(&f)));
        if let Some(footer) = footer {
            html.push_str(&format!(r#"<div class="card-footer">{}</div>"#, footer));
        }
        html.push_str("</div>");
        Ok(html)
    }
}

#[derive(Debug, Default)]
pub struct Button;

impl Component for Button {
    fn name(&self) -> &str {
        "button"
    }

    fn render(&self, props: &Props, slot: &Slot) -> ViewResult<String> {
        let variant = prop_str(props, "variant").unwrap_or_else(|| "primary".to_string());
        let disabled = prop_bool(props, "disabled");
        let mut classes = format!("btn btn-{}", variant);
        if let Some(size) = prop_str(props, "size") {
            classes.push_str(&format!(" btn-{}", size));
        }
        let content = if slot.is_empty() {
            text(&prop_str(props, "text").unwrap_or_else(|| "Button".to_string()))
        } else {
            slot.content.clone()
        };

        if let Some(href) = prop_str(props, "href") {
            if disabled {
                classes.push_str(" disabled");
            }
            return Ok(format!(
                r#"<a href="{}" class="{}">{}</a>"#,
                attr(&href),
                attr(&classes),
                content
            ));
        }

        let kind = prop_str(props, "type").unwrap_or_else(|| "button".to_string());
        Ok(format!(
            r#"<button type="{}" class="{}"{}>{}</button>"#,
            attr(&kind),
            attr(&classes),
            if disabled { " disabled" } else { "" },
            content
        ))
    }
}

#[derive(Debug, Default)]
pub struct Form;

impl Component for Form {
    fn name(&self) -> &str {
        "form"
    }

    fn render(&self, props: &Props, slot: &Slot) -> ViewResult<String> {
        let method = prop_str(props, "method")
            .unwrap_or_else(|| "POST".to_string())
            .to_ascii_uppercase();
        let spoofed = !matches!(method.as_str(), "GET" | "POST");
        let actual = if spoofed { "POST" } else { method.as_str() };

        let mut html = format!(r#"<form method="{}""#, actual);
        if let Some(action) = prop_str(props, "action") {
            html.push_str(&format!(r#" action="{}""#, attr(&action)));
        }
        if let Some(enctype) = prop_str(props, "enctype") {
            html.push_str(&format!(r#" enctype="{}""#, attr(&enctype)));
        }
        html.push('>');

        if actual == "POST" {
            let token = prop_str(props, "csrf_token").unwrap_or_default();
            html.push_str(&csrf_input(&token));
        }
        if spoofed {
            html.push_str(&format!(r#"<input type="hidden" name="_method" value="{}">"#, attr(&method)));
        }
        html.push_str(&slot.content);
        html.push_str("</form>");
        Ok(html)
    }
}

pub(crate) fn csrf_input(token: &str) -> String {
    format!(r#"<input type="hidden" name="_token" value="{}">"#, attr(token))
}

/// Components by name, with aliases; shared with the tera `component` filter
#[derive(Default)]
pub struct ComponentRegistry {
    components: RwLock<HashMap<String, Arc<dyn Component>>>,
    aliases: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.names())
            .finish()
    }
}

impl ComponentRegistry {
    /// Registry holding the built-in `alert`, `card`, `button` (alias `btn`) and `form`
    pub fn new() -> Self {
        let registry = Self::default();
        registry.register(Alert);
        registry.register(Card);
        registry.register(Button);
        registry.register(Form);
        registry.alias("btn", "button");
        registry
    }

    pub fn register(&self, component: impl Component + 'static) {
        let name = component.name().to_string();
        tracing::debug!(component = %name, "Registered view component");
        self.components.write().insert(name, Arc::new(component));
    }

    pub fn alias(&self, alias: &str, name: &str) {
        self.aliases.write().insert(alias.to_string(), name.to_string());
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Component>> {
        let name = self
            .aliases
            .read()
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string());
        self.components.read().get(&name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.components.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn render(&self, name: &str, props: &Props, slot: &Slot) -> ViewResult<String> {
        let component = self
            .get(name)
            .ok_or_else(|| ViewError::UnknownComponent(name.to_string()))?;
        component.render(props, slot)
    }
}

/// Component backed by a template, e.g. `resources/views/components/badge.html`.
///
/// The template sees its props, `slot` and every named slot as variables.
pub struct TemplateComponent {
    name: String,
    tera: tera::Tera,
}

impl TemplateComponent {
    pub fn new(name: impl Into<String>, compiled: &str) -> ViewResult<Self> {
        let name = name.into();
        let mut tera = tera::Tera::default();
        tera.add_raw_template("component.html", compiled)
            .map_err(|e| ViewError::from_tera(&name, e))?;
        Ok(Self { name, tera })
    }
}

impl Component for TemplateComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, props: &Props, slot: &Slot) -> ViewResult<String> {
        let mut context = tera::Context::new();
        for (key, value) in props {
            context.insert(key.as_str(), value);
        }
        for (key, value) in &slot.named {
            context.insert(key.as_str(), value);
        }
        context.insert("slot", &slot.content);
        self.tera
            .render("component.html", &context)
            .map_err(|e| ViewError::from_tera(&self.name, e))
    }
}

/// The tera `component` filter; its output is already escaped where needed
pub(crate) struct ComponentFilter {
    pub(crate) registry: Arc<ComponentRegistry>,
}

impl tera::Filter for ComponentFilter {
    fn filter(&self, value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = args
            .get("_component")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("component filter needs a `_component` argument"))?;
        let props: Props = args
            .iter()
            .filter(|(key, _)| key.as_str() != "_component")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let slot = Slot::parse(value.as_str().unwrap_or_default());
        self.registry
            .render(name, &props, &slot)
            .map(Value::String)
            .map_err(|e| tera::Error::msg(e.to_string()))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Props {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_slot_parsing() {
        let slot = Slot::parse("  Body <!--larix:slot footer--> Foot <!--larix:endslot-->\n");
        assert_eq!(slot.content, "Body");
        assert_eq!(slot.get("footer"), Some("Foot"));
        assert_eq!(slot.get("missing"), None);
    }

    #[test]
    fn test_alert() {
        let registry = ComponentRegistry::new();
        let html = registry
            .render(
                "alert",
                &props(json!({"type": "danger", "dismissible": true})),
                &Slot::new("Boom"),
            )
            .unwrap();
        assert!(html.starts_with(r#"<div class="alert alert-danger alert-dismissible" role="alert">"#));
        assert!(html.contains("Boom"));
        assert!(html.contains("btn-close"));

        let plain = registry.render("alert", &Props::new(), &Slot::new("x")).unwrap();
        assert_eq!(plain, r#"<div class="alert alert-info" role="alert">x</div>"#);
    }

    #[test]
    fn test_card_footer_from_slot_or_prop() {
        let registry = ComponentRegistry::new();
        let slot = Slot::new("Body").with("footer", "<a>More</a>");
        let html = registry
            .render("card", &props(json!({"title": "<Stats>"})), &slot)
            .unwrap();
        assert!(html.contains(r#"<h5 class="card-title">&lt;Stats&gt;</h5>"#));
        assert!(html.contains(r#"<div class="card-footer"><a>More</a></div>"#));

        let html = registry
            .render("card", &props(json!({"footer": "plain"})), &Slot::new("Body"))
            .unwrap();
        assert!(!html.contains("card-header"));
        assert!(html.contains(r#"<div class="card-footer">plain</div>"#));
    }

    #[test]
    fn test_button_variants() {
        let registry = ComponentRegistry::new();
        let link = registry
            .render(
                "btn",
                &props(json!({"href": "/x?a=1&b=2", "variant": "secondary"})),
                &Slot::new("Go"),
            )
            .unwrap();
        assert_eq!(link, r#"<a href="/x?a=1&amp;b=2" class="btn btn-secondary">Go</a>"#);

        let button = registry
            .render("button", &props(json!({"type": "submit", "disabled": true})), &Slot::default())
            .unwrap();
        assert_eq!(
            button,
            r#"<button type="submit" class="btn btn-primary" disabled>Button</button>"#
        );
    }

    #[test]
    fn test_form_spoofs_method_and_adds_token() {
        let registry = ComponentRegistry::new();
        let html = registry
            .render(
                "form",
                &props(json!({"action": "/posts/1", "method": "delete", "csrf_token": "abc"})),
                &Slot::new("<button>Delete</button>"),
            )
            .unwrap();
        assert_eq!(
            html,
            r#"<form method="POST" action="/posts/1"><input type="hidden" name="_token" value="abc"><input type="hidden" name="_method" value="DELETE"><button>Delete</button></form>"#
        );

        let get = registry
            .render("form", &props(json!({"method": "get"})), &Slot::default())
            .unwrap();
        assert_eq!(get, r#"<form method="GET"></form>"#);
    }

    #[test]
    fn test_unknown_and_template_components() {
        let registry = ComponentRegistry::new();
        assert!(matches!(
            registry.render("nope", &Props::new(), &Slot::default()),
            Err(ViewError::UnknownComponent(_))
        ));

        let badge = TemplateComponent::new("badge", r#"<span class="badge-{{ color }}">{{ slot }}</span>"#)
            .unwrap();
        registry.register(badge);
        let html = registry
            .render("badge", &props(json!({"color": "red"})), &Slot::new("new"))
            .unwrap();
        assert_eq!(html, r#"<span class="badge-red">new</span>"#);
        assert!(registry.names().contains(&"badge".to_string()));
    }
}
