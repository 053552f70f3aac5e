//! View factory: shared data, composers and request-aware views

use crate::engine::ViewEngine;
use crate::{ViewError, ViewResult};
use larix_http::{LarixRequest, LarixResponse, Session, UserId};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tera::Context;

pub type Composer = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Authenticated user and granted abilities, inserted into the request by
/// application code so views can use `@auth` and `@can`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewAuth {
    pub user: Value,
    pub abilities: Vec<String>,
}

impl ViewAuth {
    pub fn new(user: &impl Serialize, abilities: Vec<String>) -> ViewResult<Self> {
        Ok(Self {
            user: serde_json::to_value(user)?,
            abilities,
        })
    }
}

/// `*` matches everything, `users.*` every view under `users`
fn matches_pattern(pattern: &str, view: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => view.starts_with(prefix),
        None => pattern == view,
    }
}

pub struct ViewFactory {
    engine: Arc<RwLock<ViewEngine>>,
    shared: RwLock<Map<String, Value>>,
    composers: RwLock<Vec<(String, Composer)>>,
}

impl fmt::Debug for ViewFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<String> = self.composers.read().iter().map(|(p, _)| p.clone()).collect();
        f.debug_struct("ViewFactory")
            .field("shared", &self.shared.read().keys().collect::<Vec<_>>())
            .field("composers", &patterns)
            .finish()
    }
}

impl ViewFactory {
    pub fn new(engine: ViewEngine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            shared: RwLock::new(Map::new()),
            composers: RwLock::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &Arc<RwLock<ViewEngine>> {
        &self.engine
    }

    /// Make `value` available to every view
    pub fn share<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> ViewResult<()> {
        let value = serde_json::to_value(value)?;
        self.shared.write().insert(key.to_string(), value);
        Ok(())
    }

    pub fn shared(&self, key: &str) -> Option<Value> {
        self.shared.read().get(key).cloned()
    }

    /// Run `composer` before rendering any view matching `pattern`
    pub fn composer<F>(&self, pattern: &str, composer: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.composers
            .write()
            .push((pattern.to_string(), Arc::new(composer)));
    }

    pub fn exists(&self, view: &str) -> bool {
        self.engine.read().exists(view)
    }

    pub fn make(&self, view: &str) -> View<'_> {
        View {
            factory: self,
            name: view.to_string(),
            context: Context::new(),
        }
    }

    /// Render with shared data underneath `context` and composers applied last
    pub fn render(&self, view: &str, context: Context) -> ViewResult<String> {
        let mut full = Context::new();
        for (key, value) in self.shared.read().iter() {
            full.insert(key.as_str(), value);
        }
        full.extend(context);

        let composers: Vec<Composer> = self
            .composers
            .read()
            .iter()
            .filter(|(pattern, _)| matches_pattern(pattern, view))
            .map(|(_, composer)| composer.clone())
            .collect();
        for composer in composers {
            composer(&mut full);
        }

        tracing::debug!(view = %view, "Rendering view");
        self.engine.read().render(view, &full)
    }

    /// Render into a `text/html` response
    pub fn render_response(&self, view: &str, context: Context) -> ViewResult<LarixResponse> {
        Ok(LarixResponse::html(self.render(view, context)?))
    }
}

/// A view about to be rendered
pub struct View<'f> {
    factory: &'f ViewFactory,
    name: String,
    context: Context,
}

impl fmt::Debug for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View").field("name", &self.name).finish()
    }
}

impl<'f> View<'f> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        self.context.insert(key, value);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context.extend(context);
        self
    }

    /// Add `csrf_token` from the session and `auth_user`/`abilities` from the
    /// request extensions
    pub fn with_request_context(mut self, request: &LarixRequest) -> Self {
        if let Some(session) = request.get_extension::<Session>() {
            self.context.insert("csrf_token", &session.token());
        }
        match request.get_extension::<ViewAuth>() {
            Some(auth) => {
                self.context.insert("auth_user", &auth.user);
                self.context.insert("abilities", &auth.abilities);
            }
            None => {
                if let Some(UserId(id)) = request.get_extension::<UserId>() {
                    self.context.insert("auth_user", &json!({ "id": id }));
                }
            }
        }
        self
    }

    pub fn render(self) -> ViewResult<String> {
        self.factory.render(&self.name, self.context)
    }

    pub fn into_response(self) -> ViewResult<LarixResponse> {
        self.factory.render_response(&self.name, self.context)
    }
}

impl From<ViewError> for LarixResponse {
    fn from(error: ViewError) -> Self {
        let error: larix_http::HttpError = error.into();
        error.into_response(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ViewConfig;
    use larix_http::{Method, StatusCode};

    fn factory() -> ViewFactory {
        let mut engine = ViewEngine::empty(ViewConfig::default());
        engine
            .add_template("users.index", "{{ $app }}:{{ $title }}:{{ $count ?? 0 }}")
            .unwrap();
        engine
            .add_template("layouts.nav", "@auth {{ $auth_user->id }} @endauth|{{ $csrf_token }}")
            .unwrap();
        ViewFactory::new(engine)
    }

    #[test]
    fn test_shared_data_and_view_data() {
        let factory = factory();
        factory.share("app", "Larix").unwrap();
        factory.share("title", "Shared").unwrap();
        assert_eq!(factory.shared("app"), Some(json!("Larix")));

        let html = factory.make("users.index").with("title", "Users").render().unwrap();
        assert_eq!(html, "Larix:Users:0");
    }

    #[test]
    fn test_composers_match_patterns() {
        let factory = factory();
        factory.share("app", "Larix").unwrap();
        factory.composer("users.*", |ctx| ctx.insert("count", &3));
        factory.composer("admin.*", |ctx| ctx.insert("count", &99));
        factory.composer("*", |ctx| {
            if !ctx.contains_key("title") {
                ctx.insert("title", "Default");
            }
        });

        assert_eq!(factory.make("users.index").render().unwrap(), "Larix:Default:3");
        assert!(matches_pattern("users.*", "users.show"));
        assert!(!matches_pattern("users.index", "users.show"));
    }

    #[test]
    fn test_request_context() {
        let factory = factory();
        let session = Session::new();
        let token = session.token();
        let mut request = LarixRequest::build(Method::GET, "/");
        request.insert_extension(session);
        request.insert_extension(UserId("42".to_string()));

        let html = factory.make("layouts.nav").with_request_context(&request).render().unwrap();
        assert_eq!(html, format!(" 42 |{}", token));

        let mut request = LarixRequest::build(Method::GET, "/");
        request.insert_extension(ViewAuth::new(&json!({"id": 7}), vec!["edit".into()]).unwrap());
        let html = factory.make("layouts.nav").with_request_context(&request).render().unwrap();
        assert_eq!(html, " 7 |");
    }

    #[test]
    fn test_responses() {
        let factory = factory();
        factory.share("app", "Larix").unwrap();
        let response = factory
            .make("users.index")
            .with("title", "T")
            .into_response()
            .unwrap();
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(response.body_text(), "Larix:T:0");

        let missing = factory.render_response("nope", Context::new()).unwrap_err();
        let response: LarixResponse = missing.into();
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    }
}
