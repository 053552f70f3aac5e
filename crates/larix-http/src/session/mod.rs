//! Sessions: a shared per-request handle, pluggable stores and the
//! `StartSession` middleware that loads and persists them.

pub mod store;

pub use store::{FileSessionStore, MemorySessionStore, SessionData, SessionStore, SESSION_DIRECTORY};

use crate::errors::HttpError;
use crate::middleware::{Middleware, Next, NextFuture};
use crate::request::LarixRequest;
use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const SESSION_COOKIE: &str = "larix_session";
pub const TOKEN_KEY: &str = "_token";
const FLASH_NEW: &str = "_flash.new";
const FLASH_OLD: &str = "_flash.old";

/// Random alphanumeric string used for ids and tokens
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[derive(Debug)]
struct SessionState {
    id: String,
    data: SessionData,
    /// Id replaced by `regenerate`/`invalidate`, destroyed on save
    previous_id: Option<String>,
}

/// Cloneable handle to the current session
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<RwLock<SessionState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Fresh session with a new id
    pub fn new() -> Self {
        Self::from_parts(random_string(40), SessionData::new())
    }

    pub fn from_parts(id: String, data: SessionData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState {
                id,
                data,
                previous_id: None,
            })),
        }
    }

    pub fn id(&self) -> String {
        self.inner.read().id.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().data.get(key).cloned()
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn put(&self, key: &str, value: impl Into<Value>) {
        self.inner.write().data.insert(key.to_string(), value.into());
    }

    pub fn forget(&self, key: &str) -> Option<Value> {
        self.inner.write().data.remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner
            .read()
            .data
            .get(key)
            .map(|v| !v.is_null())
            .unwrap_or(false)
    }

    /// Session values without flash bookkeeping
    pub fn all(&self) -> SessionData {
        self.inner
            .read()
            .data
            .iter()
            .filter(|(k, _)| !k.starts_with("_flash."))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Put a value that survives only until the end of the next request
    pub fn flash(&self, key: &str, value: impl Into<Value>) {
        let mut state = self.inner.write();
        state.data.insert(key.to_string(), value.into());
        push_key(&mut state.data, FLASH_NEW, key);
        remove_key(&mut state.data, FLASH_OLD, key);
    }

    /// Keep all flashed values for one more request
    pub fn reflash(&self) {
        let mut state = self.inner.write();
        for key in keys(&state.data, FLASH_OLD) {
            push_key(&mut state.data, FLASH_NEW, &key);
        }
        state.data.insert(FLASH_OLD.to_string(), Value::Array(Vec::new()));
    }

    /// Drop values flashed two requests ago and age the current ones
    pub(crate) fn age_flash_data(&self) {
        let mut state = self.inner.write();
        for key in keys(&state.data, FLASH_OLD) {
            state.data.remove(&key);
        }
        let new = state
            .data
            .remove(FLASH_NEW)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        state.data.insert(FLASH_OLD.to_string(), new);
        state.data.insert(FLASH_NEW.to_string(), Value::Array(Vec::new()));
    }

    /// Issue a new id while keeping the data
    pub fn regenerate(&self) -> String {
        let mut state = self.inner.write();
        let new_id = random_string(40);
        let old = std::mem::replace(&mut state.id, new_id.clone());
        state.previous_id.get_or_insert(old);
        new_id
    }

    /// Clear the data and issue a new id
    pub fn invalidate(&self) -> String {
        self.inner.write().data.clear();
        self.regenerate()
    }

    /// CSRF token, created on first use
    pub fn token(&self) -> String {
        if let Some(Value::String(token)) = self.get(TOKEN_KEY) {
            return token;
        }
        self.regenerate_token()
    }

    pub fn regenerate_token(&self) -> String {
        let token = random_string(40);
        self.put(TOKEN_KEY, token.clone());
        token
    }

    pub(crate) fn take_previous_id(&self) -> Option<String> {
        self.inner.write().previous_id.take()
    }

    pub(crate) fn data(&self) -> SessionData {
        self.inner.read().data.clone()
    }
}

fn keys(data: &SessionData, list: &str) -> Vec<String> {
    data.get(list)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn push_key(data: &mut SessionData, list: &str, key: &str) {
    let mut items = keys(data, list);
    if !items.iter().any(|k| k == key) {
        items.push(key.to_string());
    }
    data.insert(list.to_string(), Value::from(items));
}

fn remove_key(data: &mut SessionData, list: &str, key: &str) {
    let items: Vec<String> = keys(data, list).into_iter().filter(|k| k != key).collect();
    data.insert(list.to_string(), Value::from(items));
}

/// Cookie and lifetime settings for `StartSession`
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie: String,
    pub lifetime_minutes: u64,
    pub path: String,
    pub secure: bool,
    pub same_site: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie: SESSION_COOKIE.to_string(),
            lifetime_minutes: 120,
            path: "/".to_string(),
            secure: false,
            same_site: "Lax".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_minutes * 60)
    }

    pub fn cookie_header(&self, id: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path={}; HttpOnly; SameSite={}",
            self.cookie, id, self.path, self.same_site
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Loads the session before the handler and persists it afterwards
#[derive(Debug, Clone)]
pub struct StartSession {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
}

impl StartSession {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Middleware for StartSession {
    fn handle(&self, mut request: LarixRequest, next: Next) -> NextFuture<'static> {
        let store = self.store.clone();
        let config = self.config.clone();
        Box::pin(async move {
            let existing = match request.cookie(&config.cookie) {
                Some(id) => match store.load(&id).await {
                    Ok(Some(data)) => Some(Session::from_parts(id, data)),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::warn!("Failed to load session: {}", e);
                        None
                    }
                },
                None => None,
            };
            let session = existing.unwrap_or_default();
            session.age_flash_data();
            request.insert_extension(session.clone());

            let response = next.run(request).await;

            if let Some(previous) = session.take_previous_id() {
                if let Err(e) = store.destroy(&previous).await {
                    tracing::warn!("Failed to destroy old session: {}", e);
                }
            }
            let id = session.id();
            if let Err(e) = store.save(&id, &session.data(), config.lifetime()).await {
                tracing::error!("Failed to persist session: {}", e);
                return HttpError::internal(e.to_string()).into_response(false);
            }

            let mut response = response;
            if let Err(e) = response.append_header("set-cookie", config.cookie_header(&id)) {
                tracing::error!("Failed to set session cookie: {}", e);
            }
            response
        })
    }

    fn name(&self) -> &'static str {
        "StartSession"
    }
}
