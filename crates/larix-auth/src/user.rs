//! The user contract guards and providers work with

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user that can be authenticated.
///
/// Users are (de)serializable so providers can load them from database rows
/// and match them against credentials.
pub trait Authenticatable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Unique identifier, usually the primary key
    fn auth_identifier(&self) -> String;

    /// Stored password hash
    fn auth_password(&self) -> &str;

    fn remember_token(&self) -> Option<&str>;

    fn set_remember_token(&mut self, token: Option<String>);

    /// Role names carried on the user itself
    fn roles(&self) -> Vec<String> {
        Vec::new()
    }

    /// Permission names carried on the user itself
    fn permissions(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Attribute-map user, matching whatever columns the users table has
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenericUser {
    attributes: Map<String, Value>,
}

impl GenericUser {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        match self.attributes.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl Authenticatable for GenericUser {
    fn auth_identifier(&self) -> String {
        match self.attributes.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn auth_password(&self) -> &str {
        self.get_str("password").unwrap_or_default()
    }

    fn remember_token(&self) -> Option<&str> {
        self.get_str("remember_token")
    }

    fn set_remember_token(&mut self, token: Option<String>) {
        let value = token.map(Value::String).unwrap_or(Value::Null);
        self.attributes.insert("remember_token".to_string(), value);
    }

    fn roles(&self) -> Vec<String> {
        self.string_list("roles")
    }

    fn permissions(&self) -> Vec<String> {
        self.string_list("permissions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generic_user() {
        let mut user: GenericUser = serde_json::from_value(json!({
            "id": 7,
            "email": "ada@example.com",
            "password": "$2b$04$hash",
            "roles": ["admin", "editor"],
            "permissions": "posts.create, posts.delete"
        }))
        .unwrap();

        assert_eq!(user.auth_identifier(), "7");
        assert_eq!(user.auth_password(), "$2b$04$hash");
        assert_eq!(user.get_str("email"), Some("ada@example.com"));
        assert_eq!(user.roles(), vec!["admin", "editor"]);
        assert_eq!(user.permissions(), vec!["posts.create", "posts.delete"]);
        assert_eq!(user.remember_token(), None);

        user.set_remember_token(Some("abc".into()));
        assert_eq!(user.remember_token(), Some("abc"));
        assert_eq!(serde_json::to_value(&user).unwrap()["remember_token"], "abc");
    }
}
