//! User providers: where guards load users from

use crate::hashing::{HashManager, PasswordHasher};
use crate::user::{Authenticatable, GenericUser};
use crate::AuthResult;
use async_trait::async_trait;
use larix_orm::{Database, Row};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Login credentials, e.g. `email` and `password`
pub type Credentials = BTreeMap<String, String>;

/// Build [`Credentials`] from pairs
pub fn credentials<I, K, V>(pairs: I) -> Credentials
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Credential fields used to look a user up; anything password-like is only
/// checked against the hash
fn lookup_fields(credentials: &Credentials) -> impl Iterator<Item = (&String, &String)> {
    credentials.iter().filter(|(key, _)| !key.contains("password"))
}

#[async_trait]
pub trait UserProvider<U: Authenticatable>: Send + Sync {
    async fn retrieve_by_id(&self, id: &str) -> AuthResult<Option<U>>;

    /// Find the user matching every non-password credential
    async fn retrieve_by_credentials(&self, credentials: &Credentials) -> AuthResult<Option<U>>;

    /// Check the `password` credential against the user's hash
    async fn validate_credentials(&self, user: &U, credentials: &Credentials) -> AuthResult<bool>;

    /// Find a user by id and "remember me" token
    async fn retrieve_by_token(&self, id: &str, token: &str) -> AuthResult<Option<U>>;

    async fn update_remember_token(&self, user: &mut U, token: &str) -> AuthResult<()>;

    async fn retrieve_by_field(&self, field: &str, value: &str) -> AuthResult<Option<U>>;
}

fn check_password(hasher: &HashManager, user: &impl Authenticatable, credentials: &Credentials) -> bool {
    match credentials.get("password") {
        Some(plain) => hasher.verify(plain, user.auth_password()),
        None => false,
    }
}

/// Users stored in a database table
pub struct DatabaseUserProvider<U = GenericUser> {
    db: Database,
    table: String,
    hasher: Arc<HashManager>,
    _user: PhantomData<fn() -> U>,
}

impl<U> DatabaseUserProvider<U> {
    pub fn new(db: Database, table: impl Into<String>, hasher: Arc<HashManager>) -> Self {
        Self {
            db,
            table: table.into(),
            hasher,
            _user: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Integer-looking ids are bound as integers so typed drivers compare them
    fn key(id: &str) -> Value {
        match id.parse::<i64>() {
            Ok(id) => Value::from(id),
            Err(_) => Value::from(id),
        }
    }
}

impl<U: Authenticatable> DatabaseUserProvider<U> {
    fn hydrate(row: Row) -> AuthResult<U> {
        Ok(serde_json::from_value(Value::Object(row))?)
    }

    async fn first_where(&self, pairs: Vec<(&str, Value)>) -> AuthResult<Option<U>> {
        let mut query = self.db.table(&self.table);
        for (column, value) in pairs {
            query = query.where_eq(column, value);
        }
        match query.first(&self.db).await? {
            Some(row) => Ok(Some(Self::hydrate(row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<U: Authenticatable> UserProvider<U> for DatabaseUserProvider<U> {
    async fn retrieve_by_id(&self, id: &str) -> AuthResult<Option<U>> {
        self.first_where(vec![("id", Self::key(id))]).await
    }

    async fn retrieve_by_credentials(&self, credentials: &Credentials) -> AuthResult<Option<U>> {
        let pairs: Vec<(&str, Value)> = lookup_fields(credentials)
            .map(|(k, v)| (k.as_str(), Value::from(v.as_str())))
            .collect();
        if pairs.is_empty() {
            return Ok(None);
        }
        self.first_where(pairs).await
    }

    async fn validate_credentials(&self, user: &U, credentials: &Credentials) -> AuthResult<bool> {
        Ok(check_password(&self.hasher, user, credentials))
    }

    async fn retrieve_by_token(&self, id: &str, token: &str) -> AuthResult<Option<U>> {
        let user = self.retrieve_by_id(id).await?;
        Ok(user.filter(|u| u.remember_token().is_some_and(|t| !t.is_empty() && t == token)))
    }

    async fn update_remember_token(&self, user: &mut U, token: &str) -> AuthResult<()> {
        let mut values = Map::new();
        values.insert("remember_token".to_string(), Value::from(token));
        self.db
            .table(&self.table)
            .where_eq("id", Self::key(&user.auth_identifier()))
            .update(&self.db, values)
            .await?;
        user.set_remember_token(Some(token.to_string()));
        Ok(())
    }

    async fn retrieve_by_field(&self, field: &str, value: &str) -> AuthResult<Option<U>> {
        self.first_where(vec![(field, Value::from(value))]).await
    }
}

/// Users kept in memory, for tests and prototypes
pub struct InMemoryUserProvider<U> {
    users: RwLock<Vec<U>>,
    hasher: Arc<HashManager>,
}

impl<U: Authenticatable> InMemoryUserProvider<U> {
    pub fn new(hasher: Arc<HashManager>) -> Self {
        Self {
            users: RwLock::new(Vec::new()),
            hasher,
        }
    }

    pub fn with_user(self, user: U) -> Self {
        self.insert(user);
        self
    }

    pub fn insert(&self, user: U) {
        let mut users = self.users.write();
        users.retain(|u| u.auth_identifier() != user.auth_identifier());
        users.push(user);
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    fn field_matches(user: &U, field: &str, expected: &str) -> bool {
        let value = match serde_json::to_value(user) {
            Ok(Value::Object(map)) => map.get(field).cloned(),
            _ => None,
        };
        match value {
            Some(Value::String(s)) => s == expected,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == expected,
        }
    }

    fn find(&self, predicate: impl Fn(&U) -> bool) -> Option<U> {
        self.users.read().iter().find(|u| predicate(u)).cloned()
    }
}

#[async_trait]
impl<U: Authenticatable> UserProvider<U> for InMemoryUserProvider<U> {
    async fn retrieve_by_id(&self, id: &str) -> AuthResult<Option<U>> {
        Ok(self.find(|u| u.auth_identifier() == id))
    }

    async fn retrieve_by_credentials(&self, credentials: &Credentials) -> AuthResult<Option<U>> {
        let fields: Vec<(&String, &String)> = lookup_fields(credentials).collect();
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(self.find(|u| fields.iter().all(|(k, v)| Self::field_matches(u, k, v))))
    }

    async fn validate_credentials(&self, user: &U, credentials: &Credentials) -> AuthResult<bool> {
        Ok(check_password(&self.hasher, user, credentials))
    }

    async fn retrieve_by_token(&self, id: &str, token: &str) -> AuthResult<Option<U>> {
        Ok(self.find(|u| {
            u.auth_identifier() == id && u.remember_token().is_some_and(|t| !t.is_empty() && t == token)
        }))
    }

    async fn update_remember_token(&self, user: &mut U, token: &str) -> AuthResult<()> {
        user.set_remember_token(Some(token.to_string()));
        let id = user.auth_identifier();
        for stored in self.users.write().iter_mut() {
            if stored.auth_identifier() == id {
                stored.set_remember_token(Some(token.to_string()));
            }
        }
        Ok(())
    }

    async fn retrieve_by_field(&self, field: &str, value: &str) -> AuthResult<Option<U>> {
        Ok(self.find(|u| Self::field_matches(u, field, value)))
    }
}
