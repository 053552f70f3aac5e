//! Active-record models
//!
//! A [`Model`] is a plain serde struct plus table metadata. Rows hydrate into
//! [`Record`]s, which track the original attributes and persist changes.

mod cast;
mod ext;
mod record;
mod relations;

pub use cast::Cast;
pub use ext::ModelExt;
pub use record::Record;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::connection::Row;
use crate::error::{ModelError, ModelResult};
use crate::query::Hydrate;
use crate::support::{plural, short_type_name, snake_case};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Table metadata and lifecycle hooks for a persisted struct
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Sized + 'static {
    /// `BlogPost` is stored in `blog_posts`
    fn table_name() -> String {
        plural(&snake_case(short_type_name::<Self>()))
    }

    fn primary_key() -> &'static str {
        "id"
    }

    /// Column other tables use to point at this model, `blog_post_id`
    fn foreign_key() -> String {
        format!("{}_{}", snake_case(short_type_name::<Self>()), Self::primary_key())
    }

    /// Mass-assignable attributes. Empty means everything not guarded.
    fn fillable() -> Vec<&'static str> {
        Vec::new()
    }

    fn guarded() -> Vec<&'static str> {
        vec!["id"]
    }

    /// Attributes left out of `to_json`
    fn hidden() -> Vec<&'static str> {
        Vec::new()
    }

    fn casts() -> Vec<(&'static str, Cast)> {
        Vec::new()
    }

    fn uses_timestamps() -> bool {
        true
    }

    fn uses_soft_deletes() -> bool {
        false
    }

    fn deleted_at_column() -> &'static str {
        "deleted_at"
    }

    fn creating(&mut self) -> ModelResult<()> {
        Ok(())
    }

    fn created(&self) {}

    fn updating(&mut self) -> ModelResult<()> {
        Ok(())
    }

    fn updated(&self) {}

    fn deleting(&mut self) -> ModelResult<()> {
        Ok(())
    }

    fn deleted(&self) {}
}

pub(crate) fn is_fillable<M: Model>(column: &str) -> bool {
    let fillable = M::fillable();
    if fillable.contains(&column) {
        return true;
    }
    if !fillable.is_empty() {
        return false;
    }
    let guarded = M::guarded();
    !guarded.contains(&column) && !guarded.contains(&"*")
}

/// Declared casts plus the implicit datetime casts for timestamp columns
pub(crate) fn all_casts<M: Model>() -> Vec<(String, Cast)> {
    let mut casts: Vec<(String, Cast)> = M::casts()
        .into_iter()
        .map(|(column, cast)| (column.to_string(), cast))
        .collect();

    let mut implicit = Vec::new();
    if M::uses_timestamps() {
        implicit.extend([CREATED_AT, UPDATED_AT]);
    }
    if M::uses_soft_deletes() {
        implicit.push(M::deleted_at_column());
    }
    for column in implicit {
        if !casts.iter().any(|(c, _)| c == column) {
            casts.push((column.to_string(), Cast::DateTime));
        }
    }
    casts
}

/// Apply casts and deserialize
pub(crate) fn hydrate_model<M: Model>(mut row: Row) -> ModelResult<M> {
    for (column, cast) in all_casts::<M>() {
        if let Some(value) = row.get_mut(&column) {
            *value = cast.apply(std::mem::take(value));
        }
    }
    serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
        ModelError::Serialization(format!("cannot hydrate {}: {}", short_type_name::<M>(), e))
    })
}

pub(crate) fn attributes_of<M: Model>(model: &M) -> ModelResult<Row> {
    match serde_json::to_value(model)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(ModelError::Serialization(format!(
            "{} must serialize to an object",
            short_type_name::<M>()
        ))),
    }
}

impl<M: Model> Hydrate for M {
    type Output = Record<M>;

    fn hydrate(row: Row) -> ModelResult<Record<M>> {
        Record::from_row(row)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BlogPost {
        pub id: Option<i64>,
        pub title: String,
        #[serde(default)]
        pub published: bool,
    }

    impl Model for BlogPost {
        fn casts() -> Vec<(&'static str, Cast)> {
            vec![("published", Cast::Boolean)]
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Person {
        id: Option<i64>,
    }

    impl Model for Person {
        fn uses_timestamps() -> bool {
            false
        }
    }

    #[test]
    fn test_naming_defaults() {
        assert_eq!(BlogPost::table_name(), "blog_posts");
        assert_eq!(BlogPost::foreign_key(), "blog_post_id");
        assert_eq!(Person::table_name(), "people");
    }

    #[test]
    fn test_fillable_and_guarded() {
        assert!(is_fillable::<BlogPost>("title"));
        assert!(!is_fillable::<BlogPost>("id"));
    }

    #[test]
    fn test_hydrate_applies_casts() {
        let row = serde_json::json!({
            "id": 1,
            "title": "Hello",
            "published": 1,
            "created_at": "2024-03-01 10:00:00"
        });
        let serde_json::Value::Object(row) = row else { unreachable!() };
        let post: BlogPost = hydrate_model(row).unwrap();
        assert!(post.published);

        let casts = all_casts::<BlogPost>();
        assert!(casts.iter().any(|(c, cast)| c == "created_at" && *cast == Cast::DateTime));
        assert!(all_casts::<Person>().is_empty());
    }
}
