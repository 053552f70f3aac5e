//! Relationship queries built from a loaded record

use serde_json::Value;

use super::{Model, ModelExt, Record};
use crate::connection::Executor;
use crate::error::ModelResult;
use crate::query::QueryBuilder;
use crate::support::{short_type_name, snake_case};

/// Default pivot table: both singular names, sorted and joined by `_`
pub fn pivot_table_name<A: Model, B: Model>() -> String {
    let mut names = [
        snake_case(short_type_name::<A>()),
        snake_case(short_type_name::<B>()),
    ];
    names.sort();
    names.join("_")
}

impl<M: Model> Record<M> {
    /// Related row holding this record's key, `{model}_id` by default
    pub fn has_one<R: Model>(
        &self,
        db: &dyn Executor,
        foreign_key: Option<&str>,
    ) -> ModelResult<QueryBuilder<R>> {
        Ok(self.has_many::<R>(db, foreign_key)?.limit(1))
    }

    pub fn has_many<R: Model>(
        &self,
        db: &dyn Executor,
        foreign_key: Option<&str>,
    ) -> ModelResult<QueryBuilder<R>> {
        let foreign_key = foreign_key
            .map(str::to_string)
            .unwrap_or_else(M::foreign_key);
        Ok(R::query(db).where_eq(&foreign_key, self.key()?))
    }

    /// Owner whose key is stored on this record, `{related}_id` by default
    pub fn belongs_to<R: Model>(
        &self,
        db: &dyn Executor,
        foreign_key: Option<&str>,
    ) -> ModelResult<QueryBuilder<R>> {
        let foreign_key = foreign_key
            .map(str::to_string)
            .unwrap_or_else(R::foreign_key);
        let value = self
            .attributes()?
            .remove(&foreign_key)
            .unwrap_or(Value::Null);
        Ok(R::query(db)
            .where_eq(R::primary_key(), value)
            .limit(1))
    }

    /// Related records through a pivot table
    pub fn belongs_to_many<R: Model>(
        &self,
        db: &dyn Executor,
        pivot: Option<&str>,
        foreign_key: Option<&str>,
        related_key: Option<&str>,
    ) -> ModelResult<QueryBuilder<R>> {
        let pivot = pivot
            .map(str::to_string)
            .unwrap_or_else(pivot_table_name::<M, R>);
        let foreign_key = foreign_key
            .map(str::to_string)
            .unwrap_or_else(M::foreign_key);
        let related_key = related_key
            .map(str::to_string)
            .unwrap_or_else(R::foreign_key);
        let related_table = R::table_name();
        let related_columns = format!("{}.*", related_table);

        Ok(R::query(db)
            .select(&[related_columns.as_str()])
            .join(
                &pivot,
                &format!("{}.{}", pivot, related_key),
                "=",
                &format!("{}.{}", related_table, R::primary_key()),
            )
            .where_eq(&format!("{}.{}", pivot, foreign_key), self.key()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Author {
        id: Option<i64>,
        name: String,
    }

    impl Model for Author {
        fn uses_timestamps() -> bool {
            false
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Book {
        id: Option<i64>,
        author_id: i64,
        title: String,
    }

    impl Model for Book {
        fn uses_timestamps() -> bool {
            false
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tag {
        id: Option<i64>,
        label: String,
    }

    impl Model for Tag {
        fn uses_timestamps() -> bool {
            false
        }
    }

    async fn library() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        for sql in [
            "CREATE TABLE authors (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)",
            "CREATE TABLE books (id INTEGER PRIMARY KEY AUTOINCREMENT, author_id INTEGER, title TEXT)",
            "CREATE TABLE tags (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT)",
            "CREATE TABLE book_tag (book_id INTEGER, tag_id INTEGER)",
            "INSERT INTO authors (name) VALUES ('Le Guin'), ('Pratchett')",
            "INSERT INTO books (author_id, title) VALUES (1, 'Earthsea'), (1, 'The Dispossessed'), (2, 'Mort')",
            "INSERT INTO tags (label) VALUES ('fantasy'), ('scifi')",
            "INSERT INTO book_tag (book_id, tag_id) VALUES (1, 1), (2, 2), (3, 1)",
        ] {
            db.execute(sql, &[]).await.unwrap();
        }
        db
    }

    #[test]
    fn test_pivot_name_is_alphabetical() {
        assert_eq!(pivot_table_name::<Tag, Book>(), "book_tag");
        assert_eq!(pivot_table_name::<Book, Tag>(), "book_tag");
    }

    #[tokio::test]
    async fn test_has_many_and_has_one() {
        let db = library().await;
        let author = Author::find_or_fail(&db, 1).await.unwrap();

        let books = author.has_many::<Book>(&db, None).unwrap().get(&db).await.unwrap();
        assert_eq!(books.len(), 2);

        let first = author
            .has_one::<Book>(&db, Some("author_id"))
            .unwrap()
            .first(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.title, "Earthsea");
    }

    #[tokio::test]
    async fn test_belongs_to() {
        let db = library().await;
        let book = Book::find_or_fail(&db, 3).await.unwrap();
        let author = book.belongs_to::<Author>(&db, None).unwrap().first(&db).await.unwrap().unwrap();
        assert_eq!(author.name, "Pratchett");
    }

    #[tokio::test]
    async fn test_belongs_to_many() {
        let db = library().await;
        let fantasy = Tag::find_or_fail(&db, 1).await.unwrap();
        let titles: Vec<String> = fantasy
            .belongs_to_many::<Book>(&db, None, None, None)
            .unwrap()
            .order_by("books.id", "asc")
            .get(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.title.clone())
            .collect();
        assert_eq!(titles, ["Earthsea", "Mort"]);

        let unsaved = Record::new(Tag { id: None, label: "new".into() });
        assert!(unsaved.belongs_to_many::<Book>(&db, None, None, None).is_err());
    }
}
