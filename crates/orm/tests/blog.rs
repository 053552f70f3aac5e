//! End-to-end: migrate a schema, seed it with factories and query through models

use async_trait::async_trait;
use larix_orm::{
    Cast, Database, Factory, MigrateOptions, Migration, Migrator, Model, ModelExt, ModelResult,
    Record, Row, Schema, Seeder, SeederRunner,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: Option<i64>,
    name: String,
    email: String,
    #[serde(default)]
    is_admin: bool,
}

impl Model for User {
    fn fillable() -> Vec<&'static str> {
        vec!["name", "email"]
    }

    fn casts() -> Vec<(&'static str, Cast)> {
        vec![("is_admin", Cast::Boolean)]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Post {
    id: Option<i64>,
    user_id: i64,
    title: String,
    #[serde(default)]
    meta: serde_json::Value,
    deleted_at: Option<String>,
}

impl Model for Post {
    fn casts() -> Vec<(&'static str, Cast)> {
        vec![("meta", Cast::Json)]
    }

    fn uses_soft_deletes() -> bool {
        true
    }
}

struct CreateUsers;

impl Migration for CreateUsers {
    fn name(&self) -> String {
        "2024_01_01_000000_create_users_table".into()
    }

    fn up(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.create("users", |t| {
            t.id();
            t.string("name", 255);
            t.string("email", 255).unique();
            t.boolean("is_admin").default(json!(false));
            t.timestamps();
        })
    }

    fn down(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.drop_if_exists("users");
        Ok(())
    }
}

struct CreatePosts;

impl Migration for CreatePosts {
    fn name(&self) -> String {
        "2024_01_02_000000_create_posts_table".into()
    }

    fn up(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.create("posts", |t| {
            t.id();
            t.foreign_id("user_id").references("users.id").cascade_on_delete();
            t.string("title", 255);
            t.json("meta").nullable();
            t.timestamps();
            t.soft_deletes();
            t.index(&["user_id"], None);
        })
    }

    fn down(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.drop_if_exists("posts");
        Ok(())
    }
}

fn user_factory() -> Factory<User> {
    Factory::new(|fake| {
        let mut row = Row::new();
        row.insert("name".into(), json!(fake.name()));
        row.insert("email".into(), json!(fake.email()));
        row
    })
    .seed(2024)
    .define_state("admin", |row, _| {
        row.insert("is_admin".into(), json!(true));
    })
}

struct BlogSeeder;

#[async_trait]
impl Seeder for BlogSeeder {
    async fn run(&self, db: &Database, _runner: &SeederRunner) -> ModelResult<()> {
        let admin = user_factory().state("admin").create_one(db).await?;
        for (i, title) in ["Hello", "Second", "Third"].iter().enumerate() {
            let mut row = Row::new();
            row.insert("user_id".into(), admin.key()?);
            row.insert("title".into(), json!(title));
            row.insert("meta".into(), json!({"position": i}));
            Post::create(db, row).await?;
        }
        Ok(())
    }
}

async fn migrated() -> (Database, Migrator) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let mut migrator = Migrator::new(db.clone());
    migrator.add(CreatePosts).add(CreateUsers);
    let result = migrator.run(MigrateOptions::default()).await.unwrap();
    assert_eq!(result.applied.len(), 2);
    (db, migrator)
}

#[tokio::test]
async fn migrations_create_expected_tables() {
    let (db, _) = migrated().await;
    assert!(db.has_table("users").await.unwrap());
    assert!(db.has_columns("posts", &["user_id", "title", "deleted_at"]).await.unwrap());
}

#[tokio::test]
async fn seeded_blog_round_trip() {
    let (db, _) = migrated().await;
    let mut runner = SeederRunner::new();
    runner.register(BlogSeeder);
    runner.run_all(&db).await.unwrap();

    let admin = User::query(&db).where_eq("is_admin", true).first_or_fail(&db).await.unwrap();
    assert!(admin.is_admin);

    let posts = admin.has_many::<Post>(&db, None).unwrap().order_by("id", "asc").get(&db).await.unwrap();
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[1].meta, json!({"position": 1}));

    let owner: Record<User> = posts[0].belongs_to::<User>(&db, None).unwrap().first(&db).await.unwrap().unwrap();
    assert_eq!(owner.email, admin.email);

    let mut third = posts[2].clone();
    third.delete(&db).await.unwrap();
    assert_eq!(Post::query(&db).count(&db).await.unwrap(), 2);
    assert_eq!(Post::with_trashed(&db).count(&db).await.unwrap(), 3);

    let page = Post::query(&db).paginate(&db, 1, Some(1)).await.unwrap();
    assert_eq!((page.total, page.last_page), (2, 2));
}

#[tokio::test]
async fn mass_assignment_ignores_unfillable_keys() {
    let (db, _) = migrated().await;
    let mut row = Row::new();
    row.insert("name".into(), json!("Mallory"));
    row.insert("email".into(), json!("mallory@example.com"));
    row.insert("is_admin".into(), json!(true));

    let user = User::create(&db, row).await.unwrap();
    assert!(!user.is_admin);
    assert!(!User::find_or_fail(&db, user.key().unwrap()).await.unwrap().is_admin);
}

#[tokio::test]
async fn rollback_removes_latest_batch() {
    let (db, migrator) = migrated().await;
    let result = migrator.reset().await.unwrap();
    assert_eq!(
        result.rolled_back,
        ["2024_01_02_000000_create_posts_table", "2024_01_01_000000_create_users_table"]
    );
    assert!(!db.has_table("posts").await.unwrap());
}
