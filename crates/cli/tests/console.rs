use std::fs;
use std::path::Path;

use async_trait::async_trait;
use larix_cli::Console;
use larix_core::Environment;
use larix_http::{LarixRequest, LarixResponse, Router};
use larix_orm::{Database, Migration, ModelResult, Schema, Seeder, SeederRunner};
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

struct CreateCommentsTable;

impl Migration for CreateCommentsTable {
    fn name(&self) -> String {
        "2020_01_01_000000_create_comments_table".to_string()
    }

    fn up(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.create("comments", |t| {
            t.id();
            t.string("body", 255);
        })
    }

    fn down(&self, schema: &mut Schema) -> ModelResult<()> {
        schema.drop_if_exists("comments");
        Ok(())
    }
}

struct DatabaseSeeder;

#[async_trait]
impl Seeder for DatabaseSeeder {
    async fn run(&self, db: &Database, runner: &SeederRunner) -> ModelResult<()> {
        runner.call(db, "CommentSeeder").await
    }
}

struct CommentSeeder;

#[async_trait]
impl Seeder for CommentSeeder {
    async fn run(&self, db: &Database, _runner: &SeederRunner) -> ModelResult<()> {
        db.execute("INSERT INTO comments (body) VALUES (?)", &[json!("first!")])
            .await?;
        Ok(())
    }
}

fn console(dir: &TempDir) -> Console {
    Console::new()
        .base_path(dir.path())
        .environment(Environment::Testing)
        .migration(CreateCommentsTable)
        .seeder(DatabaseSeeder)
        .seeder(CommentSeeder)
}

async fn run(console: &Console, args: &[&str]) -> anyhow::Result<String> {
    let mut out = Vec::new();
    let mut argv = vec!["larix"];
    argv.extend_from_slice(args);
    console.run(argv, &mut out).await?;
    Ok(String::from_utf8(out).unwrap())
}

fn database_file(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("database/database.sqlite").display())
}

#[tokio::test]
async fn test_migrate_lifecycle() {
    let dir = TempDir::new().unwrap();
    let console = console(&dir);

    let output = run(&console, &["migrate", "make", "create_posts_table", "--create", "posts"])
        .await
        .unwrap();
    assert!(output.starts_with("Created migration: "));
    assert!(output.trim_end().ends_with("_create_posts_table.sql"));

    let output = run(&console, &["migrate", "status", "--pending"]).await.unwrap();
    assert!(output.contains("2020_01_01_000000_create_comments_table"));
    assert!(output.contains("Pending"));
    assert!(output.contains("2 total, 0 ran, 2 pending"));

    let output = run(&console, &["migrate", "run", "--pretend"]).await.unwrap();
    assert!(output.contains("2020_01_01_000000_create_comments_table:"));
    assert!(output.to_lowercase().contains("create table"));

    let output = run(&console, &["migrate", "run", "--seed"]).await.unwrap();
    assert!(output.contains("Migrated: 2020_01_01_000000_create_comments_table"));
    assert!(output.contains("Batch 1 complete."));
    assert!(output.contains("Seeding: DatabaseSeeder"));

    let db = Database::connect(&database_file(dir.path())).await.unwrap();
    let rows = db.fetch_all("SELECT body FROM comments", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("body"), Some(&json!("first!")));
    db.close().await;

    let output = run(&console, &["migrate", "run"]).await.unwrap();
    assert_eq!(output, "Nothing to migrate.\n");

    let output = run(&console, &["db", "tables"]).await.unwrap();
    assert!(output.lines().any(|l| l == "comments"));
    assert!(output.lines().any(|l| l == "posts"));

    let output = run(&console, &["migrate", "status", "--executed"]).await.unwrap();
    assert!(output.contains("2 total, 2 ran, 0 pending"));

    let output = run(&console, &["migrate", "rollback"]).await.unwrap();
    assert!(output.contains("Rolled back: 2020_01_01_000000_create_comments_table"));
    assert!(output.contains("_create_posts_table"));

    let output = run(&console, &["migrate", "fresh"]).await.unwrap();
    assert!(output.starts_with("Dropped all tables successfully.\n"));
    assert!(output.contains("Batch 1 complete."));

    let output = run(&console, &["db", "status"]).await.unwrap();
    assert!(output.contains("Driver:     sqlite"));
    assert!(output.contains("Migrations: 2 ran, 0 pending"));
}

#[tokio::test]
async fn test_seeding_by_class_and_production_guard() {
    let dir = TempDir::new().unwrap();
    let local = console(&dir);
    run(&local, &["migrate", "run"]).await.unwrap();

    let output = run(&local, &["db", "seed", "--class", "CommentSeeder"]).await.unwrap();
    assert!(output.contains("Seeding: CommentSeeder"));

    let err = run(&local, &["db", "seed", "--class", "Missing"]).await.unwrap_err();
    assert!(err.to_string().contains("Seeder [Missing] is not registered"));

    let production = console(&dir).environment(Environment::Production);
    let err = run(&production, &["db", "seed"]).await.unwrap_err();
    assert!(err.to_string().contains("--force"));
    let err = run(&production, &["db", "wipe"]).await.unwrap_err();
    assert!(err.to_string().contains("--force"));

    run(&production, &["db", "seed", "--force"]).await.unwrap();
    let output = run(&production, &["db", "wipe", "--force"]).await.unwrap();
    assert!(output.starts_with("Dropped "));

    let output = run(&local, &["db", "tables"]).await.unwrap();
    assert_eq!(output, "No tables found.\n");
}

#[tokio::test]
async fn test_make_generators() {
    let dir = TempDir::new().unwrap();
    let console = console(&dir);

    let output = run(&console, &["make", "model", "BlogPost", "--migration"]).await.unwrap();
    assert!(output.contains("Model created: src/models/blog_post.rs"));
    assert!(output.contains("Created migration: "));
    let model = fs::read_to_string(dir.path().join("src/models/blog_post.rs")).unwrap();
    assert!(model.contains("pub struct BlogPost"));
    assert!(model.contains("\"blog_posts\""));
    assert_eq!(
        fs::read_to_string(dir.path().join("src/models/mod.rs")).unwrap(),
        "pub mod blog_post;\n"
    );
    let migrations: Vec<_> = fs::read_dir(dir.path().join("database/migrations"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(migrations.len(), 1);
    assert!(migrations[0].ends_with("_create_blog_posts_table.sql"));

    let err = run(&console, &["make", "model", "BlogPost"]).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
    run(&console, &["make", "model", "BlogPost", "--force"]).await.unwrap();

    run(&console, &["make", "controller", "PostController", "--resource"]).await.unwrap();
    let controller =
        fs::read_to_string(dir.path().join("src/controllers/post_controller.rs")).unwrap();
    assert!(controller.contains("impl ResourceController for PostController"));

    run(&console, &["make", "policy", "PostPolicy"]).await.unwrap();
    assert!(dir.path().join("src/policies/post_policy.rs").exists());

    run(&console, &["make", "middleware", "TrimStrings"]).await.unwrap();
    run(&console, &["make", "seeder", "UserSeeder"]).await.unwrap();
    run(&console, &["make", "factory", "UserFactory"]).await.unwrap();
    assert!(dir.path().join("src/middleware/trim_strings.rs").exists());
    assert!(dir.path().join("src/seeders/user_seeder.rs").exists());
    assert!(dir.path().join("src/factories/user_factory.rs").exists());

    let output = run(&console, &["make", "component", "UserCard"]).await.unwrap();
    assert!(output.contains("resources/views/components/user_card.html"));
    let component =
        fs::read_to_string(dir.path().join("resources/views/components/user_card.html")).unwrap();
    assert!(component.contains("{!! $slot !!}"));
    assert!(!dir.path().join("resources/views/components/mod.rs").exists());

    let err = run(&console, &["make", "model", "bad-name"]).await.unwrap_err();
    assert!(err.to_string().contains("Invalid name"));
}

#[tokio::test]
async fn test_maintenance_mode() {
    let dir = TempDir::new().unwrap();
    let console = console(&dir);

    assert_eq!(run(&console, &["status"]).await.unwrap(), "Application is up.\n");

    let output = run(
        &console,
        &["down", "--message", "Upgrading", "--retry", "120", "--secret", "letmein", "--allow", "10.0.0.1"],
    )
    .await
    .unwrap();
    assert!(output.starts_with("Application is now in maintenance mode."));
    assert!(output.contains("?bypass=letmein"));
    assert!(dir.path().join("storage/framework/maintenance.json").exists());

    let output = run(&console, &["status"]).await.unwrap();
    assert!(output.starts_with("Application is down since "));
    assert!(output.contains("Message:     Upgrading"));
    assert!(output.contains("Retry after: 120s"));
    assert!(output.contains("Secret:      set"));
    assert!(output.contains("Allowed IPs: 10.0.0.1"));

    assert_eq!(run(&console, &["down"]).await.unwrap(), "Application is already down.\n");
    assert_eq!(run(&console, &["up"]).await.unwrap(), "Application is now live.\n");
    assert_eq!(run(&console, &["up"]).await.unwrap(), "Application is already up.\n");
}

#[tokio::test]
async fn test_key_generate() {
    let dir = TempDir::new().unwrap();
    let console = console(&dir);

    let output = run(&console, &["key", "generate", "--show"]).await.unwrap();
    assert!(output.starts_with("base64:"));
    assert!(!dir.path().join(".env").exists());

    fs::write(dir.path().join(".env"), "APP_NAME=Larix\nAPP_KEY=\n").unwrap();
    let output = run(&console, &["key", "generate"]).await.unwrap();
    assert_eq!(output, "Application key set successfully.\n");
    let env = fs::read_to_string(dir.path().join(".env")).unwrap();
    assert!(env.starts_with("APP_NAME=Larix\nAPP_KEY=base64:"));

    let production = console.environment(Environment::Production);
    let err = run(&production, &["key", "generate"]).await.unwrap_err();
    assert!(err.to_string().contains("--force"));
    run(&production, &["key", "generate", "--force"]).await.unwrap();
    assert_ne!(fs::read_to_string(dir.path().join(".env")).unwrap(), env);
}

#[tokio::test]
#[serial]
async fn test_config_cache_show_and_clear() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("config")).unwrap();
    fs::write(
        dir.path().join("config/database.json"),
        r#"{"default": "main", "connections": {"main": {"url": "sqlite::memory:"}}}"#,
    )
    .unwrap();
    let console = console(&dir);

    assert_eq!(run(&console, &["config", "show", "database.default"]).await.unwrap(), "main\n");
    let err = run(&console, &["config", "show", "database.missing"]).await.unwrap_err();
    assert!(err.to_string().contains("Configuration key [database.missing] is not defined"));

    let output = run(&console, &["config", "cache"]).await.unwrap();
    assert_eq!(output, "Configuration cached successfully.\n");
    let cached = fs::read_to_string(dir.path().join("bootstrap/cache/config.json")).unwrap();
    assert!(cached.contains("\"default\": \"main\""));

    // the cache wins over config/ until cleared
    fs::write(dir.path().join("config/database.json"), r#"{"default": "other"}"#).unwrap();
    assert_eq!(run(&console, &["config", "show", "database.default"]).await.unwrap(), "main\n");

    assert_eq!(
        run(&console, &["config", "clear"]).await.unwrap(),
        "Configuration cache cleared.\n"
    );
    assert_eq!(run(&console, &["config", "show", "database.default"]).await.unwrap(), "other\n");
    assert_eq!(
        run(&console, &["config", "clear"]).await.unwrap(),
        "Configuration cache was not present.\n"
    );
}

#[tokio::test]
#[serial]
async fn test_env_commands() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".env"),
        "APP_NAME=Larix\nAPP_KEY=base64:0123456789abcdef0123456789abcdef\nSERVER_PORT=99999\n",
    )
    .unwrap();
    let console = console(&dir);

    let output = run(&console, &["env", "show"]).await.unwrap();
    assert!(output.starts_with("Environment: testing\n"));
    assert!(output.contains("APP_KEY=********"));
    assert!(output.contains("APP_NAME=Larix"));

    let err = run(&console, &["env", "validate"]).await.unwrap_err();
    assert!(err.to_string().contains("Environment validation failed"));

    fs::write(
        dir.path().join(".env"),
        "APP_KEY=base64:0123456789abcdef0123456789abcdef\nSERVER_PORT=8080\n",
    )
    .unwrap();
    let output = run(&console, &["env", "validate"]).await.unwrap();
    assert!(output.contains("Environment configuration is valid"));

    let output = run(&console, &["env", "detect"]).await.unwrap();
    assert!(output.starts_with("Environment: testing\n"));
}

#[tokio::test]
async fn test_route_list() {
    let dir = TempDir::new().unwrap();
    let empty = console(&dir);
    assert_eq!(run(&empty, &["route", "list"]).await.unwrap(), "No routes registered.\n");

    let mut router = Router::new();
    router
        .get("/posts", |_req: LarixRequest| async { Ok(LarixResponse::text("index")) })
        .name("posts.index");
    router.post("/posts", |_req: LarixRequest| async { Ok(LarixResponse::text("store")) });
    let console = console(&dir).routes(&router);

    let output = run(&console, &["route", "list"]).await.unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert!(lines[0].starts_with("Method"));
    assert!(output.contains("/posts"));
    assert!(output.contains("posts.index"));
    assert!(output.contains("Showing 2 route(s)"));
}

#[tokio::test]
async fn test_clap_errors_surface() {
    let dir = TempDir::new().unwrap();
    let console = console(&dir);
    assert!(run(&console, &["migrate", "explode"]).await.is_err());
    assert!(run(&console, &["route", "list", "--bogus"]).await.is_err());
    assert!(run(&console, &["migrate", "status", "--pending", "--executed"]).await.is_err());
}
