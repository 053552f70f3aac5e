//! The application console: registered migrations, seeders and routes plus
//! the command dispatcher

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use larix_core::{Config, Environment, EnvironmentDetector};
use larix_http::{Router, RouteSummary};
use larix_orm::{Database, Migration, Migrator, Schema, Seeder, SeederRunner};

use crate::cli::{Cli, Commands};
use crate::commands;

/// Database used when neither the console, `DATABASE_URL` nor `config/` names one
pub const DEFAULT_DATABASE: &str = "database/database.sqlite";

/// Registered Rust migration shared between migrator instances
struct Registered(Arc<dyn Migration>);

impl Migration for Registered {
    fn name(&self) -> String {
        self.0.name()
    }

    fn up(&self, schema: &mut Schema) -> larix_orm::ModelResult<()> {
        self.0.up(schema)
    }

    fn down(&self, schema: &mut Schema) -> larix_orm::ModelResult<()> {
        self.0.down(schema)
    }
}

/// Entry point for application binaries.
///
/// ```no_run
/// # async fn run() -> std::process::ExitCode {
/// larix_cli::Console::new()
///     .run_from_args()
///     .await
/// # }
/// ```
#[derive(Clone)]
pub struct Console {
    base_path: PathBuf,
    database_url: Option<String>,
    environment: Option<Environment>,
    migrations: Vec<Arc<dyn Migration>>,
    seeders: SeederRunner,
    routes: Vec<RouteSummary>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("base_path", &self.base_path)
            .field("environment", &self.environment)
            .field("migrations", &self.migrations.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("seeders", &self.seeders.names())
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            base_path: PathBuf::from("."),
            database_url: None,
            environment: None,
            migrations: Vec::new(),
            seeders: SeederRunner::new(),
            routes: Vec::new(),
        }
    }

    /// Application root; relative paths resolve against it
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Skip environment detection
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Register a compiled migration next to the `.sql` files
    pub fn migration(mut self, migration: impl Migration + 'static) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    pub fn seeder(mut self, seeder: impl Seeder + 'static) -> Self {
        self.seeders.register(seeder);
        self
    }

    /// Routes shown by `route list`
    pub fn routes(mut self, router: &Router) -> Self {
        self.routes = router.routes();
        self
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    /// Parse the process arguments and run; errors print `Error: ...` and exit 1
    pub async fn run_from_args(self) -> ExitCode {
        self.exit_code(std::env::args_os()).await
    }

    /// Like [`Console::run_from_args`] with explicit arguments
    pub async fn exit_code<I, T>(&self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = match Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(error) => {
                // help and version land here too
                let _ = error.print();
                return if error.use_stderr() {
                    ExitCode::from(2)
                } else {
                    ExitCode::SUCCESS
                };
            }
        };

        let mut stdout = io::stdout();
        match self.dispatch(cli.command, &mut stdout).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                eprintln!("Error: {:#}", error);
                ExitCode::FAILURE
            }
        }
    }

    /// Run one command, writing its output to `out`
    pub async fn run<I, T>(&self, args: I, out: &mut dyn Write) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)?;
        self.dispatch(cli.command, out).await
    }

    async fn dispatch(&self, command: Commands, out: &mut dyn Write) -> Result<()> {
        let mut ctx = CommandContext { console: self, out };

        match command {
            Commands::Migrate { migrate_command } => commands::migrate::run(&mut ctx, migrate_command).await,
            Commands::Db { db_command } => commands::db::run(&mut ctx, db_command).await,
            Commands::Make { make_command } => commands::make::run(&mut ctx, make_command),
            Commands::Config { config_command } => commands::config::run(&mut ctx, config_command),
            Commands::Env { env_command } => commands::env::run(&mut ctx, env_command),
            Commands::Down {
                message,
                retry,
                secret,
                allow,
            } => commands::maintenance::down(&mut ctx, message, retry, secret, allow),
            Commands::Up => commands::maintenance::up(&mut ctx),
            Commands::Status => commands::maintenance::status(&mut ctx),
            Commands::Key { key_command } => commands::key::run(&mut ctx, key_command),
            Commands::Route { route_command } => commands::route::run(&mut ctx, route_command),
        }
    }

    pub(crate) fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub(crate) fn migrations_dir(&self) -> PathBuf {
        self.resolve("database/migrations")
    }

    /// Loads `.env` into the process environment without overriding it
    pub(crate) fn load_env(&self) -> Result<()> {
        Config::load_env_file(self.resolve(".env")).context("failed to read .env")?;
        Ok(())
    }

    pub(crate) fn detect_environment(&self) -> Environment {
        match self.environment {
            Some(environment) => environment,
            None => EnvironmentDetector::new(&self.base_path).detect().environment,
        }
    }

    /// Refuse a destructive command in production unless forced
    pub(crate) fn confirm_production(&self, force: bool, action: &str) -> Result<()> {
        if self.detect_environment().is_production() && !force {
            bail!(
                "Application is in production; refusing to {}. Use --force to continue.",
                action
            );
        }
        Ok(())
    }

    /// Connection URL from the console, `DATABASE_URL`, `config/database.*`
    /// or the default SQLite file, in that order
    pub(crate) fn resolve_database_url(&self) -> Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        self.load_env()?;
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                return Ok(self.absolute_sqlite(&url));
            }
        }

        let mut config = Config::new();
        config
            .load_directory(self.resolve("config"))
            .context("failed to load config/")?;
        let default = config
            .get_string("database.default")
            .unwrap_or_else(|| "default".to_string());
        if let Some(url) = config.get_string(&format!("database.connections.{}.url", default)) {
            return Ok(self.absolute_sqlite(&url));
        }

        Ok(format!("sqlite://{}", self.resolve(DEFAULT_DATABASE).display()))
    }

    /// Relative SQLite paths are relative to the application root
    fn absolute_sqlite(&self, url: &str) -> String {
        let Some(rest) = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
        else {
            return url.to_string();
        };
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        if path.is_empty() || path == ":memory:" || Path::new(path).is_absolute() {
            return url.to_string();
        }
        let absolute = self.resolve(path);
        match query {
            Some(query) => format!("sqlite://{}?{}", absolute.display(), query),
            None => format!("sqlite://{}", absolute.display()),
        }
    }

    pub(crate) async fn connect(&self) -> Result<Database> {
        let url = self.resolve_database_url()?;
        tracing::debug!(url = %commands::db::mask_database_url(&url), "connecting");
        Database::connect(&url)
            .await
            .with_context(|| format!("could not connect to {}", commands::db::mask_database_url(&url)))
    }

    /// Migrator over the `.sql` files and the registered migrations
    pub(crate) fn migrator(&self, db: Database) -> Result<Migrator> {
        let mut migrator = Migrator::new(db);
        migrator.load_directory(self.migrations_dir())?;
        for migration in &self.migrations {
            migrator.add(Registered(migration.clone()));
        }
        Ok(migrator)
    }

    pub(crate) fn seeders(&self) -> &SeederRunner {
        &self.seeders
    }

    pub(crate) fn route_summaries(&self) -> &[RouteSummary] {
        &self.routes
    }
}

/// What a command gets to work with
pub(crate) struct CommandContext<'a> {
    pub console: &'a Console,
    pub out: &'a mut dyn Write,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_sqlite_urls_resolve_against_base() {
        let console = Console::new().base_path("/srv/app");
        assert_eq!(
            console.absolute_sqlite("sqlite://database/app.sqlite"),
            "sqlite:///srv/app/database/app.sqlite"
        );
        assert_eq!(
            console.absolute_sqlite("sqlite:db.sqlite?mode=rwc"),
            "sqlite:///srv/app/db.sqlite?mode=rwc"
        );
        assert_eq!(console.absolute_sqlite("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(console.absolute_sqlite("sqlite:///tmp/x.db"), "sqlite:///tmp/x.db");
        assert_eq!(
            console.absolute_sqlite("postgres://localhost/app"),
            "postgres://localhost/app"
        );
    }

    #[test]
    fn test_explicit_database_url_wins() {
        let console = Console::new().database_url("sqlite::memory:");
        assert_eq!(console.resolve_database_url().unwrap(), "sqlite::memory:");
    }

    #[test]
    fn test_production_requires_force() {
        let console = Console::new().environment(Environment::Production);
        let err = console.confirm_production(false, "wipe the database").unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert!(console.confirm_production(true, "wipe the database").is_ok());

        let local = Console::new().environment(Environment::Local);
        assert!(local.confirm_production(false, "wipe the database").is_ok());
    }
}
