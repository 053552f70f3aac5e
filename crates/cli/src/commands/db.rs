use anyhow::{bail, Result};
use larix_orm::{Database, StatusFilter};
use url::Url;

use crate::cli::DbCommands;
use crate::console::CommandContext;

/// Seeder run when no `--class` is given
pub const DEFAULT_SEEDER: &str = "DatabaseSeeder";

pub(crate) async fn run(ctx: &mut CommandContext<'_>, command: DbCommands) -> Result<()> {
    match command {
        DbCommands::Seed { class, force } => {
            if ctx.console.detect_environment().is_production() && !force {
                bail!("Cannot seed the database in production without --force");
            }
            let db = ctx.console.connect().await?;
            match class {
                Some(class) => {
                    if !ctx.console.seeders().has(&class) {
                        bail!("Seeder [{}] is not registered", class);
                    }
                    writeln!(ctx.out, "Seeding: {}", class)?;
                    ctx.console.seeders().run(&db, &class).await?;
                    writeln!(ctx.out, "Database seeding completed successfully.")?;
                }
                None => seed_default(ctx, &db).await?,
            }
        }
        DbCommands::Wipe { force } => {
            ctx.console.confirm_production(force, "wipe the database")?;
            let db = ctx.console.connect().await?;
            let tables = db.table_names().await?;
            if tables.is_empty() {
                writeln!(ctx.out, "Nothing to drop.")?;
                return Ok(());
            }
            for statement in db.grammar().compile_drop_all_tables(&tables) {
                db.execute(&statement, &[]).await?;
            }
            tracing::info!(tables = tables.len(), "Wiped database");
            writeln!(ctx.out, "Dropped {} table(s) successfully.", tables.len())?;
        }
        DbCommands::Tables => {
            let db = ctx.console.connect().await?;
            let tables = db.table_names().await?;
            if tables.is_empty() {
                writeln!(ctx.out, "No tables found.")?;
            }
            for table in tables {
                writeln!(ctx.out, "{}", table)?;
            }
        }
        DbCommands::Status => {
            let url = ctx.console.resolve_database_url()?;
            let db = ctx.console.connect().await?;
            let tables = db.table_names().await?;

            writeln!(ctx.out, "Driver:     {}", db.driver())?;
            writeln!(ctx.out, "Connection: {}", mask_database_url(&url))?;
            writeln!(ctx.out, "Tables:     {}", tables.len())?;

            let migrator = ctx.console.migrator(db)?;
            if tables.iter().any(|t| t == "migrations") {
                let status = migrator.status(StatusFilter::default()).await?;
                writeln!(
                    ctx.out,
                    "Migrations: {} ran, {} pending",
                    status.executed, status.pending
                )?;
            } else {
                writeln!(
                    ctx.out,
                    "Migrations: not installed ({} available)",
                    migrator.migrations().len()
                )?;
            }
        }
    }
    Ok(())
}

/// Run `DatabaseSeeder` when registered, every seeder otherwise
pub(crate) async fn seed_default(ctx: &mut CommandContext<'_>, db: &Database) -> Result<()> {
    let seeders = ctx.console.seeders();
    if seeders.names().is_empty() {
        writeln!(ctx.out, "No seeders registered.")?;
        return Ok(());
    }

    if seeders.has(DEFAULT_SEEDER) {
        writeln!(ctx.out, "Seeding: {}", DEFAULT_SEEDER)?;
        seeders.run(db, DEFAULT_SEEDER).await?;
    } else {
        for name in seeders.run_all(db).await? {
            writeln!(ctx.out, "Seeded: {}", name)?;
        }
    }
    writeln!(ctx.out, "Database seeding completed successfully.")?;
    Ok(())
}

/// Hide the password of a connection URL
pub(crate) fn mask_database_url(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_err() {
                return url_str.to_string();
            }
            url.to_string()
        }
        _ => url_str.to_string(),
    }
}
