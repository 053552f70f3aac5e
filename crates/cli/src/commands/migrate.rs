use anyhow::Result;
use larix_orm::{
    Database, MigrateOptions, MigrationManager, MigrationRunResult, RollbackOptions,
    RollbackResult, StatusFilter,
};

use super::table;
use crate::cli::MigrateCommands;
use crate::commands::db;
use crate::console::CommandContext;

pub(crate) async fn run(ctx: &mut CommandContext<'_>, command: MigrateCommands) -> Result<()> {
    match command {
        MigrateCommands::Run {
            step,
            pretend,
            seed,
            force,
        } => {
            if !pretend {
                ctx.console.confirm_production(force, "run migrations")?;
            }
            let migrator = ctx.console.migrator(ctx.console.connect().await?)?;
            let result = migrator.run(MigrateOptions { step, pretend }).await?;
            print_run(ctx, &result, pretend)?;
            if seed && !pretend {
                db::seed_default(ctx, migrator.database()).await?;
            }
        }
        MigrateCommands::Rollback {
            step,
            pretend,
            force,
        } => {
            if !pretend {
                ctx.console.confirm_production(force, "roll back migrations")?;
            }
            let migrator = ctx.console.migrator(ctx.console.connect().await?)?;
            let result = migrator.rollback(RollbackOptions { step, pretend }).await?;
            print_rollback(ctx, &result, pretend)?;
        }
        MigrateCommands::Reset { force } => {
            ctx.console.confirm_production(force, "reset the database")?;
            let migrator = ctx.console.migrator(ctx.console.connect().await?)?;
            let result = migrator.reset().await?;
            print_rollback(ctx, &result, false)?;
        }
        MigrateCommands::Refresh { seed, force } => {
            ctx.console.confirm_production(force, "refresh the database")?;
            let migrator = ctx.console.migrator(ctx.console.connect().await?)?;
            let (rolled_back, ran) = migrator.refresh().await?;
            print_rollback(ctx, &rolled_back, false)?;
            print_run(ctx, &ran, false)?;
            if seed {
                db::seed_default(ctx, migrator.database()).await?;
            }
        }
        MigrateCommands::Fresh { seed, force } => {
            ctx.console.confirm_production(force, "drop every table")?;
            let migrator = ctx.console.migrator(ctx.console.connect().await?)?;
            let result = migrator.fresh().await?;
            writeln!(ctx.out, "Dropped all tables successfully.")?;
            print_run(ctx, &result, false)?;
            if seed {
                db::seed_default(ctx, migrator.database()).await?;
            }
        }
        MigrateCommands::Status { pending, executed } => {
            let db = ctx.console.connect().await?;
            status(ctx, db, StatusFilter {
                pending_only: pending,
                executed_only: executed,
            })
            .await?;
        }
        MigrateCommands::Install => {
            let migrator = ctx.console.migrator(ctx.console.connect().await?)?;
            migrator.install().await?;
            writeln!(ctx.out, "Migration table created successfully.")?;
        }
        MigrateCommands::Make { name, create } => {
            let manager = MigrationManager::new(ctx.console.migrations_dir());
            let path = manager.create_migration(&name, create.as_deref())?;
            writeln!(ctx.out, "Created migration: {}", path.display())?;
        }
    }
    Ok(())
}

async fn status(ctx: &mut CommandContext<'_>, db: Database, filter: StatusFilter) -> Result<()> {
    let migrator = ctx.console.migrator(db)?;
    let status = migrator.status(filter).await?;

    if status.entries.is_empty() {
        writeln!(ctx.out, "No migrations found.")?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = status
        .entries
        .iter()
        .map(|entry| {
            vec![
                entry.name.clone(),
                entry.batch.map(|b| b.to_string()).unwrap_or_default(),
                if entry.is_executed() { "Ran" } else { "Pending" }.to_string(),
            ]
        })
        .collect();
    write!(ctx.out, "{}", table(&["Migration", "Batch", "Status"], &rows))?;
    writeln!(
        ctx.out,
        "\n{} total, {} ran, {} pending",
        status.total, status.executed, status.pending
    )?;
    Ok(())
}

fn print_run(ctx: &mut CommandContext<'_>, result: &MigrationRunResult, pretend: bool) -> Result<()> {
    if pretend {
        if result.sql.is_empty() {
            writeln!(ctx.out, "Nothing to migrate.")?;
        }
        for (migration, statements) in &result.sql {
            writeln!(ctx.out, "{}:", migration)?;
            for statement in statements {
                writeln!(ctx.out, "  {}", statement)?;
            }
        }
        return Ok(());
    }

    if result.applied.is_empty() {
        writeln!(ctx.out, "Nothing to migrate.")?;
        return Ok(());
    }
    for migration in &result.applied {
        writeln!(ctx.out, "Migrated: {}", migration)?;
    }
    writeln!(ctx.out, "Batch {} complete.", result.batch)?;
    Ok(())
}

fn print_rollback(ctx: &mut CommandContext<'_>, result: &RollbackResult, pretend: bool) -> Result<()> {
    if pretend {
        if result.sql.is_empty() {
            writeln!(ctx.out, "Nothing to rollback.")?;
        }
        for (migration, statements) in &result.sql {
            writeln!(ctx.out, "{}:", migration)?;
            for statement in statements {
                writeln!(ctx.out, "  {}", statement)?;
            }
        }
        return Ok(());
    }

    if result.rolled_back.is_empty() {
        writeln!(ctx.out, "Nothing to rollback.")?;
        return Ok(());
    }
    for migration in &result.rolled_back {
        writeln!(ctx.out, "Rolled back: {}", migration)?;
    }
    Ok(())
}
