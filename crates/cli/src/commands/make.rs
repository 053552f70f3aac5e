use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use larix_orm::support::{plural, snake_case, studly_case};
use larix_orm::MigrationManager;
use once_cell::sync::Lazy;
use regex::Regex;
use tera::{Context, Tera};

use crate::cli::MakeCommands;
use crate::console::CommandContext;
use crate::stubs;

static VALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid regex"));

/// What a generator writes and where
struct Target {
    kind: &'static str,
    stub: &'static str,
    dir: &'static str,
    extension: &'static str,
}

impl Target {
    const fn rust(kind: &'static str, stub: &'static str, dir: &'static str) -> Self {
        Self {
            kind,
            stub,
            dir,
            extension: "rs",
        }
    }
}

const MODEL: Target = Target::rust("Model", "model", "src/models");
const CONTROLLER: Target = Target::rust("Controller", "controller", "src/controllers");
const RESOURCE_CONTROLLER: Target = Target::rust("Controller", "resource_controller", "src/controllers");
const MIDDLEWARE: Target = Target::rust("Middleware", "middleware", "src/middleware");
const POLICY: Target = Target::rust("Policy", "policy", "src/policies");
const SEEDER: Target = Target::rust("Seeder", "seeder", "src/seeders");
const FACTORY: Target = Target::rust("Factory", "factory", "src/factories");
const COMPONENT: Target = Target {
    kind: "Component",
    stub: "component",
    dir: "resources/views/components",
    extension: "html",
};

pub(crate) fn run(ctx: &mut CommandContext<'_>, command: MakeCommands) -> Result<()> {
    match command {
        MakeCommands::Model {
            name,
            migration,
            force,
        } => {
            let context = names(&name, None)?;
            generate(ctx, &MODEL, &context, force)?;
            if migration {
                let table = plural(&snake_case(&studly_case(&name)));
                let path = MigrationManager::new(ctx.console.migrations_dir())
                    .create_migration(&format!("create_{}_table", table), Some(&table))?;
                writeln!(ctx.out, "Created migration: {}", path.display())?;
            }
        }
        MakeCommands::Controller {
            name,
            resource,
            force,
        } => {
            let model = strip_suffix(&name, "Controller");
            let context = names(&name, Some(model.as_str()))?;
            let target = if resource { &RESOURCE_CONTROLLER } else { &CONTROLLER };
            generate(ctx, target, &context, force)?;
        }
        MakeCommands::Middleware { name, force } => {
            generate(ctx, &MIDDLEWARE, &names(&name, None)?, force)?;
        }
        MakeCommands::Policy { name, model, force } => {
            let model = model.unwrap_or_else(|| strip_suffix(&name, "Policy"));
            generate(ctx, &POLICY, &names(&name, Some(model.as_str()))?, force)?;
        }
        MakeCommands::Seeder { name, force } => {
            generate(ctx, &SEEDER, &names(&name, None)?, force)?;
        }
        MakeCommands::Factory { name, model, force } => {
            let model = model.unwrap_or_else(|| strip_suffix(&name, "Factory"));
            generate(ctx, &FACTORY, &names(&name, Some(model.as_str()))?, force)?;
        }
        MakeCommands::Component { name, force } => {
            generate(ctx, &COMPONENT, &names(&name, None)?, force)?;
        }
    }
    Ok(())
}

fn strip_suffix(name: &str, suffix: &str) -> String {
    match name.strip_suffix(suffix) {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => name.to_string(),
    }
}

/// Template variables for a class name and the model it relates to
fn names(name: &str, model: Option<&str>) -> Result<Context> {
    if !VALID_NAME.is_match(name) {
        bail!("Invalid name [{}]: use letters, digits and underscores", name);
    }
    let studly = studly_case(name);
    let snake = snake_case(&studly);
    let model = studly_case(model.unwrap_or(&studly));
    if !VALID_NAME.is_match(&model) {
        bail!("Invalid model name [{}]", model);
    }
    let model_snake = snake_case(&model);

    let mut context = Context::new();
    context.insert("name", &studly);
    context.insert("snake", &snake);
    context.insert("table", &plural(&snake));
    context.insert("css_class", &snake.replace('_', "-"));
    context.insert("model", &model);
    context.insert("resource", &plural(&model_snake));
    context.insert("model_snake", &model_snake);
    Ok(context)
}

fn stubs() -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(stubs::ALL.to_vec())
        .context("invalid generator stub")?;
    Ok(tera)
}

fn generate(ctx: &mut CommandContext<'_>, target: &Target, context: &Context, force: bool) -> Result<PathBuf> {
    let snake = context
        .get("snake")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let relative = Path::new(target.dir).join(format!("{}.{}", snake, target.extension));
    let path = ctx.console.resolve(&relative);

    if path.exists() && !force {
        bail!(
            "{} [{}] already exists. Use --force to overwrite it.",
            target.kind,
            relative.display()
        );
    }

    let contents = stubs()?
        .render(target.stub, context)
        .with_context(|| format!("failed to render the {} stub", target.stub))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    if target.extension == "rs" {
        register_module(&ctx.console.resolve(target.dir), &snake)?;
    }

    tracing::info!(kind = target.kind, path = %path.display(), "generated");
    writeln!(ctx.out, "{} created: {}", target.kind, relative.display())?;
    Ok(path)
}

/// Add `pub mod <name>;` to the directory's `mod.rs`
fn register_module(dir: &Path, module: &str) -> Result<()> {
    let mod_file = dir.join("mod.rs");
    let line = format!("pub mod {};", module);
    let existing = match fs::read_to_string(&mod_file) {
        Ok(existing) => existing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if existing.lines().any(|l| l.trim() == line) {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&line);
    updated.push('\n');
    fs::write(mod_file, updated)?;
    Ok(())
}
