use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::cli::KeyCommands;
use crate::console::CommandContext;

static APP_KEY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^APP_KEY=(.*)$").expect("valid regex"));

pub(crate) fn run(ctx: &mut CommandContext<'_>, command: KeyCommands) -> Result<()> {
    match command {
        KeyCommands::Generate { show, force } => {
            let key = generate_key();
            if show {
                writeln!(ctx.out, "{}", key)?;
                return Ok(());
            }

            let path = ctx.console.resolve(".env");
            if has_key(&path)? && ctx.console.detect_environment().is_production() && !force {
                bail!("APP_KEY is already set in production. Use --force to replace it.");
            }
            write_key(&path, &key)?;
            tracing::info!(path = %path.display(), "application key written");
            writeln!(ctx.out, "Application key set successfully.")?;
        }
    }
    Ok(())
}

/// 32 random bytes, base64 encoded with the `base64:` prefix
pub(crate) fn generate_key() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("base64:{}", STANDARD.encode(bytes))
}

fn has_key(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let contents = fs::read_to_string(path)?;
    Ok(APP_KEY_LINE
        .captures(&contents)
        .map(|caps| !caps[1].trim().is_empty())
        .unwrap_or(false))
}

/// Replace the `APP_KEY` line, or append one, creating the file if needed
fn write_key(path: &Path, key: &str) -> Result<()> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let line = format!("APP_KEY={}", key);
    let updated = if APP_KEY_LINE.is_match(&contents) {
        APP_KEY_LINE
            .replace(&contents, regex::NoExpand(&line))
            .into_owned()
    } else {
        let mut updated = contents;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&line);
        updated.push('\n');
        updated
    };
    fs::write(path, updated)?;
    Ok(())
}
