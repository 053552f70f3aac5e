use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{bail, Context as _, Result};
use larix_core::environment::Severity;
use larix_core::{EnvValidator, EnvironmentDetector};

use crate::cli::EnvCommands;
use crate::console::CommandContext;

const SECRET_MARKERS: [&str; 4] = ["KEY", "SECRET", "PASSWORD", "TOKEN"];

pub(crate) fn run(ctx: &mut CommandContext<'_>, command: EnvCommands) -> Result<()> {
    match command {
        EnvCommands::Show => {
            let environment = ctx.console.detect_environment();
            writeln!(ctx.out, "Environment: {}", environment)?;

            let path = ctx.console.resolve(".env");
            if !path.exists() {
                writeln!(ctx.out, ".env file not found.")?;
                return Ok(());
            }
            writeln!(ctx.out)?;
            for (key, value) in read_env_file(&path)? {
                writeln!(ctx.out, "{}={}", key, mask(&key, &value))?;
            }
        }
        EnvCommands::Detect => {
            let detector = EnvironmentDetector::new(ctx.console.path());
            let detections = detector.detect_all();
            let current = ctx.console.detect_environment();
            writeln!(ctx.out, "Environment: {}", current)?;
            if detections.is_empty() {
                writeln!(ctx.out, "No hints found; falling back to local.")?;
            }
            for (i, detection) in detections.iter().enumerate() {
                writeln!(
                    ctx.out,
                    "{}. {:<12} {}",
                    i + 1,
                    detection.environment.as_str(),
                    detection.source
                )?;
            }
        }
        EnvCommands::Validate => {
            let mut vars: HashMap<String, String> = std::env::vars().collect();
            let path = ctx.console.resolve(".env");
            if path.exists() {
                // process variables win, as when the file is loaded
                for (key, value) in read_env_file(&path)? {
                    vars.entry(key).or_insert(value);
                }
            }

            let report = EnvValidator::with_defaults().validate(&vars);
            for issue in &report.issues {
                let label = match issue.severity {
                    Severity::Error => "ERROR",
                    Severity::Warning => "WARN",
                    Severity::Info => "INFO",
                };
                writeln!(ctx.out, "[{}] {}: {}", label, issue.variable, issue.message)?;
            }
            if !report.is_valid() {
                bail!(
                    "Environment validation failed: {} error(s), {} warning(s)",
                    report.error_count,
                    report.warning_count
                );
            }
            writeln!(
                ctx.out,
                "Environment configuration is valid ({} warning(s)).",
                report.warning_count
            )?;
        }
    }
    Ok(())
}

/// Variables of a `.env` file, sorted by name
fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    for item in iter {
        let (key, value) = item.with_context(|| format!("failed to parse {}", path.display()))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

fn mask(key: &str, value: &str) -> String {
    let upper = key.to_uppercase();
    if value.is_empty() || !SECRET_MARKERS.iter().any(|m| upper.contains(m)) {
        return value.to_string();
    }
    "********".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_mask_secrets() {
        assert_eq!(mask("APP_KEY", "base64:abc"), "********");
        assert_eq!(mask("DB_PASSWORD", "hunter2"), "********");
        assert_eq!(mask("APP_KEY", ""), "");
        assert_eq!(mask("APP_NAME", "Larix"), "Larix");
    }

    #[test]
    fn test_read_env_file_sorts_and_unquotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "B=2\n# comment\nA=\"quoted value\"\n").unwrap();
        let vars = read_env_file(&path).unwrap();
        assert_eq!(
            vars.into_iter().collect::<Vec<_>>(),
            vec![
                ("A".to_string(), "quoted value".to_string()),
                ("B".to_string(), "2".to_string())
            ]
        );
    }
}
