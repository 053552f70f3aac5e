use anyhow::{anyhow, Result};
use larix_core::{Application, Config, CONFIG_CACHE_PATH};
use serde_json::Value;

use crate::cli::ConfigCommands;
use crate::console::CommandContext;

pub(crate) fn run(ctx: &mut CommandContext<'_>, command: ConfigCommands) -> Result<()> {
    let cache = ctx.console.resolve(CONFIG_CACHE_PATH);

    match command {
        ConfigCommands::Cache => {
            // rebuild from config/ rather than the stale cache
            Config::clear_cache(&cache)?;
            let app = Application::bootstrap(ctx.console.path())?;
            app.config().cache_to(&cache)?;
            writeln!(ctx.out, "Configuration cached successfully.")?;
        }
        ConfigCommands::Clear => {
            if Config::clear_cache(&cache)? {
                writeln!(ctx.out, "Configuration cache cleared.")?;
            } else {
                writeln!(ctx.out, "Configuration cache was not present.")?;
            }
        }
        ConfigCommands::Show { key } => {
            let app = Application::bootstrap(ctx.console.path())?;
            let value = match &key {
                Some(key) => app
                    .config()
                    .get(key)
                    .ok_or_else(|| anyhow!("Configuration key [{}] is not defined", key))?,
                None => app.config().all(),
            };
            writeln!(ctx.out, "{}", display_value(value)?)?;
        }
    }
    Ok(())
}

fn display_value(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        other => serde_json::to_string_pretty(other)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("sqlite")).unwrap(), "sqlite");
        assert_eq!(display_value(&json!(true)).unwrap(), "true");
        assert_eq!(display_value(&json!(8080)).unwrap(), "8080");
        assert_eq!(
            display_value(&json!({"a": 1})).unwrap(),
            "{\n  \"a\": 1\n}"
        );
    }
}
