use anyhow::Result;
use chrono::{DateTime, Utc};
use larix_http::{MaintenanceMode, MaintenancePayload};

use crate::console::CommandContext;

pub(crate) fn down(
    ctx: &mut CommandContext<'_>,
    message: Option<String>,
    retry: Option<u64>,
    secret: Option<String>,
    allow: Vec<String>,
) -> Result<()> {
    let mode = MaintenanceMode::new(ctx.console.path());
    if mode.is_enabled() {
        writeln!(ctx.out, "Application is already down.")?;
        return Ok(());
    }

    let mut payload = MaintenancePayload::new();
    if let Some(message) = message {
        payload = payload.message(message);
    }
    if let Some(retry) = retry {
        payload = payload.retry(retry);
    }
    if let Some(secret) = &secret {
        payload = payload.secret(secret.clone());
    }
    for ip in allow {
        payload = payload.allow_ip(ip);
    }
    mode.enable(&payload)?;

    writeln!(ctx.out, "Application is now in maintenance mode.")?;
    if let Some(secret) = secret {
        writeln!(ctx.out, "Bypass with ?bypass={} or the X-Maintenance-Bypass header.", secret)?;
    }
    Ok(())
}

pub(crate) fn up(ctx: &mut CommandContext<'_>) -> Result<()> {
    let mode = MaintenanceMode::new(ctx.console.path());
    if mode.disable()? {
        writeln!(ctx.out, "Application is now live.")?;
    } else {
        writeln!(ctx.out, "Application is already up.")?;
    }
    Ok(())
}

pub(crate) fn status(ctx: &mut CommandContext<'_>) -> Result<()> {
    let mode = MaintenanceMode::new(ctx.console.path());
    let Some(payload) = mode.status()? else {
        writeln!(ctx.out, "Application is up.")?;
        return Ok(());
    };

    let since = DateTime::<Utc>::from_timestamp(payload.time, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    writeln!(ctx.out, "Application is down since {}.", since)?;
    writeln!(ctx.out, "Message:     {}", payload.message)?;
    writeln!(ctx.out, "Retry after: {}s", payload.retry)?;
    writeln!(
        ctx.out,
        "Secret:      {}",
        if payload.secret.is_some() { "set" } else { "none" }
    )?;
    if !payload.allowed_ips.is_empty() {
        writeln!(ctx.out, "Allowed IPs: {}", payload.allowed_ips.join(", "))?;
    }
    Ok(())
}
