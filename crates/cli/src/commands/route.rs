use anyhow::Result;

use super::table;
use crate::cli::RouteCommands;
use crate::console::CommandContext;

pub(crate) fn run(ctx: &mut CommandContext<'_>, command: RouteCommands) -> Result<()> {
    match command {
        RouteCommands::List => {
            let routes = ctx.console.route_summaries();
            if routes.is_empty() {
                writeln!(ctx.out, "No routes registered.")?;
                return Ok(());
            }

            let rows: Vec<Vec<String>> = routes
                .iter()
                .map(|route| {
                    vec![
                        route.methods.clone(),
                        route.uri.clone(),
                        route.name.clone().unwrap_or_default(),
                        route.middleware.join(","),
                    ]
                })
                .collect();
            write!(ctx.out, "{}", table(&["Method", "URI", "Name", "Middleware"], &rows))?;
            writeln!(ctx.out, "\nShowing {} route(s)", routes.len())?;
        }
    }
    Ok(())
}
