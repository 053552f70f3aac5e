use std::process::ExitCode;

use larix_cli::Console;
use larix_http::{init_logging, LoggingConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // command output goes to stdout; keep the framework's own logs quiet
    let _ = init_logging(LoggingConfig {
        level: "warn".to_string(),
        pretty_print: false,
        ..LoggingConfig::default()
    });

    Console::new().run_from_args().await
}
